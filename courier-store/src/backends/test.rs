use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use courier_common::QueueEntry;
use tokio::sync::Notify;

use super::memory::MemoryRecordStore;
use crate::{
    StoreError,
    store::RecordStore,
    types::{EntryId, Folder},
};

/// Testing utilities for the memory-backed record store
///
/// Wraps [`MemoryRecordStore`] with synchronization helpers (wait for an
/// entry to land) and fault injection so persistence-failure paths in the
/// dispatch core can be exercised deterministically.
#[derive(Debug, Clone, Default)]
pub struct TestRecordStore {
    pub(crate) inner: MemoryRecordStore,
    notify: Arc<Notify>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl TestRecordStore {
    /// Create a new test record store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next entry to be created
    pub async fn wait_for_create(&self) {
        self.notify.notified().await;
    }

    /// Wait until `folder` holds at least `expected` entries, with timeout
    ///
    /// # Errors
    /// Returns an error if the timeout is reached before the expected count
    pub async fn wait_for_count(
        &self,
        folder: Folder,
        expected: usize,
        timeout: std::time::Duration,
    ) -> crate::Result<()> {
        tokio::time::timeout(timeout, async {
            loop {
                let count = self.inner.list(folder).await.unwrap_or_default().len();
                if count >= expected {
                    return;
                }
                self.notify.notified().await;
            }
        })
        .await
        .map_err(|e| StoreError::Internal(format!("Timeout waiting for entries: {e}")))?;
        Ok(())
    }

    /// Make all subsequent reads fail until cleared
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make all subsequent mutating operations fail until cleared
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Get the total number of stored entries across all folders
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.inner.len()
    }

    /// Read all entries under a folder (for test assertions)
    ///
    /// # Errors
    /// Returns an error if any entry cannot be listed or read
    pub async fn entries(&self, folder: Folder) -> crate::Result<Vec<QueueEntry>> {
        let ids = self.inner.list(folder).await?;
        let mut entries = Vec::new();
        for id in ids {
            entries.push(self.inner.read(folder, &id).await?);
        }
        Ok(entries)
    }

    fn check_read(&self) -> crate::Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("injected read fault".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> crate::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("injected write fault".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for TestRecordStore {
    async fn create(&self, folder: Folder, entry: &mut QueueEntry) -> crate::Result<EntryId> {
        self.check_write()?;
        let id = self.inner.create(folder, entry).await?;
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn list(&self, folder: Folder) -> crate::Result<Vec<EntryId>> {
        self.check_read()?;
        self.inner.list(folder).await
    }

    async fn read(&self, folder: Folder, id: &EntryId) -> crate::Result<QueueEntry> {
        self.check_read()?;
        self.inner.read(folder, id).await
    }

    async fn update(&self, folder: Folder, id: &EntryId, entry: &QueueEntry) -> crate::Result<()> {
        self.check_write()?;
        self.inner.update(folder, id, entry).await
    }

    async fn relocate(&self, from: Folder, to: Folder, id: &EntryId) -> crate::Result<()> {
        self.check_write()?;
        self.inner.relocate(from, to, id).await
    }

    async fn delete(&self, folder: Folder, id: &EntryId) -> crate::Result<()> {
        self.check_write()?;
        self.inner.delete(folder, id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use courier_common::{ConfigRef, NodeId};

    use super::*;

    fn test_entry() -> QueueEntry {
        QueueEntry::new(
            "msg-t",
            Arc::from(b"payload".as_slice()),
            ConfigRef::new("/server/default"),
            None,
            NodeId::from_name("node-a"),
        )
    }

    #[tokio::test]
    async fn fault_injection_read() {
        let store = TestRecordStore::new();
        let mut entry = test_entry();
        let id = store.create(Folder::Queue, &mut entry).await.unwrap();

        store.fail_reads(true);
        assert!(store.read(Folder::Queue, &id).await.is_err());
        assert!(store.list(Folder::Queue).await.is_err());

        store.fail_reads(false);
        assert!(store.read(Folder::Queue, &id).await.is_ok());
    }

    #[tokio::test]
    async fn fault_injection_write() {
        let store = TestRecordStore::new();
        let mut entry = test_entry();
        let id = store.create(Folder::Queue, &mut entry).await.unwrap();

        store.fail_writes(true);
        assert!(store.update(Folder::Queue, &id, &entry).await.is_err());
        assert!(
            store
                .relocate(Folder::Queue, Folder::Sent, &id)
                .await
                .is_err()
        );
        assert!(store.delete(Folder::Queue, &id).await.is_err());

        store.fail_writes(false);
        assert!(store.delete(Folder::Queue, &id).await.is_ok());
    }

    #[tokio::test]
    async fn wait_for_count_sees_creates() {
        let store = TestRecordStore::new();
        let waiter = store.clone();

        let handle = tokio::spawn(async move {
            waiter
                .wait_for_count(Folder::Queue, 1, std::time::Duration::from_secs(5))
                .await
        });

        let mut entry = test_entry();
        store.create(Folder::Queue, &mut entry).await.unwrap();

        handle.await.unwrap().unwrap();
    }
}
