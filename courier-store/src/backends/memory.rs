use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use courier_common::QueueEntry;

use crate::{
    StoreError, record,
    store::RecordStore,
    types::{EntryId, Folder},
};

/// In-memory record store implementation
///
/// Entries are held as their encoded durable byte shape in a `HashMap`
/// protected by an `RwLock`, so every read and write passes through the same
/// serialization path a persistent backend would use. Primarily intended for
/// testing, but usable for transient queues where durability across a
/// process restart is not needed.
///
/// # Capacity Management
/// The store can be configured with a maximum capacity to prevent unbounded
/// memory growth. When capacity is reached, create operations fail with an
/// error.
///
/// # Concurrency
/// Uses an `RwLock` for interior mutability; `relocate` holds the write lock
/// across remove-and-insert so the move commits atomically.
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    pub(crate) nodes: Arc<RwLock<HashMap<(Folder, EntryId), Vec<u8>>>>,
    /// Maximum number of entries to store (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryRecordStore {
    /// Create a new empty memory store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            capacity: None,
        }
    }

    /// Create a new memory store with a capacity limit
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            capacity: Some(capacity),
        }
    }

    /// Get the current number of entries across all folders
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the
    /// underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the configured capacity (None = unlimited)
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, folder: Folder, entry: &mut QueueEntry) -> crate::Result<EntryId> {
        let id = EntryId::generate();

        entry.tracking_id = Some(id.to_string());

        let bytes = record::encode(entry)?;

        let mut nodes = self.nodes.write()?;

        if let Some(cap) = self.capacity
            && nodes.len() >= cap
        {
            return Err(StoreError::Internal(format!(
                "Memory store capacity exceeded: {}/{cap} entries",
                nodes.len(),
            )));
        }

        nodes.insert((folder, id.clone()), bytes);

        Ok(id)
    }

    async fn list(&self, folder: Folder) -> crate::Result<Vec<EntryId>> {
        let mut ids: Vec<_> = self
            .nodes
            .read()?
            .keys()
            .filter(|(f, _)| *f == folder)
            .map(|(_, id)| id.clone())
            .collect();

        // ULIDs are lexicographically sortable by creation time
        ids.sort();

        Ok(ids)
    }

    async fn read(&self, folder: Folder, id: &EntryId) -> crate::Result<QueueEntry> {
        let bytes = self
            .nodes
            .read()?
            .get(&(folder, id.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        record::decode(&bytes)
    }

    async fn update(&self, folder: Folder, id: &EntryId, entry: &QueueEntry) -> crate::Result<()> {
        let bytes = record::encode(entry)?;

        let mut nodes = self.nodes.write()?;
        if nodes.contains_key(&(folder, id.clone())) {
            nodes.insert((folder, id.clone()), bytes);
            Ok(())
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    async fn relocate(&self, from: Folder, to: Folder, id: &EntryId) -> crate::Result<()> {
        let mut nodes = self.nodes.write()?;

        let bytes = nodes
            .remove(&(from, id.clone()))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if nodes.contains_key(&(to, id.clone())) {
            // Restore under the source folder so a failed move has no effect
            nodes.insert((from, id.clone()), bytes);
            return Err(StoreError::AlreadyExists(id.clone()));
        }

        nodes.insert((to, id.clone()), bytes);

        Ok(())
    }

    async fn delete(&self, folder: Folder, id: &EntryId) -> crate::Result<()> {
        self.nodes
            .write()?
            .remove(&(folder, id.clone()))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(())
    }
}
