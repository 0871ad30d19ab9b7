//! The durable record store trait.

use async_trait::async_trait;
use courier_common::QueueEntry;

use crate::{
    error::Result,
    types::{EntryId, Folder},
};

/// Durable store for queue entries.
///
/// Each operation is scoped to its own short-lived store session and commits
/// atomically: a successful return means the mutation is durable and visible
/// to subsequent reads from any node sharing the store
/// (read-after-commit visibility).
///
/// The dispatch core relies on exactly these semantics and nothing more; it
/// never holds a session across the transport send.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Persist a new entry under `folder`, assigning it a fresh [`EntryId`].
    ///
    /// Sets `entry.tracking_id` to the assigned id.
    ///
    /// # Errors
    /// Returns an error if the entry cannot be committed.
    async fn create(&self, folder: Folder, entry: &mut QueueEntry) -> Result<EntryId>;

    /// List the ids of all entries under `folder`, sorted by creation time.
    ///
    /// # Errors
    /// Returns an error if the folder cannot be read.
    async fn list(&self, folder: Folder) -> Result<Vec<EntryId>>;

    /// Read the entry at `folder`/`id`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if no
    /// entry exists there.
    async fn read(&self, folder: Folder, id: &EntryId) -> Result<QueueEntry>;

    /// Overwrite the entry at `folder`/`id` and commit.
    ///
    /// # Errors
    /// Returns an error if the entry is absent or the commit fails.
    async fn update(&self, folder: Folder, id: &EntryId, entry: &QueueEntry) -> Result<()>;

    /// Move the entry at `from`/`id` to `to`/`id` in one commit.
    ///
    /// # Errors
    /// Returns an error if the entry is absent or the commit fails.
    async fn relocate(&self, from: Folder, to: Folder, id: &EntryId) -> Result<()>;

    /// Delete the entry at `folder`/`id` and commit.
    ///
    /// # Errors
    /// Returns an error if the entry is absent or the commit fails.
    async fn delete(&self, folder: Folder, id: &EntryId) -> Result<()>;
}
