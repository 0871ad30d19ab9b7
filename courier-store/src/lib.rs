//! Durable record store boundary for the dispatch queue.
//!
//! The dispatch core treats the store as an external collaborator: a
//! key-value-with-children store with atomic single-writer-per-path commit
//! semantics and read-after-commit visibility. This crate provides the
//! [`RecordStore`] trait plus an in-memory backend for tests and transient
//! deployments.

pub mod backends;
pub mod error;
pub mod record;
pub mod store;
pub mod types;

pub use backends::{MemoryRecordStore, TestRecordStore};
pub use error::{Result, SerializationError, StoreError};
pub use store::RecordStore;
pub use types::{EntryId, Folder};
