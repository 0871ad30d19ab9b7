//! Error types for the courier-store crate.

use std::io;

use thiserror::Error;

use crate::EntryId;

/// Top-level store error type.
///
/// All store operations return this error type, which categorizes failures
/// into I/O, serialization, and logical errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Entry not found in the given folder.
    #[error("Entry not found: {0}")]
    NotFound(EntryId),

    /// Entry already exists at the target location.
    #[error("Entry already exists: {0}")]
    AlreadyExists(EntryId),

    /// Internal error (lock poisoning, capacity, injected faults).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Bincode serialization failed.
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Bincode deserialization failed.
    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Entry data is corrupted or incomplete.
    #[error("Corrupted entry data: {0}")]
    Corrupted(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// Convenience conversion for lock poisoning
impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

impl StoreError {
    /// Whether this error means the entry is simply absent.
    ///
    /// The archive step uses this to distinguish "already archived by a
    /// concurrent actor" from a real persistence failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
