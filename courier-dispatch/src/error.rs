//! Typed error handling for dispatch operations.
//!
//! This module provides structured error types that distinguish between:
//! - Permanent failures - don't retry
//! - Temporary failures - retry with backoff, subject to the retry budget
//! - System errors - internal errors, persistence failures

use thiserror::Error;

/// Top-level dispatch error type.
///
/// This error type provides clear categorization of failures to enable
/// appropriate retry logic and error reporting. Classification happens
/// entirely inside the delivery task; only the final outcome crosses to the
/// caller's handle.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Permanent failure that should not be retried.
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// Temporary failure that can be retried with backoff.
    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    /// System-level error (persistence, internal errors, etc.).
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// Permanent errors that should not be retried.
///
/// These correspond to operator mistakes or definitive rejections by the
/// remote side.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// Server configuration reference could not be resolved.
    ///
    /// Configuration is assumed to be an operator mistake, not transient.
    #[error("Server configuration unresolvable: {0}")]
    ConfigUnresolved(String),

    /// Server configuration exists but is disabled.
    #[error("Server configuration disabled: {0}")]
    ConfigDisabled(String),

    /// Recipient address is invalid or rejected by the server.
    #[error("Invalid recipient: {0}")]
    RecipientRejected(String),

    /// Authentication was rejected by policy.
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// Message was rejected by the server (e.g., policy violation).
    #[error("Message rejected: {0}")]
    MessageRejected(String),
}

/// Temporary errors that should be retried, subject to the retry budget.
#[derive(Debug, Error)]
pub enum TemporaryError {
    /// Failed to establish a connection to the server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Server is temporarily busy or unavailable.
    #[error("Server busy: {0}")]
    ServerBusy(String),

    /// The transport call timed out.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Server returned a temporary rejection.
    #[error("Temporary transport error: {0}")]
    Transport(String),
}

/// System-level errors that indicate internal problems.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Failed to read from the record store.
    #[error("Store read error: {0}")]
    StoreRead(String),

    /// Failed to write to the record store.
    #[error("Store write error: {0}")]
    StoreWrite(String),

    /// The engine is disabled (shut down) and accepts no new work.
    #[error("Dispatch engine is disabled")]
    Disabled,

    /// Entry not found where it was expected.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// An entry was observed in an impossible state. Treated as a defect
    /// requiring investigation, never silently dropped.
    #[error("Inconsistent entry state: {0}")]
    Inconsistent(String),

    /// Other internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Returns `true` if this error is temporary and should be retried.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Returns `true` if this error is permanent and should not be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns `true` if this is a system error.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }
}
