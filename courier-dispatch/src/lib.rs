//! Durable message dispatch: the delivery engine over a record store
//!
//! This crate provides functionality to:
//! - Enqueue transport-ready messages durably and hand back cancellable
//!   handles for their terminal outcome
//! - Run delivery attempts with claim checks that stay safe when several
//!   nodes share one store
//! - Reschedule transient failures with backoff, subject to a retry budget
//! - Archive or delete terminal entries per a retention policy

mod engine;
mod error;
mod handle;
pub mod policy;
mod task;
mod transport;

// Re-export engine types
pub use engine::{DispatchConfig, DispatchEngine};
// Re-export error types
pub use error::{DispatchError, PermanentError, SystemError, TemporaryError};
// Re-export handle types
pub use handle::{CancelToken, DispatchHandle, DispatchOutcome};
pub use policy::{CleanupPolicy, RetryPolicy, RetrySchedule};
// Re-export boundary types
pub use transport::{
    ConfigResolver, ConnectionParams, OutboundMessage, Transport, TransportId, TransportTimeouts,
};
