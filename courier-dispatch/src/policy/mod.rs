//! Dispatch policies: retry scheduling and archive retention.

pub mod cleanup;
pub mod retry;

pub use cleanup::CleanupPolicy;
pub use retry::{RetryPolicy, RetrySchedule};
