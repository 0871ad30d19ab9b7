//! Archive retention policy.
//!
//! Consulted by the delivery task at archive time: terminal entries are
//! either kept in an outcome-specific archive location or deleted outright.
//! A separate periodic sweeper (out of scope here) later purges archived
//! entries older than their retention; this policy only answers the
//! keep-or-delete-now question.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retention configuration for archived terminal entries.
///
/// A zero duration means "delete immediately". Entries archived as
/// internal errors are always kept regardless of this policy; they signal a
/// defect and are deliberately excluded from automatic cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupPolicy {
    /// How long failed (and cancelled) entries are retained, in seconds.
    ///
    /// Default: 604800 (7 days)
    #[serde(default = "defaults::keep_failed_secs")]
    pub keep_failed_secs: u64,

    /// How long successfully delivered entries are retained, in seconds.
    ///
    /// Default: 0 (delete immediately once delivered)
    #[serde(default = "defaults::keep_delivered_secs")]
    pub keep_delivered_secs: u64,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            keep_failed_secs: defaults::keep_failed_secs(),
            keep_delivered_secs: defaults::keep_delivered_secs(),
        }
    }
}

impl CleanupPolicy {
    /// Whether failed and cancelled entries are archived rather than deleted.
    #[must_use]
    pub const fn keep_failed_entries(&self) -> bool {
        self.keep_failed_secs > 0
    }

    /// Whether delivered entries are archived rather than deleted.
    #[must_use]
    pub const fn keep_delivered_entries(&self) -> bool {
        self.keep_delivered_secs > 0
    }

    /// Retention duration for failed entries.
    #[must_use]
    pub const fn failed_retention(&self) -> Duration {
        Duration::from_secs(self.keep_failed_secs)
    }

    /// Retention duration for delivered entries.
    #[must_use]
    pub const fn delivered_retention(&self) -> Duration {
        Duration::from_secs(self.keep_delivered_secs)
    }
}

mod defaults {
    pub const fn keep_failed_secs() -> u64 {
        604_800 // 7 days
    }

    pub const fn keep_delivered_secs() -> u64 {
        0 // delete immediately
    }
}
