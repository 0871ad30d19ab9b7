//! Retry policy for dispatch operations.
//!
//! Encapsulates the retry budget and the reschedule delay calculation so the
//! behavior can be tested independently of the delivery task.

use std::time::{Duration, SystemTime};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How reschedule delays grow across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetrySchedule {
    /// Every reschedule waits the base delay.
    Fixed,
    /// Delays double per reschedule, capped at the configured maximum.
    #[default]
    Backoff,
}

/// Retry policy configuration for dispatch operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of transient-failure reschedules before forcing a
    /// terminal failure.
    ///
    /// Default: 25
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts (in seconds).
    ///
    /// With the backoff schedule the actual delay is
    /// `base * 2^(retries - 1)`, capped at `max_retry_delay_secs`.
    ///
    /// Default: 300 seconds (5 minutes)
    #[serde(default = "defaults::base_retry_delay_secs")]
    pub base_retry_delay_secs: u64,

    /// Maximum delay between attempts (in seconds).
    ///
    /// Default: 86400 seconds (24 hours)
    #[serde(default = "defaults::max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,

    /// Jitter factor for randomizing delays.
    ///
    /// Jitter prevents thundering herd problems when many entries retry
    /// simultaneously. The delay is randomized within ±`jitter_factor`.
    ///
    /// Default: 0.1 (±10%)
    #[serde(default = "defaults::retry_jitter_factor")]
    pub retry_jitter_factor: f64,

    /// Delay growth schedule.
    #[serde(default)]
    pub schedule: RetrySchedule,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_retry_delay_secs: defaults::base_retry_delay_secs(),
            max_retry_delay_secs: defaults::max_retry_delay_secs(),
            retry_jitter_factor: defaults::retry_jitter_factor(),
            schedule: RetrySchedule::default(),
        }
    }
}

impl RetryPolicy {
    /// Check if another reschedule fits the budget.
    ///
    /// `retry_count` is the number of reschedules already performed.
    #[must_use]
    pub const fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Calculate when the next attempt should occur.
    ///
    /// # Arguments
    /// * `retry_count` - Number of reschedules performed so far, including
    ///   the one being scheduled (1-indexed)
    #[must_use]
    pub fn next_retry(&self, retry_count: u32) -> SystemTime {
        match self.schedule {
            RetrySchedule::Fixed => jittered_delay_from(
                self.base_retry_delay_secs,
                self.retry_jitter_factor,
            ),
            RetrySchedule::Backoff => calculate_next_retry_time(
                retry_count,
                self.base_retry_delay_secs,
                self.max_retry_delay_secs,
                self.retry_jitter_factor,
            ),
        }
    }

    /// Get the number of reschedules left in the budget.
    #[must_use]
    pub const fn remaining_retries(&self, retry_count: u32) -> u32 {
        self.max_retries.saturating_sub(retry_count)
    }
}

/// Calculate the next retry time using exponential backoff with jitter
///
/// # Formula
/// `delay = min(base * 2^(attempt - 1), max_delay) * (1 ± jitter)`
///
/// # Arguments
/// * `attempt` - The attempt number (1-indexed)
/// * `base_delay_secs` - Base delay in seconds
/// * `max_delay_secs` - Maximum delay in seconds
/// * `jitter_factor` - Jitter factor (e.g., 0.1 for ±10%)
fn calculate_next_retry_time(
    attempt: u32,
    base_delay_secs: u64,
    max_delay_secs: u64,
    jitter_factor: f64,
) -> SystemTime {
    // Use saturating operations to prevent overflow
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        // 2^63 would overflow, use max_delay directly
        max_delay_secs
    } else {
        let multiplier = 1u64 << exponent; // 2^exponent
        base_delay_secs
            .saturating_mul(multiplier)
            .min(max_delay_secs)
    };

    jittered_delay_from(delay, jitter_factor)
}

/// Apply jitter: `delay * (1 ± jitter_factor)` added to now.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "Intentional precision loss and casting for randomization"
)]
fn jittered_delay_from(delay_secs: u64, jitter_factor: f64) -> SystemTime {
    let jittered = if jitter_factor > 0.0 {
        let jitter_range = (delay_secs as f64) * jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        ((delay_secs as f64) + jitter).max(0.0) as u64
    } else {
        delay_secs
    };

    SystemTime::now() + Duration::from_secs(jittered)
}

mod defaults {
    pub const fn max_retries() -> u32 {
        25
    }

    pub const fn base_retry_delay_secs() -> u64 {
        300 // 5 minutes
    }

    pub const fn max_retry_delay_secs() -> u64 {
        86400 // 24 hours
    }

    pub const fn retry_jitter_factor() -> f64 {
        0.1 // ±10%
    }
}
