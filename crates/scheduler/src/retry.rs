//! Retry decision and exponential backoff.

use std::time::Duration;

use crate::types::DEFAULT_MAX_ATTEMPTS;

/// Decides whether a failed attempt gets another try and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Backoff unit: attempt `n` waits `base * 2^n`.
    pub base: Duration,
    /// Upper bound for a single backoff.
    pub max_backoff: Duration,
    /// Attempts per occurrence when the job does not set its own.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_backoff,
            max_attempts,
        }
    }

    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn should_retry(&self, attempt: u32, max_attempts: u32) -> bool {
        attempt < max_attempts
    }

    /// Delay before the attempt following `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}
