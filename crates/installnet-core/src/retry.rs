//! Retry policy: how many times an operation may run, and how long to wait in between.

use std::time::Duration;

/// Retry policy for operations whose failure is expected now and then
/// (the capture parser crashing, for instance).
///
/// `max_attempts` counts the first try: `max_attempts = 2` means exactly one
/// retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// One retry after a short pause. Used for capture parsing.
    pub fn retry_once() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }

    /// Same bound without waiting (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// May another attempt follow attempt number `attempts` (1-indexed)?
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// delay = base_delay * multiplier^(attempts - 1)
    ///
    /// - attempt 1 (first failure): base_delay
    /// - attempt 2: base_delay * multiplier
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs)
    }
}
