//! Exponential backoff for transient-failure retries.
//!
//! The executor applies backoff only to transport-classified transient
//! failures (connection reset, timeout), never to application statuses.

use std::time::Duration;

/// Exponential backoff with a cap.
///
/// The delay for attempt `n` is `initial * 2^n`, saturating at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff policy with the given bounds.
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Compute the delay before retrying after the given zero-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(30);
        let initial_ms = self.initial.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let delay_ms = initial_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(max_ms);
        Duration::from_millis(delay_ms)
    }
}
