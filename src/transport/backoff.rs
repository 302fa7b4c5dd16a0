//! Reconnect backoff policy
//!
//! Failed connects are retried with exponential backoff, capped so a long
//! outage cannot produce excessive delays, and bounded by a retry budget so
//! the adapter eventually gives up and reports `Disconnected` instead of
//! retrying forever.

use std::time::Duration;

/// Backoff configuration for transport reconnects
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Maximum number of retry attempts before giving up
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential)
    pub backoff_multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given zero-based attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((ms as u64).min(self.max_backoff_ms))
    }

    /// Whether the retry budget is spent
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_retries
    }
}
