//! Retryable-error classification and backoff.
//!
//! The scheduler never retries; retry lives inside handlers that talk to
//! external services. The classifier is policy-fixed: transient provider
//! conditions retry, everything else is terminal.

use std::time::Duration;

use rand::RngExt;

/// HTTP statuses worth retrying.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 529];

/// Provider error categories worth retrying.
const RETRYABLE_CATEGORIES: [&str; 2] = ["overloaded", "rate_limit"];

/// Message fragments that mark an error transient.
const RETRYABLE_FRAGMENTS: [&str; 4] = [
    "rate limit",
    "overloaded",
    "too many requests",
    "is currently loading",
];

/// Classify an external-service failure as retryable.
#[must_use]
pub fn is_retryable(status: Option<u16>, category: Option<&str>, message: &str) -> bool {
    if status.is_some_and(|s| RETRYABLE_STATUSES.contains(&s)) {
        return true;
    }
    if category.is_some_and(|c| RETRYABLE_CATEGORIES.contains(&c)) {
        return true;
    }
    let lowered = message.to_lowercase();
    RETRYABLE_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts (first try included).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Delay ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// The delay before retry number `retry` (0-based), doubled each time,
    /// capped, with up to 10% jitter.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay);
        let jitter = rand::rng().random_range(0.0..=0.1);
        exp.mul_f64(1.0 + jitter)
    }

    /// `true` while another attempt is allowed after `attempts` tries.
    #[must_use]
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
