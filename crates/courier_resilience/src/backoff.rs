//! Exponential backoff policy.

use courier_error::ConfigError;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many times to retry and how long to wait between attempts.
///
/// Attempt `n` (zero-based) is followed by a wait of `min(base_wait * 2^n, max_wait)`.
/// There is no jitter.
///
/// # Examples
///
/// ```
/// use courier_resilience::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30));
/// assert_eq!(policy.backoff(0), Duration::from_secs(1));
/// assert_eq!(policy.backoff(2), Duration::from_secs(4));
/// assert_eq!(policy.backoff(10), Duration::from_secs(30));
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Getters, derive_setters::Setters,
)]
#[setters(prefix = "with_")]
pub struct RetryPolicy {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    max_retries: u32,

    /// Wait after the first failed attempt (milliseconds)
    #[serde(default = "default_base_wait_ms")]
    base_wait_ms: u64,

    /// Upper bound on any single wait (milliseconds)
    #[serde(default = "default_max_wait_ms")]
    max_wait_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_wait_ms() -> u64 {
    1_000
}

fn default_max_wait_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_wait_ms: default_base_wait_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy. Durations are truncated to whole milliseconds.
    pub fn new(max_retries: u32, base_wait: Duration, max_wait: Duration) -> Self {
        Self {
            max_retries,
            base_wait_ms: duration_ms(base_wait),
            max_wait_ms: duration_ms(max_wait),
        }
    }

    /// A policy that never retries.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Wait after the first failed attempt.
    pub fn base_wait(&self) -> Duration {
        Duration::from_millis(self.base_wait_ms)
    }

    /// Upper bound on any single wait.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Total attempts permitted, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait after failed attempt `attempt` (zero-based), capped at `max_wait`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let millis = 2u64
            .checked_pow(attempt)
            .and_then(|factor| self.base_wait_ms.checked_mul(factor))
            .map_or(self.max_wait_ms, |millis| millis.min(self.max_wait_ms));
        Duration::from_millis(millis)
    }

    /// Wait after failed attempt `attempt`, never shorter than a remote `retry_after` hint.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        retry_after.map_or(backoff, |hint| hint.max(backoff))
    }

    /// Reject a base wait longer than the cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_wait_ms > self.max_wait_ms {
            return Err(ConfigError::new(format!(
                "retry base_wait_ms ({}) exceeds max_wait_ms ({})",
                self.base_wait_ms, self.max_wait_ms
            )));
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
