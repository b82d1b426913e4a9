//! Configuration structures for rate limiting.
//!
//! Both scopes are optional: an absent scope is unlimited. Since file sources only
//! layer over the bundled defaults, a scope can also be switched off with
//! `enabled = false`.
//!
//! ```toml
//! [rate_limit]
//! idle_eviction_secs = 600
//!
//! [rate_limit.global]
//! rps = 30.0
//! burst = 30
//!
//! [rate_limit.per_key]
//! rps = 1.0
//! burst = 3
//! ```

use courier_error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate and burst for one token bucket.
///
/// # Examples
///
/// ```
/// use courier_rate_limit::BucketConfig;
///
/// let config = BucketConfig::new(1.0, 3);
/// assert!(config.validate("per_key").is_ok());
/// assert!(BucketConfig::new(0.0, 3).validate("per_key").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Tokens added per second
    pub rps: f64,
    /// Bucket capacity; also the number of calls admitted back to back from full
    pub burst: u32,
    /// A disabled scope admits everything
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl BucketConfig {
    /// Create a bucket configuration.
    pub fn new(rps: f64, burst: u32) -> Self {
        Self {
            rps,
            burst,
            enabled: true,
        }
    }

    /// This configuration with the scope switched off.
    pub fn disabled(self) -> Self {
        Self {
            enabled: false,
            ..self
        }
    }

    /// Check that the bucket can ever admit a call.
    pub fn validate(&self, scope: &str) -> Result<(), ConfigError> {
        if !self.rps.is_finite() || self.rps <= 0.0 {
            return Err(ConfigError::new(format!(
                "{} rate limit rps must be a positive number, got {}",
                scope, self.rps
            )));
        }
        if self.burst == 0 {
            return Err(ConfigError::new(format!(
                "{} rate limit burst must be at least 1",
                scope
            )));
        }
        Ok(())
    }
}

/// Limits applied by a [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket shared by every call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<BucketConfig>,

    /// Template for the bucket created for each routing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_key: Option<BucketConfig>,

    /// Evict per-key buckets idle for at least this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_eviction_secs: Option<u64>,
}

impl RateLimitConfig {
    /// No limits at all.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Idle eviction threshold as a duration.
    pub fn idle_eviction(&self) -> Option<Duration> {
        self.idle_eviction_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// The global bucket, if present and enabled.
    pub fn active_global(&self) -> Option<&BucketConfig> {
        self.global.as_ref().filter(|bucket| bucket.enabled)
    }

    /// The per-key bucket template, if present and enabled.
    pub fn active_per_key(&self) -> Option<&BucketConfig> {
        self.per_key.as_ref().filter(|bucket| bucket.enabled)
    }

    /// Validate every active scope.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(global) = self.active_global() {
            global.validate("global")?;
        }
        if let Some(per_key) = self.active_per_key() {
            per_key.validate("per_key")?;
        }
        Ok(())
    }
}
