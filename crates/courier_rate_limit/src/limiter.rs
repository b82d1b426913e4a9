//! Dual-scope rate limiter.
//!
//! A call is admitted only when the global bucket and the routing key's bucket both
//! hold a token at the same instant; both are then debited together. The global
//! bucket is checked first and a rejection there never touches the per-key bucket.
//!
//! Locking: the key map sits behind one `RwLock`, every bucket behind its own
//! `Mutex`. Lock order is global bucket, then map, then key bucket. Nothing is held
//! across an `.await`.

use crate::{BucketConfig, RateLimitConfig, TokenBucket};
use courier_error::{CancelledError, ConfigError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

type SharedBucket = Arc<Mutex<TokenBucket>>;

/// Global plus per-key token bucket admission control.
///
/// # Example
///
/// ```rust,no_run
/// use courier_rate_limit::{BucketConfig, RateLimitConfig, RateLimiter};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = RateLimiter::new(RateLimitConfig {
///     global: Some(BucketConfig::new(30.0, 30)),
///     per_key: Some(BucketConfig::new(1.0, 3)),
///     idle_eviction_secs: None,
/// })?;
///
/// let cancel = CancellationToken::new();
/// limiter.wait(&cancel, "chat-42").await?;
/// // send the request...
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    global: Option<Mutex<TokenBucket>>,
    per_key: Option<BucketConfig>,
    buckets: RwLock<HashMap<String, SharedBucket>>,
    idle_eviction: Option<Duration>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a limiter from validated configuration.
    pub fn new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let now = Instant::now();
        debug!(
            global = ?config.global,
            per_key = ?config.per_key,
            idle_eviction_secs = ?config.idle_eviction_secs,
            "Creating rate limiter"
        );
        Ok(Self {
            global: config
                .active_global()
                .map(|global| Mutex::new(TokenBucket::new(global, now))),
            per_key: config.active_per_key().copied(),
            buckets: RwLock::new(HashMap::new()),
            idle_eviction: config.idle_eviction(),
            last_sweep: Mutex::new(now),
        })
    }

    /// A limiter that admits everything.
    pub fn unlimited() -> Self {
        Self {
            global: None,
            per_key: None,
            buckets: RwLock::new(HashMap::new()),
            idle_eviction: None,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Admit one call for `key` if both scopes have a token right now.
    ///
    /// Never waits. Debits nothing on rejection.
    pub fn allow(&self, key: &str) -> bool {
        self.try_admit(key).is_ok()
    }

    /// Wait until one call for `key` is admitted, then debit both scopes.
    ///
    /// Returns [`CancelledError`] if `cancel` fires first. Waiters are not queued:
    /// each one sleeps for the current time-to-token and re-checks, so admission
    /// order among waiters on one bucket is unspecified.
    #[instrument(skip(self, cancel))]
    pub async fn wait(&self, cancel: &CancellationToken, key: &str) -> Result<(), CancelledError> {
        loop {
            if cancel.is_cancelled() {
                debug!("Cancelled while waiting for admission");
                return Err(CancelledError::new());
            }
            let delay = match self.try_admit(key) {
                Ok(()) => return Ok(()),
                Err(delay) => delay,
            };
            trace!(
                delay_ms = delay.as_millis() as u64,
                "Rate limited, sleeping"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Cancelled while waiting for admission");
                    return Err(CancelledError::new());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Check both scopes and debit them together.
    ///
    /// On rejection returns how long the rejecting scope needs for its next token.
    fn try_admit(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();

        let mut global = self.global.as_ref().map(|bucket| bucket.lock());
        if let Some(bucket) = global.as_mut() {
            bucket.refill(now);
            if !bucket.has_token() {
                return Err(bucket.time_to_token());
            }
        }

        let shared = self.bucket_for(key, now);
        let mut keyed = shared.as_ref().map(|bucket| bucket.lock());
        if let Some(bucket) = keyed.as_mut() {
            bucket.refill(now);
            if !bucket.has_token() {
                return Err(bucket.time_to_token());
            }
        }

        if let Some(bucket) = global.as_mut() {
            bucket.take();
        }
        if let Some(bucket) = keyed.as_mut() {
            bucket.take();
        }
        Ok(())
    }

    /// Look up or lazily create the bucket for `key`.
    fn bucket_for(&self, key: &str, now: Instant) -> Option<SharedBucket> {
        let template = self.per_key.as_ref()?;

        if let Some(bucket) = self.buckets.read().get(key) {
            return Some(Arc::clone(bucket));
        }

        let mut buckets = self.buckets.write();
        if let Some(bucket) = buckets.get(key) {
            return Some(Arc::clone(bucket));
        }
        self.maybe_sweep(&mut buckets, now);
        trace!(key, "Creating per-key bucket");
        let bucket = Arc::new(Mutex::new(TokenBucket::new(template, now)));
        buckets.insert(key.to_string(), Arc::clone(&bucket));
        Some(bucket)
    }

    /// Run an idle sweep if one is configured and due.
    fn maybe_sweep(&self, buckets: &mut HashMap<String, SharedBucket>, now: Instant) {
        let Some(max_idle) = self.idle_eviction else {
            return;
        };
        {
            let mut last_sweep = self.last_sweep.lock();
            if now.saturating_duration_since(*last_sweep) < max_idle {
                return;
            }
            *last_sweep = now;
        }
        let evicted = evict_locked(buckets, max_idle, now);
        if evicted > 0 {
            debug!(
                evicted,
                remaining = buckets.len(),
                "Evicted idle per-key buckets"
            );
        }
    }

    /// Remove per-key buckets idle for at least `max_idle`.
    ///
    /// Only buckets that no caller currently holds and that would be full right now
    /// are removed, so a later recreation starts from the same state. Returns the
    /// number removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.write();
        let evicted = evict_locked(&mut buckets, max_idle, now);
        debug!(evicted, remaining = buckets.len(), "Idle bucket sweep");
        evicted
    }

    /// Number of per-key buckets currently held.
    pub fn key_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Whether a global bucket is configured.
    pub fn has_global(&self) -> bool {
        self.global.is_some()
    }

    /// The per-key bucket template, if per-key limiting is enabled.
    pub fn per_key(&self) -> Option<&BucketConfig> {
        self.per_key.as_ref()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

fn evict_locked(
    buckets: &mut HashMap<String, SharedBucket>,
    max_idle: Duration,
    now: Instant,
) -> usize {
    let before = buckets.len();
    // The map write lock is held, so no new clones of these Arcs can appear.
    buckets.retain(|_, bucket| {
        if Arc::strong_count(bucket) > 1 {
            return true;
        }
        match bucket.try_lock() {
            Some(inner) => {
                let idle = now.saturating_duration_since(inner.last_refill());
                idle < max_idle || !inner.is_full_at(now)
            }
            None => true,
        }
    });
    before - buckets.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(global: Option<(f64, u32)>, per_key: Option<(f64, u32)>) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            global: global.map(|(rps, burst)| BucketConfig::new(rps, burst)),
            per_key: per_key.map(|(rps, burst)| BucketConfig::new(rps, burst)),
            idle_eviction_secs: None,
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_within_burst() {
        let limiter = limiter(None, Some((1.0, 3)));
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        // Other keys have their own bucket
        assert!(limiter.allow("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_rejection_does_not_debit_key() {
        let limiter = limiter(Some((1.0, 1)), Some((0.001, 2)));
        assert!(limiter.allow("a"));
        // Global empty; key "a" keeps its second token
        assert!(!limiter.allow("a"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.allow("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_rejection_does_not_debit_global() {
        let limiter = limiter(Some((1.0, 2)), Some((1.0, 1)));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        // Global still has its second token
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_admits_everything() {
        let limiter = RateLimiter::unlimited();
        for _ in 0..1000 {
            assert!(limiter.allow("a"));
        }
        assert_eq!(limiter.key_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_rate_rejects_and_wait_stays_cancellable() {
        let limiter = limiter(None, Some((1e-20, 1)));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        assert!(limiter.wait(&cancel, "a").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_scope_admits_everything() {
        let limiter = RateLimiter::new(RateLimitConfig {
            global: Some(BucketConfig::new(1.0, 1).disabled()),
            per_key: Some(BucketConfig::new(1.0, 2)),
            idle_eviction_secs: None,
        })
        .unwrap();
        assert!(!limiter.has_global());
        assert!(limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert!(limiter.allow("c"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = RateLimiter::new(RateLimitConfig {
            global: Some(BucketConfig::new(0.0, 1)),
            ..RateLimitConfig::default()
        });
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_skips_partially_drained() {
        let limiter = limiter(None, Some((1.0, 5)));
        assert!(limiter.allow("busy"));
        assert!(limiter.allow("idle"));
        tokio::time::advance(Duration::from_secs(2)).await;
        // "busy" drains below full after its last touch
        for _ in 0..4 {
            assert!(limiter.allow("busy"));
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.evict_idle(Duration::from_millis(500)), 1);
        assert_eq!(limiter.key_count(), 1);
    }
}
