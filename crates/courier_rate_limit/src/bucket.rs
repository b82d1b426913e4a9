//! Token bucket with lazy refill.

use crate::BucketConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Shortest wait handed back to a blocked caller, to avoid spinning on float error.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Token bucket for a single scope.
///
/// Tokens only change on refill (computed from elapsed time) or take, and always
/// stay within `0..=capacity`. Callers hold the bucket's mutex for the whole
/// check-and-take.
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens
    capacity: f64,
    /// Current available tokens
    tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// Last refill time
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(config: &BucketConfig, now: Instant) -> Self {
        let capacity = f64::from(config.burst);
        Self {
            capacity,
            tokens: capacity,
            refill_rate: config.rps,
            last_refill: now,
        }
    }

    /// Refill tokens based on elapsed time.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let tokens_to_add = elapsed.as_secs_f64() * self.refill_rate;
        self.tokens = (self.tokens + tokens_to_add).min(self.capacity);
        self.last_refill = now;
    }

    /// Whether at least one whole token is available. Call [`refill`](Self::refill) first.
    pub fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    /// Remove one token. Only valid after [`has_token`](Self::has_token) returned true.
    pub fn take(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    /// Refill, then take a token if one is available.
    ///
    /// Returns the time until a token will be available on failure.
    pub fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.has_token() {
            self.take();
            Ok(())
        } else {
            Err(self.time_to_token())
        }
    }

    /// Time until one whole token is available, assuming no other taker.
    ///
    /// Saturates at [`Duration::MAX`] for rates too slow to represent.
    pub fn time_to_token(&self) -> Duration {
        if self.has_token() {
            return Duration::ZERO;
        }
        let tokens_needed = 1.0 - self.tokens;
        Duration::try_from_secs_f64(tokens_needed / self.refill_rate)
            .unwrap_or(Duration::MAX)
            .max(MIN_WAIT)
    }

    /// Current token count (fractional) as of the last refill.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Bucket capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// When the bucket was last touched.
    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// Whether the bucket would be full at `now`, without mutating it.
    pub fn is_full_at(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens + elapsed.as_secs_f64() * self.refill_rate >= self.capacity
    }
}
