//! Admission control for outbound calls.
//!
//! [`RateLimiter`] combines one optional global [`TokenBucket`] with lazily
//! created per-routing-key buckets. A call goes through only when both scopes
//! have a token, and then both are debited.
//!
//! ```rust,no_run
//! use courier_rate_limit::{BucketConfig, RateLimitConfig, RateLimiter};
//!
//! let limiter = RateLimiter::new(RateLimitConfig {
//!     global: Some(BucketConfig::new(30.0, 30)),
//!     per_key: Some(BucketConfig::new(1.0, 3)),
//!     idle_eviction_secs: Some(600),
//! })
//! .unwrap();
//!
//! if limiter.allow("chat-42") {
//!     // send now
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bucket;
mod config;
mod limiter;

pub use bucket::TokenBucket;
pub use config::{BucketConfig, RateLimitConfig};
pub use limiter::RateLimiter;
