//! Fault tolerance for the Courier dispatch core.
//!
//! - [`CircuitBreaker`] rejects calls fast while the remote side is failing
//! - [`Retrier`] repeats retryable failures on an exponential [`RetryPolicy`]
//! - [`Sleeper`] abstracts the waits between attempts so tests run without real time
//!
//! All three are driven by `tokio` time and honour a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod backoff;
mod breaker;
mod retry;
mod sleeper;

pub use backoff::RetryPolicy;
pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState, Counts, StateChangeHook};
pub use retry::Retrier;
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
