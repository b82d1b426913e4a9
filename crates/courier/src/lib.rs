//! Courier - resilient request dispatch for rate-limited bot APIs
//!
//! Courier decides whether, when and how an outbound call may run against a remote
//! service that throttles and occasionally fails. Every call goes through:
//!
//! 1. **Admission**: a global and a per-routing-key token bucket
//! 2. **Circuit breaking**: fast rejection while the service is failing
//! 3. **The transport**: a user-supplied [`Transport`]
//! 4. **Retries**: exponential backoff for retryable failures, honouring the
//!    service's `retry_after` hint
//! 5. **Scrubbing**: the bot credential is removed from every error
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier::{CourierConfig, Dispatcher};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CourierConfig::load()?;
//!     courier::init_tracing(config.logging())?;
//!
//!     let dispatcher = Dispatcher::from_config(MyHttpTransport::new(), &config)?;
//!     let cancel = CancellationToken::new();
//!     let response = dispatcher.dispatch(&cancel, "chat-42", &request).await?;
//!     println!("Response: {:?}", response);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Courier is organized as a workspace with focused crates:
//!
//! - `courier_error` - Error taxonomy and failure classification
//! - `courier_security` - Credential storage and error scrubbing
//! - `courier_rate_limit` - Token bucket admission control
//! - `courier_resilience` - Circuit breaker, retry policy and sleepers
//!
//! This crate (`courier`) wires them together and re-exports everything for convenience.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod dispatcher;
mod metrics;
mod telemetry;
mod transport;

pub use config::{CourierConfig, LogFormat, LoggingConfig};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use telemetry::init_tracing;
pub use transport::Transport;

// Re-export core crates
pub use courier_error::*;
pub use courier_rate_limit::*;
pub use courier_resilience::*;
pub use courier_security::*;
