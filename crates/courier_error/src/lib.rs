//! Error types for the Courier dispatch core.
//!
//! This crate provides the error taxonomy shared by every Courier crate and the
//! classifier that maps remote failures onto stable categories.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern for clean error handling:
//! - `CourierErrorKind` enum defines the failure sources
//! - leaf structs (`ApiError`, `TransportError`, ...) carry source location tracking
//! - all constructors use `#[track_caller]` for automatic location capture
//!
//! Redaction and retry exhaustion wrap an existing error instead of replacing it, so
//! [`CourierError::category`] and the `source()` chain still reach the root failure.
//!
//! # Examples
//!
//! ```
//! use courier_error::{ApiError, CourierResult, ErrorCategory};
//!
//! fn send() -> CourierResult<String> {
//!     Err(ApiError::new(403, "Forbidden: bot was blocked by the user"))?
//! }
//!
//! match send() {
//!     Ok(body) => println!("Got: {}", body),
//!     Err(e) if e.is(ErrorCategory::BotBlocked) => println!("Recipient blocked us"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod category;
mod control;
mod error;
mod retryable;
mod transport;

pub use api::{ApiError, ResponseParameters};
pub use category::{Classification, ErrorCategory, classify, is_retryable_code};
pub use control::{CancelledError, CircuitOpenError, ConfigError};
pub use error::{
    CourierError, CourierErrorKind, CourierResult, RedactedError, RetriesExhaustedError,
};
pub use retryable::RetryableError;
pub use transport::{TransportError, TransportErrorKind};
