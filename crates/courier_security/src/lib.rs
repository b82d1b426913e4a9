//! Credential handling for the Courier dispatch core.
//!
//! Bot credentials travel inside request URLs, which means they also travel inside
//! transport error messages. This crate keeps them out of logs and user-visible
//! output:
//!
//! - [`SecretToken`] holds the credential, zeroes it on drop and hides it from `Debug`
//! - [`scrub`] / [`SecretScrubber`] replace the credential in error text with
//!   [`REDACTION_MARKER`] without losing the original error for category checks

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod scrub;
mod secret;

pub use scrub::{REDACTION_MARKER, SecretScrubber, scrub, scrub_result};
pub use secret::SecretToken;
