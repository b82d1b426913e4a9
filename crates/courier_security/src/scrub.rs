//! Credential redaction for error text.
//!
//! Transports tend to embed the full request URL in their errors, and for bot APIs
//! that URL carries the token. Scrubbing replaces every literal occurrence of the
//! secret with [`REDACTION_MARKER`] while keeping the original error reachable, so
//! `category()` checks and `source()` walks still see the real failure.

use crate::SecretToken;
use courier_error::{CourierError, CourierResult, RedactedError};
use std::borrow::Cow;
use tracing::debug;

/// Text that replaces each occurrence of a secret.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Remove `secret` from the text of `err`.
///
/// Returns `err` untouched when the secret is empty or does not occur in the
/// error's text. Otherwise returns a new error whose text has every occurrence
/// replaced, wrapping the original.
///
/// # Examples
///
/// ```
/// use courier_error::{CourierError, ErrorCategory, TransportError, TransportErrorKind};
/// use courier_security::{SecretToken, scrub};
///
/// let secret = SecretToken::new("123:ABC");
/// let err: CourierError = TransportError::new(
///     TransportErrorKind::Timeout,
///     "POST https://api.example.org/bot123:ABC/sendMessage timed out",
/// )
/// .into();
///
/// let scrubbed = scrub(err, &secret);
/// assert!(!scrubbed.to_string().contains("123:ABC"));
/// assert!(scrubbed.transport_error().is_some());
/// ```
pub fn scrub(err: CourierError, secret: &SecretToken) -> CourierError {
    if secret.is_empty() {
        return err;
    }
    let text = err.kind().to_string();
    if !text.contains(secret.expose()) {
        return err;
    }
    debug!("Redacting credential from error text");
    let message = text.replace(secret.expose(), REDACTION_MARKER);
    RedactedError::new(message, err).into()
}

/// Scrub the error side of a result; `Ok` passes through.
pub fn scrub_result<T>(result: CourierResult<T>, secret: &SecretToken) -> CourierResult<T> {
    result.map_err(|err| scrub(err, secret))
}

/// Holds a credential and scrubs it from errors and free text.
///
/// # Examples
///
/// ```
/// use courier_security::{SecretScrubber, SecretToken};
///
/// let scrubber = SecretScrubber::new(SecretToken::new("123:ABC"));
/// assert_eq!(
///     scrubber.scrub_text("GET /bot123:ABC/getMe"),
///     "GET /bot[REDACTED]/getMe"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct SecretScrubber {
    secret: SecretToken,
}

impl SecretScrubber {
    /// Create a scrubber for one credential.
    pub fn new(secret: SecretToken) -> Self {
        Self { secret }
    }

    /// The credential being scrubbed.
    pub fn secret(&self) -> &SecretToken {
        &self.secret
    }

    /// See [`scrub`].
    pub fn scrub(&self, err: CourierError) -> CourierError {
        scrub(err, &self.secret)
    }

    /// See [`scrub_result`].
    pub fn scrub_result<T>(&self, result: CourierResult<T>) -> CourierResult<T> {
        scrub_result(result, &self.secret)
    }

    /// Redact the credential from arbitrary text, borrowing when nothing changes.
    pub fn scrub_text<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.secret.is_empty() || !text.contains(self.secret.expose()) {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(text.replace(self.secret.expose(), REDACTION_MARKER))
        }
    }
}
