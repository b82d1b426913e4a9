//! Transport-level failures.
//!
//! A transport error means the request never produced a structured reply from the
//! remote service: the connection failed, timed out, or the reply could not be read.
//! The message may embed the full request URL, credentials included, so it must be
//! scrubbed before it leaves the dispatcher.

/// What went wrong below the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum TransportErrorKind {
    /// Could not establish a connection
    #[display("connect")]
    Connect,
    /// The request or the response timed out
    #[display("timeout")]
    Timeout,
    /// The request could not be built or sent
    #[display("request")]
    Request,
    /// The response body could not be decoded
    #[display("decode")]
    Decode,
    /// Anything else the transport reports
    #[display("other")]
    Other,
}

impl TransportErrorKind {
    /// Connection failures and timeouts are worth another attempt; the rest are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::Connect | TransportErrorKind::Timeout
        )
    }
}

/// Transport error with source location.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Transport Error ({}): {} at line {} in {}", kind, message, line, file)]
pub struct TransportError {
    /// Failure class
    pub kind: TransportErrorKind,
    /// The underlying error message
    pub message: String,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl TransportError {
    /// Create a new TransportError of the given kind at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_error::{TransportError, TransportErrorKind};
    ///
    /// let err = TransportError::new(TransportErrorKind::Timeout, "deadline elapsed");
    /// assert!(err.kind.is_retryable());
    /// ```
    #[track_caller]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: location.line(),
            file: location.file(),
        }
    }
}
