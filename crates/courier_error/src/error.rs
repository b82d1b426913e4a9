//! Top-level error wrapper types.

use crate::{
    ApiError, CancelledError, CircuitOpenError, Classification, ConfigError, ErrorCategory,
    RetryableError, TransportError, classify, is_retryable_code,
};
use std::time::Duration;

/// An error whose text had credential material replaced.
///
/// The original error stays reachable through [`std::error::Error::source`] and
/// [`CourierError::root`] so category checks keep working.
#[derive(Debug, derive_more::Display)]
#[display("{}", message)]
pub struct RedactedError {
    message: String,
    original: CourierError,
}

impl RedactedError {
    /// Wrap `original`, presenting `message` in its place.
    pub fn new(message: impl Into<String>, original: CourierError) -> Self {
        Self {
            message: message.into(),
            original,
        }
    }

    /// The redacted text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The error before redaction.
    pub fn original(&self) -> &CourierError {
        &self.original
    }
}

/// Every permitted attempt failed; holds the last attempt's error.
#[derive(Debug, derive_more::Display)]
#[display("gave up after {} attempts: {}", attempts, last.kind())]
pub struct RetriesExhaustedError {
    attempts: u32,
    last: CourierError,
}

impl RetriesExhaustedError {
    /// Wrap the last error after `attempts` attempts.
    pub fn new(attempts: u32, last: CourierError) -> Self {
        Self { attempts, last }
    }

    /// Number of attempts made, the first one included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Error reported by the final attempt.
    pub fn last(&self) -> &CourierError {
        &self.last
    }
}

/// Every way a dispatched call can fail.
///
/// # Examples
///
/// ```
/// use courier_error::{ApiError, CourierError, CourierErrorKind};
///
/// let err: CourierError = ApiError::new(404, "Not Found").into();
/// assert!(matches!(err.kind(), CourierErrorKind::Api(_)));
/// assert!(format!("{}", err).contains("API Error 404"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display)]
pub enum CourierErrorKind {
    /// The remote service reported a structured failure
    #[from(ApiError)]
    Api(ApiError),
    /// The request failed below the API layer
    #[from(TransportError)]
    Transport(TransportError),
    /// A circuit breaker rejected the call before it ran
    #[from(CircuitOpenError)]
    CircuitOpen(CircuitOpenError),
    /// The caller cancelled the call
    #[from(CancelledError)]
    Cancelled(CancelledError),
    /// Invalid configuration
    #[from(ConfigError)]
    Config(ConfigError),
    /// Credential material was scrubbed from the wrapped error
    #[from(RedactedError)]
    Redacted(RedactedError),
    /// Retries ran out; wraps the last attempt's error
    #[from(RetriesExhaustedError)]
    RetriesExhausted(RetriesExhaustedError),
}

impl std::error::Error for CourierErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CourierErrorKind::Api(e) => Some(e),
            CourierErrorKind::Transport(e) => Some(e),
            CourierErrorKind::CircuitOpen(e) => Some(e),
            CourierErrorKind::Cancelled(e) => Some(e),
            CourierErrorKind::Config(e) => Some(e),
            CourierErrorKind::Redacted(e) => Some(&e.original),
            CourierErrorKind::RetriesExhausted(e) => Some(&e.last),
        }
    }
}

/// Courier error with kind discrimination.
///
/// # Examples
///
/// ```
/// use courier_error::{CourierError, CourierResult, ConfigError};
///
/// fn might_fail() -> CourierResult<()> {
///     Err(ConfigError::new("max_half_open_requests must be at least 1"))?
/// }
///
/// match might_fail() {
///     Ok(_) => println!("Success"),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
#[derive(Debug, derive_more::Display)]
#[display("Courier Error: {}", _0)]
pub struct CourierError(Box<CourierErrorKind>);

impl std::error::Error for CourierError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(self.kind())
    }
}

impl CourierError {
    /// Create a new error from a kind.
    pub fn new(kind: CourierErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &CourierErrorKind {
        &self.0
    }

    /// The innermost error, looking through redaction and retry wrappers.
    pub fn root(&self) -> &CourierError {
        let mut current = self;
        loop {
            match current.kind() {
                CourierErrorKind::Redacted(e) => current = &e.original,
                CourierErrorKind::RetriesExhausted(e) => current = &e.last,
                _ => return current,
            }
        }
    }

    /// Category of the root failure; `None` when uncategorized.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_error::{ApiError, CourierError, ErrorCategory, RetryableError};
    ///
    /// let err = CourierError::from(ApiError::new(400, "Bad Request: chat not found"));
    /// assert_eq!(err.category(), Some(ErrorCategory::ChatNotFound));
    ///
    /// let err = CourierError::from(ApiError::new(500, "Internal Server Error")).exhausted(4);
    /// assert_eq!(err.category(), None);
    /// ```
    pub fn category(&self) -> Option<ErrorCategory> {
        match self.root().kind() {
            CourierErrorKind::Api(e) => classify(e.code, &e.description),
            CourierErrorKind::CircuitOpen(_) => Some(ErrorCategory::CircuitOpen),
            CourierErrorKind::Cancelled(_) => Some(ErrorCategory::Cancelled),
            _ => None,
        }
    }

    /// Whether this error, or any error it wraps, belongs to `category`.
    pub fn is(&self, category: ErrorCategory) -> bool {
        if category == ErrorCategory::RetriesExhausted {
            return self.retries_exhausted().is_some();
        }
        self.category() == Some(category)
    }

    /// The remote failure at the root, if there is one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self.root().kind() {
            CourierErrorKind::Api(e) => Some(e),
            _ => None,
        }
    }

    /// The transport failure at the root, if there is one.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self.root().kind() {
            CourierErrorKind::Transport(e) => Some(e),
            _ => None,
        }
    }

    /// The retry wrapper, if retries ran out.
    pub fn retries_exhausted(&self) -> Option<&RetriesExhaustedError> {
        let mut current = self;
        loop {
            match current.kind() {
                CourierErrorKind::RetriesExhausted(e) => return Some(e),
                CourierErrorKind::Redacted(e) => current = &e.original,
                _ => return None,
            }
        }
    }

    /// The outermost redaction wrapper, if the error was scrubbed.
    pub fn redacted(&self) -> Option<&RedactedError> {
        let mut current = self;
        loop {
            match current.kind() {
                CourierErrorKind::Redacted(e) => return Some(e),
                CourierErrorKind::RetriesExhausted(e) => current = &e.last,
                _ => return None,
            }
        }
    }

    /// Whether the root failure is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root().kind(), CourierErrorKind::Cancelled(_))
    }

    /// Whether the root failure is a circuit breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self.root().kind(), CourierErrorKind::CircuitOpen(_))
    }

    /// Summarize the failure for retry decisions and logging.
    ///
    /// The description is taken from the outermost error, so a scrubbed error
    /// never leaks the original text here.
    pub fn classify(&self) -> Classification {
        let root = self.root();
        let (code, description) = match root.kind() {
            CourierErrorKind::Api(e) => (Some(e.code), e.description.clone()),
            CourierErrorKind::Transport(e) => (None, e.message.clone()),
            _ => (None, String::new()),
        };
        let description = self
            .redacted()
            .map(|e| e.message.clone())
            .unwrap_or(description);
        Classification {
            code,
            description,
            category: self.category(),
            retry_after: self.retry_after(),
            retryable: self.is_retryable(),
        }
    }
}

impl RetryableError for CourierError {
    fn is_retryable(&self) -> bool {
        if self.retries_exhausted().is_some() {
            return false;
        }
        match self.root().kind() {
            CourierErrorKind::Api(e) => is_retryable_code(e.code),
            CourierErrorKind::Transport(e) => e.kind.is_retryable(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.api_error().and_then(ApiError::retry_after)
    }

    fn exhausted(self, attempts: u32) -> Self {
        CourierError::new(RetriesExhaustedError::new(attempts, self).into())
    }
}

// Generic From implementation for any type that converts to CourierErrorKind
impl<T> From<T> for CourierError
where
    T: Into<CourierErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Courier operations.
pub type CourierResult<T> = std::result::Result<T, CourierError>;
