//! Errors raised by the dispatch machinery itself rather than the remote service.

use std::time::Duration;

/// A circuit breaker refused the call without running it.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Circuit '{}' is open{} at line {} in {}", breaker, detail(*half_open, *retry_in), line, file)]
pub struct CircuitOpenError {
    /// Name of the breaker that rejected the call
    pub breaker: String,
    /// The breaker was half-open and every trial slot was taken
    pub half_open: bool,
    /// Time left until the breaker admits trial calls, when known
    pub retry_in: Option<Duration>,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

fn detail(half_open: bool, retry_in: Option<Duration>) -> String {
    match (half_open, retry_in) {
        (true, _) => " (half-open, trial slots exhausted)".to_string(),
        (false, Some(left)) => format!(" (retry in {}ms)", left.as_millis()),
        (false, None) => String::new(),
    }
}

impl CircuitOpenError {
    /// Rejection by an open breaker.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_error::CircuitOpenError;
    /// use std::time::Duration;
    ///
    /// let err = CircuitOpenError::open("bot-api", Some(Duration::from_secs(2)));
    /// assert!(err.to_string().contains("bot-api"));
    /// assert!(!err.half_open);
    /// ```
    #[track_caller]
    pub fn open(breaker: impl Into<String>, retry_in: Option<Duration>) -> Self {
        Self::build(breaker.into(), false, retry_in)
    }

    /// Rejection by a half-open breaker whose trial slots are all in use.
    #[track_caller]
    pub fn half_open(breaker: impl Into<String>) -> Self {
        Self::build(breaker.into(), true, None)
    }

    #[track_caller]
    fn build(breaker: String, half_open: bool, retry_in: Option<Duration>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            breaker,
            half_open,
            retry_in,
            line: location.line(),
            file: location.file(),
        }
    }
}

/// The caller cancelled the operation while it was waiting.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Operation cancelled at line {} in {}", line, file)]
pub struct CancelledError {
    /// Line number where the cancellation was observed
    pub line: u32,
    /// File where the cancellation was observed
    pub file: &'static str,
}

impl CancelledError {
    /// Record a cancellation at the current location.
    #[track_caller]
    pub fn new() -> Self {
        let location = std::panic::Location::caller();
        Self {
            line: location.line(),
            file: location.file(),
        }
    }
}

impl Default for CancelledError {
    #[track_caller]
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration error with source location.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", message, line, file)]
pub struct ConfigError {
    /// What is wrong with the configuration
    pub message: String,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ConfigError {
    /// Create a new ConfigError with the given message at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_error::ConfigError;
    ///
    /// let err = ConfigError::new("burst must be at least 1");
    /// assert!(err.message.contains("burst"));
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: location.line(),
            file: location.file(),
        }
    }
}
