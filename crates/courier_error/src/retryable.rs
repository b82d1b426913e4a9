//! The seam between retry orchestration and a concrete error taxonomy.

use std::time::Duration;

/// Trait for errors that support retry logic.
///
/// The retry orchestrator only needs three answers from an error: may the call be
/// repeated, did the remote side ask for a minimum delay, and how should the error
/// look once every permitted attempt has failed.
///
/// # Examples
///
/// ```
/// use courier_error::{ApiError, CourierError, RetryableError};
/// use std::time::Duration;
///
/// let err = CourierError::from(ApiError::new(429, "Too Many Requests: retry after 5"));
/// assert!(err.is_retryable());
/// assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
///
/// let err = CourierError::from(ApiError::new(400, "Bad Request: chat not found"));
/// assert!(!err.is_retryable());
/// ```
pub trait RetryableError {
    /// Returns true if this error should trigger another attempt.
    ///
    /// Transient failures (throttling, server errors, connection failures) return
    /// true. Permanent failures (bad request, unauthorized) return false.
    fn is_retryable(&self) -> bool;

    /// Minimum delay requested by the remote side before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Convert the last attempt's error into the error reported after giving up.
    fn exhausted(self, attempts: u32) -> Self
    where
        Self: Sized,
    {
        let _ = attempts;
        self
    }
}
