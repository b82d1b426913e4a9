//! Retry orchestration.

use crate::{RetryPolicy, Sleeper, TokioSleeper};
use courier_error::{CancelledError, RetryableError};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs an operation until it succeeds, fails permanently, runs out of retries or
/// is cancelled.
///
/// The orchestrator knows nothing about concrete errors: it asks the error itself
/// (through [`RetryableError`]) whether another attempt makes sense and whether the
/// remote side asked for a minimum delay.
#[derive(Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Retrier {
    /// Retrier sleeping on the tokio timer.
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(TokioSleeper))
    }

    /// Retrier with an injected sleeper.
    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    /// The backoff policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` with the policy's retry budget.
    ///
    /// `op` receives the zero-based attempt index. Outcomes:
    ///
    /// - success is returned as soon as it happens
    /// - a non-retryable error is returned as is, without further attempts
    /// - when every attempt failed, the last error is passed through
    ///   [`RetryableError::exhausted`]
    /// - cancellation (before an attempt or during a wait) returns the
    ///   cancellation error, not the last failure
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_error::{ApiError, CourierError, CourierResult};
    /// use courier_resilience::{RecordingSleeper, Retrier, RetryPolicy};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
    /// let sleeper = RecordingSleeper::new();
    /// let retrier = Retrier::with_sleeper(
    ///     RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30)),
    ///     Arc::new(sleeper.clone()),
    /// );
    ///
    /// let result: CourierResult<()> = retrier
    ///     .run(&CancellationToken::new(), |_attempt| async {
    ///         Err(CourierError::from(ApiError::new(502, "Bad Gateway")))
    ///     })
    ///     .await;
    ///
    /// assert!(result.is_err());
    /// assert_eq!(sleeper.recorded().len(), 3);
    /// # });
    /// ```
    pub async fn run<T, E, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, E>
    where
        E: RetryableError + From<CancelledError>,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                debug!(attempt, "Cancelled before attempt");
                return Err(CancelledError::new().into());
            }

            let err = match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(attempt, "Permanent failure, not retrying");
                return Err(err);
            }

            if attempt >= *self.policy.max_retries() {
                warn!(attempts = attempt + 1, "Retries exhausted");
                return Err(err.exhausted(attempt + 1));
            }

            let delay = self.policy.delay_for(attempt, err.retry_after());
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retryable failure, backing off"
            );
            self.sleeper.sleep(delay, cancel).await?;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordingSleeper;
    use courier_error::{ApiError, CourierError, CourierResult, ErrorCategory};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn retrier(sleeper: &RecordingSleeper) -> Retrier {
        Retrier::with_sleeper(
            RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30)),
            Arc::new(sleeper.clone()),
        )
    }

    #[tokio::test]
    async fn test_success_first_try_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let result: CourierResult<u32> = retrier(&sleeper)
            .run(&CancellationToken::new(), |_| async { Ok(7) })
            .await;
        assert_eq!(result.ok(), Some(7));
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let sleeper = RecordingSleeper::new();
        let result: CourierResult<u32> = retrier(&sleeper)
            .run(&CancellationToken::new(), |attempt| async move {
                if attempt < 2 {
                    Err(ApiError::new(503, "Service Unavailable").into())
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.ok(), Some(2));
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let result: CourierResult<()> = retrier(&sleeper)
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::new(400, "Bad Request: chat not found").into()) }
            })
            .await;
        let err = result.unwrap_err();
        assert!(err.is(ErrorCategory::ChatNotFound));
        assert!(!err.is(ErrorCategory::RetriesExhausted));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_last_failure() {
        let sleeper = RecordingSleeper::new();
        let cancel = CancellationToken::new();
        let result: CourierResult<()> = retrier(&sleeper)
            .run(&cancel, |_| {
                cancel.cancel();
                async { Err(CourierError::from(ApiError::new(500, "Internal Server Error"))) }
            })
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
