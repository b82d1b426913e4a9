//! Cancellable delays.
//!
//! Every wait between retries goes through a [`Sleeper`], so tests can swap in
//! [`RecordingSleeper`] and check the exact backoff schedule without real time
//! passing.

use async_trait::async_trait;
use courier_error::CancelledError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A cancellable delay.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`, or return [`CancelledError`] as soon as `cancel` fires.
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken)
    -> Result<(), CancelledError>;
}

/// Real delay on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), CancelledError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CancelledError::new()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Records every requested delay and returns immediately.
///
/// Clones share the same record.
///
/// # Examples
///
/// ```
/// use courier_resilience::{RecordingSleeper, Sleeper};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test_block_on(async {
/// let sleeper = RecordingSleeper::new();
/// let cancel = CancellationToken::new();
/// sleeper.sleep(Duration::from_secs(4), &cancel).await.unwrap();
/// assert_eq!(sleeper.recorded(), vec![Duration::from_secs(4)]);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.calls.lock().clone()
    }

    /// Sum of all requested delays.
    pub fn total(&self) -> Duration {
        self.calls.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), CancelledError> {
        self.calls.lock().push(duration);
        if cancel.is_cancelled() {
            return Err(CancelledError::new());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_waits() {
        let start = tokio::time::Instant::now();
        TokioSleeper
            .sleep(Duration::from_secs(3), &CancellationToken::new())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_cancelled_mid_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let start = tokio::time::Instant::now();
        let result = TokioSleeper.sleep(Duration::from_secs(60), &cancel).await;
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_recording_sleeper_reports_cancellation() {
        let sleeper = RecordingSleeper::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(sleeper.sleep(Duration::from_secs(1), &cancel).await.is_err());
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_recording_sleeper_clones_share_record() {
        let sleeper = RecordingSleeper::new();
        let clone = sleeper.clone();
        let cancel = CancellationToken::new();
        clone.sleep(Duration::from_secs(1), &cancel).await.unwrap();
        clone.sleep(Duration::from_secs(2), &cancel).await.unwrap();
        assert_eq!(sleeper.total(), Duration::from_secs(3));
    }
}
