//! Metrics collection for dispatched calls.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for dispatched calls. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct DispatchMetrics {
    inner: Arc<DispatchMetricsInner>,
}

#[derive(Debug)]
struct DispatchMetricsInner {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    circuit_rejections: AtomicU64,
    cancelled: AtomicU64,
    last_success: parking_lot::Mutex<Option<Instant>>,
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchMetrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatchMetricsInner {
                dispatched: AtomicU64::new(0),
                succeeded: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                retries: AtomicU64::new(0),
                circuit_rejections: AtomicU64::new(0),
                cancelled: AtomicU64::new(0),
                last_success: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Records the start of a dispatch.
    pub fn record_dispatch(&self) {
        self.inner.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dispatch that returned a response.
    pub fn record_success(&self) {
        self.inner.succeeded.fetch_add(1, Ordering::Relaxed);
        *self.inner.last_success.lock() = Some(Instant::now());
    }

    /// Records a dispatch that ended in a remote or transport failure.
    pub fn record_failure(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one retry attempt.
    pub fn record_retry(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dispatch rejected by the circuit breaker.
    pub fn record_circuit_rejection(&self) {
        self.inner.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dispatch cancelled by the caller.
    pub fn record_cancelled(&self) {
        self.inner.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Dispatches started.
    pub fn dispatched(&self) -> u64 {
        self.inner.dispatched.load(Ordering::Relaxed)
    }

    /// Dispatches that succeeded.
    pub fn succeeded(&self) -> u64 {
        self.inner.succeeded.load(Ordering::Relaxed)
    }

    /// Dispatches that failed.
    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }

    /// Retry attempts made.
    pub fn retries(&self) -> u64 {
        self.inner.retries.load(Ordering::Relaxed)
    }

    /// Dispatches rejected by the breaker.
    pub fn circuit_rejections(&self) -> u64 {
        self.inner.circuit_rejections.load(Ordering::Relaxed)
    }

    /// Dispatches cancelled.
    pub fn cancelled(&self) -> u64 {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Time since the last successful dispatch.
    pub fn time_since_success(&self) -> Option<std::time::Duration> {
        self.inner
            .last_success
            .lock()
            .map(|instant| instant.elapsed())
    }

    /// Share of finished dispatches that succeeded (0.0 - 1.0).
    pub fn success_rate(&self) -> f64 {
        let succeeded = self.succeeded();
        let finished = succeeded + self.failed() + self.circuit_rejections() + self.cancelled();
        if finished == 0 {
            return 1.0;
        }
        succeeded as f64 / finished as f64
    }

    /// Creates a serializable snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched: self.dispatched(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            retries: self.retries(),
            circuit_rejections: self.circuit_rejections(),
            cancelled: self.cancelled(),
            seconds_since_success: self.time_since_success().map(|d| d.as_secs()),
            success_rate: self.success_rate(),
        }
    }
}

/// Serializable snapshot of dispatch metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Dispatches started
    pub dispatched: u64,
    /// Dispatches that succeeded
    pub succeeded: u64,
    /// Dispatches that failed
    pub failed: u64,
    /// Retry attempts
    pub retries: u64,
    /// Breaker rejections
    pub circuit_rejections: u64,
    /// Cancellations
    pub cancelled: u64,
    /// Seconds since the last success
    pub seconds_since_success: Option<u64>,
    /// Share of finished dispatches that succeeded
    pub success_rate: f64,
}
