//! The composition root: admission, circuit breaking, retries and scrubbing
//! around a [`Transport`].

use crate::{CourierConfig, DispatchMetrics, Transport};
use courier_error::{CancelledError, CourierError, CourierResult, RetryableError};
use courier_rate_limit::RateLimiter;
use courier_resilience::{
    BreakerConfig, CircuitBreaker, Retrier, RetryPolicy, Sleeper, TokioSleeper,
};
use courier_security::{SecretScrubber, SecretToken};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Sends requests through the rate limiter, circuit breaker and retry policy.
///
/// Each attempt waits for rate-limiter admission, then runs through the breaker.
/// Only retryable failures (throttling, 5xx, connect and timeout errors) count
/// against the breaker; a permanent "chat not found" says nothing about the
/// service's health. Errors are scrubbed of the bot credential before they are
/// logged or returned.
///
/// The limiter and breaker are shared with `Arc` so several dispatchers (or
/// callers inspecting breaker state) can use the same instances.
pub struct Dispatcher<T: Transport> {
    transport: T,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    retrier: Retrier,
    scrubber: SecretScrubber,
    metrics: DispatchMetrics,
}

impl<T: Transport> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("limiter", &self.limiter)
            .field("breaker", &self.breaker)
            .field("retrier", &self.retrier)
            .field("scrubber", &self.scrubber)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Start building a dispatcher around `transport`.
    pub fn builder(transport: T) -> DispatcherBuilder<T> {
        DispatcherBuilder::new(transport)
    }

    /// Build a dispatcher from loaded configuration.
    pub fn from_config(transport: T, config: &CourierConfig) -> CourierResult<Self> {
        Self::builder(transport)
            .limiter(Arc::new(RateLimiter::new(config.rate_limit().clone())?))
            .breaker(Arc::new(CircuitBreaker::new(
                config.circuit_breaker().clone(),
            )?))
            .retry_policy(*config.retry())
            .token(config.token().clone())
            .build()
    }

    /// The shared rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The shared circuit breaker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Dispatch counters.
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request`, routed under `routing_key` for per-key rate limiting.
    ///
    /// Returns exactly one terminal outcome:
    ///
    /// - the response
    /// - the remote or transport error, if it was not retryable
    /// - that error wrapped in `RetriesExhausted`, if every attempt failed
    /// - a `CircuitOpen` error, if the breaker rejected an attempt
    /// - a `Cancelled` error, if `cancel` fired while waiting, backing off or sending
    ///
    /// Category checks on the returned error see the root failure. Its text never
    /// contains the configured credential.
    #[instrument(skip(self, cancel, request))]
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        routing_key: &str,
        request: &T::Request,
    ) -> CourierResult<T::Response> {
        self.metrics.record_dispatch();

        let result = self
            .retrier
            .run(cancel, |attempt| {
                self.attempt(cancel, routing_key, request, attempt)
            })
            .await;
        let result = self.scrubber.scrub_result(result);

        match &result {
            Ok(_) => self.metrics.record_success(),
            Err(err) if err.is_cancelled() => {
                debug!("Dispatch cancelled");
                self.metrics.record_cancelled();
            }
            Err(err) if err.is_circuit_open() => {
                warn!(error = %err, "Dispatch rejected by circuit breaker");
                self.metrics.record_circuit_rejection();
            }
            Err(err) => {
                let classification = err.classify();
                warn!(
                    code = ?classification.code,
                    category = ?classification.category,
                    description = %classification.description,
                    "Dispatch failed"
                );
                self.metrics.record_failure();
            }
        }
        result
    }

    /// One attempt: admission, then the breaker-guarded send raced against `cancel`.
    async fn attempt(
        &self,
        cancel: &CancellationToken,
        routing_key: &str,
        request: &T::Request,
        attempt: u32,
    ) -> CourierResult<T::Response> {
        if attempt > 0 {
            self.metrics.record_retry();
        }

        self.limiter.wait(cancel, routing_key).await?;

        let guarded = self.breaker.execute_with(
            || self.transport.send(request),
            |err: &CourierError| err.is_retryable(),
        );
        // Dropping the breaker future on cancellation releases its slot.
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CancelledError::new().into()),
            result = guarded => result,
        };

        let result = self.scrubber.scrub_result(result);
        if let Err(err) = &result {
            let classification = err.classify();
            debug!(
                attempt,
                code = ?classification.code,
                retryable = classification.retryable,
                description = %classification.description,
                "Attempt failed"
            );
        }
        result
    }
}

/// Builder for [`Dispatcher`].
///
/// Anything not set falls back to: an unlimited limiter, a breaker with default
/// tuning, the default retry policy, real tokio sleeps, no credential and fresh
/// metrics.
pub struct DispatcherBuilder<T: Transport> {
    transport: T,
    limiter: Option<Arc<RateLimiter>>,
    breaker: Option<Arc<CircuitBreaker>>,
    policy: RetryPolicy,
    sleeper: Option<Arc<dyn Sleeper>>,
    token: SecretToken,
    metrics: Option<DispatchMetrics>,
}

impl<T: Transport> DispatcherBuilder<T> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            limiter: None,
            breaker: None,
            policy: RetryPolicy::default(),
            sleeper: None,
            token: SecretToken::empty(),
            metrics: None,
        }
    }

    /// Share a rate limiter.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Share a circuit breaker.
    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Set the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Inject the sleeper used between attempts.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Set the credential to scrub from errors.
    pub fn token(mut self, token: SecretToken) -> Self {
        self.token = token;
        self
    }

    /// Share a metrics collector.
    pub fn metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Finish the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the retry policy is invalid.
    pub fn build(self) -> CourierResult<Dispatcher<T>> {
        self.policy.validate()?;
        let breaker = match self.breaker {
            Some(breaker) => breaker,
            None => Arc::new(CircuitBreaker::new(BreakerConfig::default())?),
        };
        let sleeper = self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper));
        debug!(
            breaker = breaker.name(),
            max_retries = *self.policy.max_retries(),
            "Building dispatcher"
        );
        Ok(Dispatcher {
            transport: self.transport,
            limiter: self.limiter.unwrap_or_default(),
            breaker,
            retrier: Retrier::with_sleeper(self.policy, sleeper),
            scrubber: SecretScrubber::new(self.token),
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}
