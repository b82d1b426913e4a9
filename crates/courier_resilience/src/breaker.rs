//! Circuit breaker.
//!
//! The breaker moves between three states:
//!
//! - `Closed`: every call runs. Trips to `Open` on `threshold` consecutive failures,
//!   or when at least `min_requests` calls in the current interval failed at a rate
//!   of `failure_ratio` or more.
//! - `Open`: every call is rejected without running. After `open_timeout` the next
//!   call finds the breaker `HalfOpen`.
//! - `HalfOpen`: up to `max_half_open_requests` trial calls run. Any trial failure
//!   reopens the breaker; `max_half_open_requests` consecutive successes close it.
//!
//! Every state change and every interval rollover starts a new generation with zeroed
//! counts. An outcome reported for an older generation is dropped, so a slow call
//! that started before a trip cannot close or reopen the breaker afterwards.

use courier_error::{CircuitOpenError, ConfigError};
use derive_getters::Getters;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Breaker state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CircuitState {
    /// Calls run normally
    Closed,
    /// A limited number of trial calls run
    HalfOpen,
    /// Calls are rejected
    Open,
}

/// Outcome counts for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// Calls admitted
    pub requests: u32,
    /// Calls that succeeded
    pub total_successes: u32,
    /// Calls that failed
    pub total_failures: u32,
    /// Successes since the last failure
    pub consecutive_successes: u32,
    /// Failures since the last success
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// Share of admitted calls that failed.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.total_failures) / f64::from(self.requests)
        }
    }
}

/// Breaker tuning.
///
/// ```toml
/// [circuit_breaker]
/// name = "bot-api"
/// threshold = 5
/// failure_ratio = 0.6
/// min_requests = 10
/// open_timeout_ms = 30000
/// interval_ms = 60000
/// max_half_open_requests = 1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct BreakerConfig {
    /// Name used in errors and logs
    #[serde(default = "default_name")]
    #[setters(into)]
    name: String,

    /// Consecutive failures that trip the breaker
    #[serde(default = "default_threshold")]
    threshold: u32,

    /// Failure share that trips the breaker once `min_requests` is reached (0 disables)
    #[serde(default = "default_failure_ratio")]
    failure_ratio: f64,

    /// Calls needed in the interval before the ratio is considered (0 disables)
    #[serde(default = "default_min_requests")]
    min_requests: u32,

    /// Time spent open before trial calls are admitted (milliseconds)
    #[serde(default = "default_open_timeout_ms")]
    open_timeout_ms: u64,

    /// Closed-state counting window (milliseconds, 0 never rolls over)
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,

    /// Concurrent trial calls while half-open
    #[serde(default = "default_max_half_open_requests")]
    max_half_open_requests: u32,
}

fn default_name() -> String {
    "bot-api".to_string()
}

fn default_threshold() -> u32 {
    5
}

fn default_failure_ratio() -> f64 {
    0.6
}

fn default_min_requests() -> u32 {
    10
}

fn default_open_timeout_ms() -> u64 {
    30_000
}

fn default_interval_ms() -> u64 {
    60_000
}

fn default_max_half_open_requests() -> u32 {
    1
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            threshold: default_threshold(),
            failure_ratio: default_failure_ratio(),
            min_requests: default_min_requests(),
            open_timeout_ms: default_open_timeout_ms(),
            interval_ms: default_interval_ms(),
            max_half_open_requests: default_max_half_open_requests(),
        }
    }
}

impl BreakerConfig {
    /// Time spent open before trial calls are admitted.
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Closed-state counting window, if rolling is enabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold == 0 {
            return Err(ConfigError::new(format!(
                "circuit breaker '{}' threshold must be at least 1",
                self.name
            )));
        }
        if !(0.0..=1.0).contains(&self.failure_ratio) {
            return Err(ConfigError::new(format!(
                "circuit breaker '{}' failure_ratio must be within [0, 1], got {}",
                self.name, self.failure_ratio
            )));
        }
        if self.max_half_open_requests == 0 {
            return Err(ConfigError::new(format!(
                "circuit breaker '{}' max_half_open_requests must be at least 1",
                self.name
            )));
        }
        Ok(())
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        if counts.consecutive_failures >= self.threshold {
            return true;
        }
        self.min_requests > 0
            && self.failure_ratio > 0.0
            && counts.requests >= self.min_requests
            && counts.failure_ratio() >= self.failure_ratio
    }
}

/// Called with `(breaker name, from, to)` after each state change.
pub type StateChangeHook = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

type Transition = (CircuitState, CircuitState);

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

impl Inner {
    fn new_generation(&mut self, config: &BreakerConfig, now: Instant) {
        self.generation = self.generation.wrapping_add(1);
        self.counts = Counts::default();
        self.expiry = match self.state {
            CircuitState::Closed => config.interval().map(|interval| now + interval),
            CircuitState::Open => Some(now + config.open_timeout()),
            CircuitState::HalfOpen => None,
        };
    }

    fn set_state(
        &mut self,
        to: CircuitState,
        config: &BreakerConfig,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        self.new_generation(config, now);
        transitions.push((from, to));
    }

    /// Apply time-driven changes: interval rollover and open timeout.
    fn refresh(&mut self, config: &BreakerConfig, now: Instant, transitions: &mut Vec<Transition>) {
        let expired = self.expiry.is_some_and(|expiry| expiry <= now);
        match self.state {
            CircuitState::Closed if expired => self.new_generation(config, now),
            CircuitState::Open if expired => {
                self.set_state(CircuitState::HalfOpen, config, now, transitions)
            }
            _ => {}
        }
    }
}

/// Fault-isolation state machine around one remote operation type.
///
/// # Examples
///
/// ```
/// use courier_error::{CourierError, TransportError, TransportErrorKind};
/// use courier_resilience::{BreakerConfig, CircuitBreaker, CircuitState};
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let breaker = CircuitBreaker::new(BreakerConfig::default().with_threshold(1)).unwrap();
///
/// let result: Result<(), CourierError> = breaker
///     .execute(|| async {
///         Err(TransportError::new(TransportErrorKind::Connect, "connection refused").into())
///     })
///     .await;
/// assert!(result.is_err());
/// assert_eq!(breaker.state(), CircuitState::Open);
/// # });
/// ```
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
    on_state_change: Option<StateChangeHook>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("inner", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: BreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(name = %config.name, "Creating circuit breaker");
        let mut inner = Inner {
            state: CircuitState::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
        };
        inner.new_generation(&config, Instant::now());
        Ok(Self {
            config,
            inner: Mutex::new(inner),
            on_state_change: None,
        })
    }

    /// Register a callback for state changes.
    pub fn with_state_change_hook(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }

    /// Breaker name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Breaker configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state, applying any pending timeout first.
    pub fn state(&self) -> CircuitState {
        let mut transitions = Vec::new();
        let state = {
            let mut inner = self.inner.lock();
            inner.refresh(&self.config, Instant::now(), &mut transitions);
            inner.state
        };
        self.notify(&transitions);
        state
    }

    /// Counts for the current generation.
    pub fn counts(&self) -> Counts {
        let mut transitions = Vec::new();
        let counts = {
            let mut inner = self.inner.lock();
            inner.refresh(&self.config, Instant::now(), &mut transitions);
            inner.counts
        };
        self.notify(&transitions);
        counts
    }

    /// Run `op` if the breaker admits it; every error counts as a failure.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        E: From<CircuitOpenError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(op, |_| true).await
    }

    /// Run `op` if the breaker admits it.
    ///
    /// Errors for which `is_failure` returns false are recorded as successes: the
    /// remote side answered, it just said no. Rejections are returned as
    /// [`CircuitOpenError`] converted into `E`; the operation's own errors are
    /// returned unchanged. If the returned future is dropped before `op` completes,
    /// the call's slot is released and no outcome is recorded.
    pub async fn execute_with<T, E, F, Fut, P>(&self, op: F, is_failure: P) -> Result<T, E>
    where
        E: From<CircuitOpenError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let generation = self.before()?;
        let mut guard = AttemptGuard {
            breaker: self,
            generation,
            finished: false,
        };

        let result = op().await;
        let success = match &result {
            Ok(_) => true,
            Err(err) => !is_failure(err),
        };
        guard.finished = true;
        self.after(generation, success);
        result
    }

    fn before(&self) -> Result<u64, CircuitOpenError> {
        let now = Instant::now();
        let mut transitions = Vec::new();
        let admitted = {
            let mut inner = self.inner.lock();
            inner.refresh(&self.config, now, &mut transitions);
            match inner.state {
                CircuitState::Open => Err(CircuitOpenError::open(
                    self.config.name.clone(),
                    inner.expiry.map(|expiry| expiry.saturating_duration_since(now)),
                )),
                CircuitState::HalfOpen
                    if inner.counts.requests >= self.config.max_half_open_requests =>
                {
                    Err(CircuitOpenError::half_open(self.config.name.clone()))
                }
                _ => {
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
            }
        };
        self.notify(&transitions);
        if admitted.is_err() {
            debug!(name = %self.config.name, "Call rejected by open circuit");
        }
        admitted
    }

    fn after(&self, generation: u64, success: bool) {
        let now = Instant::now();
        let mut transitions = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner.refresh(&self.config, now, &mut transitions);
            if inner.generation != generation {
                debug!(name = %self.config.name, "Discarding outcome from stale generation");
            } else if success {
                inner.counts.on_success();
                if inner.state == CircuitState::HalfOpen
                    && inner.counts.consecutive_successes >= self.config.max_half_open_requests
                {
                    inner.set_state(CircuitState::Closed, &self.config, now, &mut transitions);
                }
            } else {
                inner.counts.on_failure();
                let trip = match inner.state {
                    CircuitState::Closed => self.config.ready_to_trip(&inner.counts),
                    CircuitState::HalfOpen => true,
                    CircuitState::Open => false,
                };
                if trip {
                    inner.set_state(CircuitState::Open, &self.config, now, &mut transitions);
                }
            }
        }
        self.notify(&transitions);
    }

    fn abandon(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.counts.requests = inner.counts.requests.saturating_sub(1);
            debug!(name = %self.config.name, "Attempt abandoned, slot released");
        }
    }

    fn notify(&self, transitions: &[Transition]) {
        for (from, to) in transitions {
            info!(name = %self.config.name, %from, %to, "Circuit breaker state change");
            if let Some(hook) = &self.on_state_change {
                hook(&self.config.name, *from, *to);
            }
        }
    }
}

/// Releases the attempt's slot if the call future is dropped mid-flight.
struct AttemptGuard<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    finished: bool,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.abandon(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig::default()
            .with_threshold(3)
            .with_min_requests(4)
            .with_failure_ratio(0.5)
    }

    #[test]
    fn test_consecutive_trip() {
        let config = config();
        let counts = Counts {
            requests: 3,
            total_failures: 3,
            consecutive_failures: 3,
            ..Counts::default()
        };
        assert!(config.ready_to_trip(&counts));
    }

    #[test]
    fn test_ratio_needs_min_requests() {
        let config = config();
        let few = Counts {
            requests: 3,
            total_failures: 2,
            consecutive_failures: 1,
            ..Counts::default()
        };
        assert!(!config.ready_to_trip(&few));
        let enough = Counts {
            requests: 4,
            total_failures: 2,
            consecutive_failures: 1,
            ..Counts::default()
        };
        assert!(config.ready_to_trip(&enough));
    }

    #[test]
    fn test_ratio_disabled_by_zero() {
        let config = config().with_failure_ratio(0.0);
        let counts = Counts {
            requests: 100,
            total_failures: 99,
            consecutive_failures: 1,
            ..Counts::default()
        };
        assert!(!config.ready_to_trip(&counts));
    }

    #[test]
    fn test_validation() {
        assert!(BreakerConfig::default().validate().is_ok());
        assert!(config().with_threshold(0).validate().is_err());
        assert!(config().with_failure_ratio(1.5).validate().is_err());
        assert!(config().with_max_half_open_requests(0).validate().is_err());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
    }
}
