//! Per-destination circuit breaker.
//!
//! # States
//! - Closed: normal operation, calls pass through and outcomes are counted
//! - Open: destination assumed down, calls fail fast without touching the transport
//! - Half-Open: one trial call is let through to probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed   -> Open:     requests >= error_threshold and error % > error_percent_threshold
//! Open     -> HalfOpen: sleep_window elapsed since opening
//! HalfOpen -> Closed:   trial call succeeds (rolling window is reset)
//! HalfOpen -> Open:     trial call fails, times out or is abandoned
//! ```
//!
//! Breaker state lives behind a synchronous mutex that is never held across an
//! `.await` or while user code (fallbacks, metrics) runs.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::{HttpClientError, HttpClientResult};
use crate::observability::{MetricsCollector, NoopMetricsCollector};
use crate::transport::HttpResponse;

/// Default time an open breaker waits before allowing a trial call.
pub const DEFAULT_SLEEP_WINDOW: Duration = Duration::from_millis(5_000);

/// Default minimum number of requests in the rolling window before the breaker may trip.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 20;

/// Default command timeout applied to each gated call.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default rolling statistics window.
pub const DEFAULT_ROLLING_WINDOW: Duration = Duration::from_secs(10);

/// Default error percentage that must be exceeded to trip (any failure).
pub const DEFAULT_ERROR_PERCENT_THRESHOLD: u8 = 0;

const ROLLING_WINDOW_BUCKETS: u32 = 10;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is testing, one request allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Function invoked with the triggering error when a call is short-circuited or fails.
///
/// Returning `Err` surfaces that error to the caller; returning `Ok` substitutes
/// a fallback response.
pub trait Fallback: Send + Sync {
    /// Handles a short-circuited or failed call.
    fn fallback(&self, error: HttpClientError) -> HttpClientResult<HttpResponse>;
}

impl<F> Fallback for F
where
    F: Fn(HttpClientError) -> HttpClientResult<HttpResponse> + Send + Sync,
{
    fn fallback(&self, error: HttpClientError) -> HttpClientResult<HttpResponse> {
        self(error)
    }
}

/// Fallback that surfaces the triggering error unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFallback;

impl Fallback for PassthroughFallback {
    fn fallback(&self, error: HttpClientError) -> HttpClientResult<HttpResponse> {
        Err(error)
    }
}

/// Circuit breaker configuration.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Time to wait after opening before a trial call is allowed.
    pub sleep_window: Duration,
    /// Minimum number of requests in the rolling window before trip logic activates.
    pub error_threshold: u32,
    /// Command timeout for each gated call.
    pub timeout: Duration,
    /// Error percentage that must be exceeded to trip once the volume threshold is met.
    pub error_percent_threshold: u8,
    /// Length of the rolling statistics window.
    pub rolling_window: Duration,
    /// Fallback invoked on short-circuit or failure.
    pub fallback: Arc<dyn Fallback>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sleep_window: DEFAULT_SLEEP_WINDOW,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            error_percent_threshold: DEFAULT_ERROR_PERCENT_THRESHOLD,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            fallback: Arc::new(PassthroughFallback),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sleep window.
    pub fn sleep_window(mut self, window: Duration) -> Self {
        self.sleep_window = window;
        self
    }

    /// Sets the request volume threshold.
    pub fn error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold;
        self
    }

    /// Sets the command timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the error percentage threshold.
    pub fn error_percent_threshold(mut self, percent: u8) -> Self {
        self.error_percent_threshold = percent;
        self
    }

    /// Sets the rolling window length.
    pub fn rolling_window(mut self, window: Duration) -> Self {
        self.rolling_window = window;
        self
    }

    /// Sets the fallback from a closure.
    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(HttpClientError) -> HttpClientResult<HttpResponse> + Send + Sync + 'static,
    {
        self.fallback = Arc::new(fallback);
        self
    }

    /// Sets the fallback from a shared handler.
    pub fn fallback_handler(mut self, fallback: Arc<dyn Fallback>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Replaces zero-valued fields with their defaults.
    pub fn with_defaults_applied(mut self) -> Self {
        if self.sleep_window.is_zero() {
            self.sleep_window = DEFAULT_SLEEP_WINDOW;
        }
        if self.error_threshold == 0 {
            self.error_threshold = DEFAULT_ERROR_THRESHOLD;
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_COMMAND_TIMEOUT;
        }
        if self.rolling_window.is_zero() {
            self.rolling_window = DEFAULT_ROLLING_WINDOW;
        }
        self
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("sleep_window", &self.sleep_window)
            .field("error_threshold", &self.error_threshold)
            .field("timeout", &self.timeout)
            .field("error_percent_threshold", &self.error_percent_threshold)
            .field("rolling_window", &self.rolling_window)
            .finish_non_exhaustive()
    }
}

/// Outcome counts over the rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    /// Calls that returned a response.
    pub successes: u32,
    /// Calls that failed or timed out.
    pub failures: u32,
    /// Calls abandoned by the caller before completing.
    pub cancellations: u32,
    /// Calls rejected without reaching the transport.
    pub rejections: u32,
}

impl WindowCounts {
    /// Requests that completed with a response or a failure.
    ///
    /// Cancelled and rejected calls are tracked but never add to trip volume.
    pub fn requests(&self) -> u32 {
        self.successes + self.failures
    }

    /// Failure percentage of completed requests.
    pub fn error_percentage(&self) -> u32 {
        let requests = u64::from(self.requests());
        if requests == 0 {
            return 0;
        }
        (u64::from(self.failures) * 100 / requests) as u32
    }

    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.successes += 1,
            Outcome::Failure => self.failures += 1,
            Outcome::Cancelled => self.cancellations += 1,
            Outcome::Rejected => self.rejections += 1,
        }
    }

    fn merge(mut self, other: &WindowCounts) -> Self {
        self.successes += other.successes;
        self.failures += other.failures;
        self.cancellations += other.cancellations;
        self.rejections += other.rejections;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Cancelled,
    Rejected,
}

#[derive(Debug)]
struct Bucket {
    started: Instant,
    counts: WindowCounts,
}

/// Bucketed counters covering the last `window` of time.
#[derive(Debug)]
struct RollingWindow {
    buckets: VecDeque<Bucket>,
    window: Duration,
    bucket_width: Duration,
}

impl RollingWindow {
    fn new(window: Duration) -> Self {
        let bucket_width = (window / ROLLING_WINDOW_BUCKETS).max(Duration::from_millis(1));
        Self {
            buckets: VecDeque::with_capacity(ROLLING_WINDOW_BUCKETS as usize + 1),
            window,
            bucket_width,
        }
    }

    fn record(&mut self, now: Instant, outcome: Outcome) {
        self.prune(now);

        let needs_bucket = match self.buckets.back() {
            Some(bucket) => now.duration_since(bucket.started) >= self.bucket_width,
            None => true,
        };
        if needs_bucket {
            self.buckets.push_back(Bucket {
                started: now,
                counts: WindowCounts::default(),
            });
        }

        if let Some(bucket) = self.buckets.back_mut() {
            bucket.counts.add(outcome);
        }
    }

    fn counts(&mut self, now: Instant) -> WindowCounts {
        self.prune(now);
        self.buckets
            .iter()
            .fold(WindowCounts::default(), |acc, bucket| acc.merge(&bucket.counts))
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.duration_since(front.started) >= self.window {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn reset(&mut self) {
        self.buckets.clear();
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    window: RollingWindow,
}

type Transition = Option<(CircuitState, CircuitState)>;

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Destination key.
    pub key: String,
    /// Current state.
    pub state: CircuitState,
    /// Counts over the rolling window.
    pub counts: WindowCounts,
}

/// Circuit breaker for a single destination.
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    metrics: Arc<dyn MetricsCollector>,
}

impl CircuitBreaker {
    /// Creates a breaker for `key`.
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_metrics(key, config, Arc::new(NoopMetricsCollector))
    }

    /// Creates a breaker that reports rejections and transitions to `metrics`.
    pub fn with_metrics(
        key: impl Into<String>,
        config: CircuitBreakerConfig,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        let config = config.with_defaults_applied();
        Self {
            key: key.into(),
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                opened_at: None,
                trial_in_flight: false,
                window: RollingWindow::new(config.rolling_window),
            }),
            config,
            metrics,
        }
    }

    /// Returns the destination key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the resolved configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the current state, moving an expired open breaker to half-open.
    pub fn state(&self) -> CircuitState {
        let (state, change) = {
            let mut inner = self.inner.lock();
            let change = self.maybe_half_open(&mut inner, Instant::now());
            (inner.state, change)
        };
        self.notify(change);
        state
    }

    /// Returns the current state and rolling-window counts.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let (state, counts, change) = {
            let mut inner = self.inner.lock();
            let change = self.maybe_half_open(&mut inner, now);
            (inner.state, inner.window.counts(now), change)
        };
        self.notify(change);
        BreakerSnapshot {
            key: self.key.clone(),
            state,
            counts,
        }
    }

    /// Runs `operation` through the breaker.
    ///
    /// The operation is bounded by the command timeout. Its outcome is recorded
    /// exactly once; errors and short-circuits are then handed to the fallback.
    /// Cancellation is recorded but bypasses the fallback.
    pub async fn execute<F, Fut>(&self, operation: F) -> HttpClientResult<HttpResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HttpClientResult<HttpResponse>>,
    {
        let permit = match self.acquire() {
            Ok(permit) => permit,
            Err(error) => return self.run_fallback(error),
        };

        let result = match tokio::time::timeout(self.config.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(HttpClientError::Timeout {
                timeout: self.config.timeout,
            }),
        };

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) if e.counts_as_failure() => Outcome::Failure,
            Err(_) => Outcome::Cancelled,
        };
        permit.complete(outcome);

        match result {
            Ok(response) => Ok(response),
            Err(HttpClientError::Cancelled) => Err(HttpClientError::Cancelled),
            Err(error) => self.run_fallback(error),
        }
    }

    fn acquire(&self) -> Result<Permit<'_>, HttpClientError> {
        let now = Instant::now();
        let (decision, change) = {
            let mut inner = self.inner.lock();
            let change = self.maybe_half_open(&mut inner, now);
            let decision = match inner.state {
                CircuitState::Closed => Some(false),
                CircuitState::HalfOpen if !inner.trial_in_flight => {
                    inner.trial_in_flight = true;
                    Some(true)
                }
                CircuitState::HalfOpen | CircuitState::Open => {
                    inner.window.record(now, Outcome::Rejected);
                    None
                }
            };
            (decision, change)
        };
        self.notify(change);

        match decision {
            Some(trial) => {
                if trial {
                    tracing::debug!(key = %self.key, "Circuit breaker admitting trial request");
                }
                Ok(Permit {
                    breaker: self,
                    trial,
                    completed: false,
                })
            }
            None => {
                tracing::debug!(key = %self.key, "Circuit breaker rejected request");
                self.metrics.record_circuit_rejection(&self.key);
                Err(HttpClientError::CircuitOpen {
                    key: self.key.clone(),
                })
            }
        }
    }

    fn complete(&self, trial: bool, outcome: Outcome) {
        let now = Instant::now();
        let change = {
            let mut inner = self.inner.lock();
            inner.window.record(now, outcome);

            let state = inner.state;
            match state {
                CircuitState::Closed if outcome == Outcome::Failure => {
                    let counts = inner.window.counts(now);
                    if self.should_trip(&counts) {
                        self.transition(&mut inner, CircuitState::Open, now)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen if trial => {
                    if outcome == Outcome::Success {
                        self.transition(&mut inner, CircuitState::Closed, now)
                    } else {
                        self.transition(&mut inner, CircuitState::Open, now)
                    }
                }
                _ => None,
            }
        };
        self.notify(change);
    }

    fn should_trip(&self, counts: &WindowCounts) -> bool {
        counts.requests() >= self.config.error_threshold
            && counts.error_percentage() > u32::from(self.config.error_percent_threshold)
    }

    fn maybe_half_open(&self, inner: &mut BreakerState, now: Instant) -> Transition {
        if inner.state != CircuitState::Open {
            return None;
        }
        let opened_at = inner.opened_at?;
        if now.duration_since(opened_at) >= self.config.sleep_window {
            self.transition(inner, CircuitState::HalfOpen, now)
        } else {
            None
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState, now: Instant) -> Transition {
        let from = inner.state;
        inner.state = to;
        inner.trial_in_flight = false;

        match to {
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.window.reset();
            }
            CircuitState::Open => {
                inner.opened_at = Some(now);
            }
            CircuitState::HalfOpen => {}
        }

        Some((from, to))
    }

    fn notify(&self, change: Transition) {
        let Some((from, to)) = change else {
            return;
        };

        match to {
            CircuitState::Open => tracing::warn!(
                key = %self.key,
                from = %from,
                sleep_window_ms = self.config.sleep_window.as_millis() as u64,
                "Circuit breaker opening"
            ),
            _ => tracing::info!(key = %self.key, from = %from, to = %to, "Circuit breaker state change"),
        }

        self.metrics.record_state_change(&self.key, from, to);
    }

    fn run_fallback(&self, error: HttpClientError) -> HttpClientResult<HttpResponse> {
        let fallback = Arc::clone(&self.config.fallback);
        match catch_unwind(AssertUnwindSafe(move || fallback.fallback(error))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(key = %self.key, message = %message, "Fallback panicked");
                Err(HttpClientError::Fallback { message })
            }
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("key", &self.key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "fallback panicked".to_string()
    }
}

/// Admission for one call. Records `Cancelled` if dropped before completion.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    completed: bool,
}

impl Permit<'_> {
    fn complete(mut self, outcome: Outcome) {
        self.completed = true;
        self.breaker.complete(self.trial, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.breaker.complete(self.trial, Outcome::Cancelled);
        }
    }
}

/// Table of circuit breakers keyed by destination.
///
/// Cloning is cheap and clones share the same breakers, so one registry can be
/// handed to several clients.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    config: CircuitBreakerConfig,
    metrics: Arc<dyn MetricsCollector>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry; every breaker it creates uses `config`.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_metrics(config, Arc::new(NoopMetricsCollector))
    }

    /// Creates an empty registry whose breakers report to `metrics`.
    pub fn with_metrics(config: CircuitBreakerConfig, metrics: Arc<dyn MetricsCollector>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config: config.with_defaults_applied(),
                metrics,
                breakers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the breaker for `key`, creating it on first use.
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.inner.breakers.lock();
        if let Some(breaker) = breakers.get(key) {
            return Arc::clone(breaker);
        }

        let breaker = Arc::new(CircuitBreaker::with_metrics(
            key,
            self.inner.config.clone(),
            Arc::clone(&self.inner.metrics),
        ));
        breakers.insert(key.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Runs `operation` through the breaker for `key`.
    pub async fn execute<F, Fut>(&self, key: &str, operation: F) -> HttpClientResult<HttpResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HttpClientResult<HttpResponse>>,
    {
        let breaker = self.breaker(key);
        breaker.execute(operation).await
    }

    /// Returns the state of the breaker for `key`, if one exists.
    pub fn state(&self, key: &str) -> Option<CircuitState> {
        self.existing(key).map(|breaker| breaker.state())
    }

    /// Returns a snapshot of the breaker for `key`, if one exists.
    pub fn snapshot(&self, key: &str) -> Option<BreakerSnapshot> {
        self.existing(key).map(|breaker| breaker.snapshot())
    }

    /// Returns all known destination keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.breakers.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the configuration applied to new breakers.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.inner.config
    }

    fn existing(&self, key: &str) -> Option<Arc<CircuitBreaker>> {
        self.inner.breakers.lock().get(key).cloned()
    }
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("config", &self.inner.config)
            .field("keys", &self.keys())
            .finish()
    }
}
