//! Retry loop with linear backoff and a pre-retry hook.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::errors::{HookError, HttpClientError, HttpClientResult};
use crate::observability::{MetricsCollector, NoopMetricsCollector};
use crate::transport::{HttpRequest, HttpResponse};

/// Default backoff unit; retry `i` waits `(i + 1) * unit`.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Hook called before every retry.
///
/// Returning an error aborts the retry loop and surfaces that error to the caller.
pub trait PreRetryHook: Send + Sync {
    /// Called with the request about to be retried.
    fn before_retry(&self, request: &HttpRequest) -> Result<(), HookError>;
}

impl<F> PreRetryHook for F
where
    F: Fn(&HttpRequest) -> Result<(), HookError> + Send + Sync,
{
    fn before_retry(&self, request: &HttpRequest) -> Result<(), HookError> {
        self(request)
    }
}

/// Hook that always allows the retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreRetryHook;

impl PreRetryHook for NoopPreRetryHook {
    fn before_retry(&self, _request: &HttpRequest) -> Result<(), HookError> {
        Ok(())
    }
}

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Linear backoff unit.
    pub backoff_unit: Duration,
    /// Whether to add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the backoff unit.
    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Sets whether to use jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Runs an attempt function under the retry policy.
pub struct RetryExecutor {
    config: RetryConfig,
    hook: Arc<dyn PreRetryHook>,
    metrics: Arc<dyn MetricsCollector>,
}

impl RetryExecutor {
    /// Creates an executor with no pre-retry hook.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            hook: Arc::new(NoopPreRetryHook),
            metrics: Arc::new(NoopMetricsCollector),
        }
    }

    /// Sets the pre-retry hook.
    pub fn with_hook(mut self, hook: Arc<dyn PreRetryHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Sets the metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let delay = self.config.backoff_unit.saturating_mul(retry.saturating_add(1));
        if self.config.jitter {
            let factor = 1.0 + rand::random::<f64>() * 0.1;
            delay.mul_f64(factor)
        } else {
            delay
        }
    }

    /// Runs `attempt` once, then retries retryable failures.
    ///
    /// Cancellation during a backoff sleep returns [`HttpClientError::Cancelled`]
    /// without starting another attempt.
    #[instrument(skip_all, fields(method = %request.method, url = %request.url, max_retries = self.config.max_retries))]
    pub async fn execute<F, Fut>(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> HttpClientResult<HttpResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HttpClientResult<HttpResponse>>,
    {
        let mut last_error = match attempt().await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        for retry in 0..self.config.max_retries {
            if !last_error.is_retryable() {
                return Err(last_error);
            }

            if let Err(source) = self.hook.before_retry(request) {
                tracing::warn!(error = %source, "Pre-retry hook aborted retries");
                return Err(HttpClientError::PreRetryAbort { source });
            }

            let delay = self.backoff_delay(retry);
            tracing::info!(
                attempt = retry + 2,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Retrying after error"
            );
            self.metrics.record_retry(retry + 1);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HttpClientError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            match attempt().await {
                Ok(response) => return Ok(response),
                Err(err) => last_error = err,
            }
        }

        Err(last_error)
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
