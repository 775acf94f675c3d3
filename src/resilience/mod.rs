//! Resilience layer for the HTTP client.
//!
//! Every logical request flows Retry Controller -> Circuit Breaker -> Transport.
//! The retry loop wraps breaker-gated attempts, so a short-circuited attempt
//! consumes one retry just like a failed one.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    Fallback, PassthroughFallback, WindowCounts, DEFAULT_COMMAND_TIMEOUT,
    DEFAULT_ERROR_PERCENT_THRESHOLD, DEFAULT_ERROR_THRESHOLD, DEFAULT_ROLLING_WINDOW,
    DEFAULT_SLEEP_WINDOW,
};
pub use retry::{NoopPreRetryHook, PreRetryHook, RetryConfig, RetryExecutor, DEFAULT_BACKOFF_UNIT};

use std::future::Future;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::errors::{HttpClientError, HttpClientResult};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// How the destination key selecting a breaker is derived from a request URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BreakerKey {
    /// Scheme, host and port (`http://host:8080`).
    #[default]
    Host,
    /// The full request URL.
    Url,
}

impl BreakerKey {
    /// Returns the destination key for `url`.
    pub fn key_for(&self, url: &Url) -> String {
        match self {
            BreakerKey::Host => {
                let origin = url.origin();
                if origin.is_tuple() {
                    origin.ascii_serialization()
                } else {
                    url.to_string()
                }
            }
            BreakerKey::Url => url.to_string(),
        }
    }
}

/// Resolves `future` unless `cancel` fires first.
pub async fn with_cancellation<T, F>(cancel: &CancellationToken, future: F) -> HttpClientResult<T>
where
    F: Future<Output = HttpClientResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HttpClientError::Cancelled),
        result = future => result,
    }
}

/// Orchestrates retry and circuit breaking around a transport.
#[derive(Debug)]
pub struct ResilienceOrchestrator {
    retry: RetryExecutor,
    breakers: Option<CircuitBreakerRegistry>,
    breaker_key: BreakerKey,
}

impl ResilienceOrchestrator {
    /// Creates an orchestrator. Passing no registry disables circuit breaking.
    pub fn new(
        retry: RetryExecutor,
        breakers: Option<CircuitBreakerRegistry>,
        breaker_key: BreakerKey,
    ) -> Self {
        Self {
            retry,
            breakers,
            breaker_key,
        }
    }

    /// Sends `request` through `transport` with retries and circuit breaking applied.
    pub async fn execute(
        &self,
        transport: &dyn HttpTransport,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> HttpClientResult<HttpResponse> {
        let key = self.breaker_key.key_for(&request.url);
        let request = &request;
        let key = key.as_str();

        self.retry
            .execute(request, cancel, || self.attempt(transport, request, key, cancel))
            .await
    }

    async fn attempt(
        &self,
        transport: &dyn HttpTransport,
        request: &HttpRequest,
        key: &str,
        cancel: &CancellationToken,
    ) -> HttpClientResult<HttpResponse> {
        // A cancelled caller must not occupy a breaker slot or be counted.
        if cancel.is_cancelled() {
            return Err(HttpClientError::Cancelled);
        }

        let send = || {
            with_cancellation(cancel, async {
                transport
                    .send(request.clone())
                    .await
                    .map_err(HttpClientError::from)
            })
        };

        match &self.breakers {
            Some(registry) => registry.execute(key, send).await,
            None => send().await,
        }
    }

    /// Returns the breaker registry, if circuit breaking is enabled.
    pub fn breakers(&self) -> Option<&CircuitBreakerRegistry> {
        self.breakers.as_ref()
    }

    /// Returns the breaker key strategy.
    pub fn breaker_key(&self) -> BreakerKey {
        self.breaker_key
    }

    /// Returns the retry executor.
    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockOutcome, MockTransport};
    use http::Method;
    use std::time::Duration;

    fn request(url: &str) -> HttpRequest {
        HttpRequest::parse(Method::GET, url).unwrap()
    }

    fn orchestrator(retries: u32, breakers: Option<CircuitBreakerRegistry>) -> ResilienceOrchestrator {
        ResilienceOrchestrator::new(
            RetryExecutor::new(
                RetryConfig::new()
                    .max_retries(retries)
                    .backoff_unit(Duration::from_millis(10)),
            ),
            breakers,
            BreakerKey::Host,
        )
    }

    #[test]
    fn test_breaker_key_strategies() {
        let url = Url::parse("http://api.local:8080/users/7?x=1").unwrap();

        assert_eq!(BreakerKey::Host.key_for(&url), "http://api.local:8080");
        assert_eq!(
            BreakerKey::Url.key_for(&url),
            "http://api.local:8080/users/7?x=1"
        );
    }

    #[tokio::test]
    async fn test_orchestrator_success() {
        let transport = MockTransport::new();
        let orchestrator = orchestrator(0, None);

        let response = orchestrator
            .execute(&transport, request("http://host/ok"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_breaker_never_short_circuits() {
        let transport = MockTransport::failing();
        let orchestrator = orchestrator(0, None);

        for _ in 0..30 {
            let result = orchestrator
                .execute(&transport, request("http://host/x"), &CancellationToken::new())
                .await;
            assert!(matches!(result, Err(HttpClientError::Transport(_))));
        }

        assert_eq!(transport.request_count(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paths_on_same_host_share_breaker() {
        let transport = MockTransport::failing();
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::new().error_threshold(2));
        let orchestrator = orchestrator(0, Some(registry.clone()));
        let cancel = CancellationToken::new();

        let _ = orchestrator.execute(&transport, request("http://host/a"), &cancel).await;
        let _ = orchestrator.execute(&transport, request("http://host/b"), &cancel).await;
        let result = orchestrator.execute(&transport, request("http://host/c"), &cancel).await;

        assert!(matches!(result, Err(HttpClientError::CircuitOpen { .. })));
        assert_eq!(transport.request_count(), 2);
        assert_eq!(registry.keys(), vec!["http://host"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_transient_failure() {
        let transport = MockTransport::new();
        transport.queue(MockOutcome::connection_error("reset"));
        let orchestrator = orchestrator(
            2,
            Some(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
        );

        let response = orchestrator
            .execute(&transport, request("http://host/x"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_transport() {
        let transport = MockTransport::new();
        let orchestrator = orchestrator(3, None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator
            .execute(&transport, request("http://host/x"), &cancel)
            .await;

        assert!(matches!(result, Err(HttpClientError::Cancelled)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_caller_does_not_take_half_open_trial() {
        let transport = MockTransport::new();
        transport.queue(MockOutcome::connection_error("down"));
        let registry = CircuitBreakerRegistry::new(
            CircuitBreakerConfig::new()
                .error_threshold(1)
                .sleep_window(Duration::from_secs(1)),
        );
        let orchestrator = orchestrator(0, Some(registry.clone()));

        let _ = orchestrator
            .execute(&transport, request("http://host/x"), &CancellationToken::new())
            .await;
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(registry.state("http://host"), Some(CircuitState::HalfOpen));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = orchestrator
            .execute(&transport, request("http://host/x"), &cancel)
            .await;

        assert!(matches!(result, Err(HttpClientError::Cancelled)));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(registry.state("http://host"), Some(CircuitState::HalfOpen));

        let trial = orchestrator
            .execute(&transport, request("http://host/x"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(trial.status, 200);
        assert_eq!(registry.state("http://host"), Some(CircuitState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_callers_are_not_counted() {
        let transport = MockTransport::failing();
        let registry =
            CircuitBreakerRegistry::new(CircuitBreakerConfig::new().error_threshold(5));
        let orchestrator = orchestrator(0, Some(registry.clone()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        for _ in 0..4 {
            let _ = orchestrator
                .execute(&transport, request("http://host/x"), &cancel)
                .await;
        }
        let _ = orchestrator
            .execute(&transport, request("http://host/x"), &CancellationToken::new())
            .await;

        let snapshot = registry.snapshot("http://host").unwrap();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.counts.failures, 1);
        assert_eq!(snapshot.counts.cancellations, 0);
    }
}
