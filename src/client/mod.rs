//! Resilient HTTP client.
//!
//! Provides the request facade that builds requests relative to a host and
//! hands them to the resilience layer.

use http::header::{HeaderValue, CONTENT_TYPE};
use http::Method;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use url::Url;

use crate::config::{ClientConfig, ClientConfigBuilder};
use crate::errors::{HookError, HttpClientError, HttpClientResult};
use crate::observability::{log_request, log_response, DefaultMetricsCollector, MetricsCollector};
use crate::resilience::{
    BreakerKey, CircuitBreakerConfig, CircuitBreakerRegistry, PreRetryHook, ResilienceOrchestrator,
    RetryExecutor,
};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::types::RequestParams;

/// Joins `host`, `path` and `path_variables` with exactly one `/` between parts.
///
/// ```
/// use resilient_httpclient::build_url;
///
/// assert_eq!(build_url("http://host/", "/path", &[]), "http://host/path");
/// assert_eq!(build_url("http://host", "path", &[]), "http://host/path");
/// assert_eq!(
///     build_url("http://host", "users", &["7".to_string()]),
///     "http://host/users/7"
/// );
/// ```
pub fn build_url(host: &str, path: &str, path_variables: &[String]) -> String {
    let mut url = host.trim_end_matches('/').to_string();

    let path = path.trim_start_matches('/');
    if !path.is_empty() {
        url.push('/');
        url.push_str(path);
    }

    for variable in path_variables {
        while url.ends_with('/') {
            url.pop();
        }
        url.push('/');
        url.push_str(variable.trim_start_matches('/'));
    }

    url
}

/// Resilient HTTP client.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
///
/// # Example
///
/// ```rust,no_run
/// use resilient_httpclient::{HttpClient, RequestParams};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HttpClient::builder()
///         .host("http://localhost:8080")
///         .timeout(Duration::from_secs(2))
///         .retry_count(3)
///         .circuit_breaker_enabled(true)
///         .build()?;
///
///     let response = client
///         .get(RequestParams::new("/users").path_variable(42))
///         .await?;
///     println!("{} {}", response.status, response.text());
///     Ok(())
/// }
/// ```
pub struct HttpClient {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    resilience: ResilienceOrchestrator,
    metrics: Arc<dyn MetricsCollector>,
}

impl HttpClient {
    /// Creates a new client builder.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Creates a client configured from `HTTPCLIENT_*` environment variables.
    pub fn from_env() -> HttpClientResult<Self> {
        HttpClientBuilder::from_config(ClientConfig::from_env()?).build()
    }

    /// Sends a GET request.
    pub async fn get<B: Serialize>(&self, params: RequestParams<B>) -> HttpClientResult<HttpResponse> {
        self.do_request(Method::GET, params).await
    }

    /// Sends a GET request that aborts when `cancel` fires.
    pub async fn get_with_cancellation<B: Serialize>(
        &self,
        params: RequestParams<B>,
        cancel: &CancellationToken,
    ) -> HttpClientResult<HttpResponse> {
        self.do_request_with_cancellation(Method::GET, params, cancel)
            .await
    }

    /// Sends a POST request.
    pub async fn post<B: Serialize>(&self, params: RequestParams<B>) -> HttpClientResult<HttpResponse> {
        self.do_request(Method::POST, params).await
    }

    /// Sends a POST request that aborts when `cancel` fires.
    pub async fn post_with_cancellation<B: Serialize>(
        &self,
        params: RequestParams<B>,
        cancel: &CancellationToken,
    ) -> HttpClientResult<HttpResponse> {
        self.do_request_with_cancellation(Method::POST, params, cancel)
            .await
    }

    /// Sends a PUT request.
    pub async fn put<B: Serialize>(&self, params: RequestParams<B>) -> HttpClientResult<HttpResponse> {
        self.do_request(Method::PUT, params).await
    }

    /// Sends a PUT request that aborts when `cancel` fires.
    pub async fn put_with_cancellation<B: Serialize>(
        &self,
        params: RequestParams<B>,
        cancel: &CancellationToken,
    ) -> HttpClientResult<HttpResponse> {
        self.do_request_with_cancellation(Method::PUT, params, cancel)
            .await
    }

    /// Sends a DELETE request.
    pub async fn delete<B: Serialize>(&self, params: RequestParams<B>) -> HttpClientResult<HttpResponse> {
        self.do_request(Method::DELETE, params).await
    }

    /// Sends a DELETE request that aborts when `cancel` fires.
    pub async fn delete_with_cancellation<B: Serialize>(
        &self,
        params: RequestParams<B>,
        cancel: &CancellationToken,
    ) -> HttpClientResult<HttpResponse> {
        self.do_request_with_cancellation(Method::DELETE, params, cancel)
            .await
    }

    /// Sends a request with any method.
    ///
    /// `method` may be an [`http::Method`] or a string such as `"PATCH"`; an
    /// invalid method fails with [`HttpClientError::RequestConstruction`]
    /// before anything is sent.
    pub async fn do_request<M, B>(&self, method: M, params: RequestParams<B>) -> HttpClientResult<HttpResponse>
    where
        M: TryInto<Method>,
        M::Error: fmt::Display,
        B: Serialize,
    {
        self.do_request_with_cancellation(method, params, &CancellationToken::new())
            .await
    }

    /// Sends a request with any method, aborting when `cancel` fires.
    pub async fn do_request_with_cancellation<M, B>(
        &self,
        method: M,
        params: RequestParams<B>,
        cancel: &CancellationToken,
    ) -> HttpClientResult<HttpResponse>
    where
        M: TryInto<Method>,
        M::Error: fmt::Display,
        B: Serialize,
    {
        let request = method
            .try_into()
            .map_err(|e| HttpClientError::request_construction(format!("Invalid method: {}", e)))
            .and_then(|method| self.build_request(method, &params));

        let request = match request {
            Ok(request) => request,
            Err(error) => {
                self.metrics.record_error(error.kind());
                return Err(error);
            }
        };

        self.dispatch(request, cancel).await
    }

    /// Sends a caller-built request through the retry and breaker layers.
    pub async fn do_vanilla(&self, request: HttpRequest) -> HttpClientResult<HttpResponse> {
        self.dispatch(request, &CancellationToken::new()).await
    }

    /// Sends a caller-built request, aborting when `cancel` fires.
    pub async fn do_vanilla_with_cancellation(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> HttpClientResult<HttpResponse> {
        self.dispatch(request, cancel).await
    }

    /// Builds the transport request for `params` without sending it.
    pub fn build_request<B: Serialize>(
        &self,
        method: Method,
        params: &RequestParams<B>,
    ) -> HttpClientResult<HttpRequest> {
        let mut url = Url::parse(&build_url(&self.config.host, &params.path, &params.path_variables))?;
        if !params.query.is_empty() {
            url.query_pairs_mut().extend_pairs(params.query.iter());
        }

        let mut request = HttpRequest::new(method, url);
        for (name, value) in self.config.default_headers.iter().chain(params.headers.iter()) {
            request = request.with_header(name, value)?;
        }

        if let Some(body) = &params.body {
            let bytes = serde_json::to_vec(body)?;
            if !request.headers.contains_key(CONTENT_TYPE) {
                request
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            request = request.with_body(bytes);
        }

        Ok(request)
    }

    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    async fn dispatch(&self, request: HttpRequest, cancel: &CancellationToken) -> HttpClientResult<HttpResponse> {
        let operation = request.method.to_string();
        log_request(
            request.method.as_str(),
            request.url.as_str(),
            request.body.as_ref().map_or(0, |b| b.len()),
        );

        let start = Instant::now();
        let result = self
            .resilience
            .execute(self.transport.as_ref(), request, cancel)
            .await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => {
                log_response(response.status, elapsed.as_millis() as u64, &response.body);
                self.metrics.record_request(&operation, true, elapsed);
            }
            Err(error) => {
                tracing::debug!(error = %error, kind = error.kind(), "Request failed");
                self.metrics.record_request(&operation, false, elapsed);
                self.metrics.record_error(error.kind());
            }
        }

        result
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the breaker registry, if circuit breaking is enabled.
    pub fn breakers(&self) -> Option<&CircuitBreakerRegistry> {
        self.resilience.breakers()
    }

    /// Returns the metrics collector.
    pub fn metrics(&self) -> &Arc<dyn MetricsCollector> {
        &self.metrics
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("resilience", &self.resilience)
            .finish_non_exhaustive()
    }
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    config_builder: ClientConfigBuilder,
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    breakers: Option<CircuitBreakerRegistry>,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl HttpClientBuilder {
    /// Creates a new client builder.
    pub fn new() -> Self {
        Self {
            config_builder: ClientConfigBuilder::new(),
            config: None,
            transport: None,
            breakers: None,
            metrics: None,
        }
    }

    /// Creates a builder from a resolved configuration; config setters are ignored.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config: Some(config),
            ..Self::new()
        }
    }

    /// Sets the base host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.host(host);
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Sets the number of retries after the first attempt.
    pub fn retry_count(mut self, retries: u32) -> Self {
        self.config_builder = self.config_builder.retry_count(retries);
        self
    }

    /// Sets the linear backoff unit.
    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.config_builder = self.config_builder.backoff_unit(unit);
        self
    }

    /// Enables backoff jitter.
    pub fn retry_jitter(mut self, jitter: bool) -> Self {
        self.config_builder = self.config_builder.retry_jitter(jitter);
        self
    }

    /// Sets the pre-retry hook; returning an error stops retrying.
    pub fn pre_retry_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.config_builder = self.config_builder.pre_retry_hook(hook);
        self
    }

    /// Sets the pre-retry hook from a shared handler.
    pub fn pre_retry_handler(mut self, hook: Arc<dyn PreRetryHook>) -> Self {
        self.config_builder = self.config_builder.pre_retry_handler(hook);
        self
    }

    /// Enables or disables circuit breaking.
    pub fn circuit_breaker_enabled(mut self, enabled: bool) -> Self {
        self.config_builder = self.config_builder.circuit_breaker_enabled(enabled);
        self
    }

    /// Enables circuit breaking with `config`.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config_builder = self
            .config_builder
            .circuit_breaker(config)
            .circuit_breaker_enabled(true);
        self
    }

    /// Sets the breaker key strategy.
    pub fn breaker_key(mut self, key: BreakerKey) -> Self {
        self.config_builder = self.config_builder.breaker_key(key);
        self
    }

    /// Adds a default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.header(name, value);
        self
    }

    /// Sets a custom transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shares an existing breaker registry; enables circuit breaking and the
    /// registry's own breaker configuration applies.
    pub fn breaker_registry(mut self, registry: CircuitBreakerRegistry) -> Self {
        self.breakers = Some(registry);
        self
    }

    /// Sets a custom metrics collector.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the client.
    pub fn build(self) -> HttpClientResult<HttpClient> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_builder.build()?,
        };

        let metrics: Arc<dyn MetricsCollector> = self
            .metrics
            .unwrap_or_else(|| Arc::new(DefaultMetricsCollector::new()));

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.timeout).map_err(|e| {
                HttpClientError::configuration(format!("Failed to create transport: {}", e))
            })?),
        };

        let breakers = match self.breakers {
            Some(registry) => Some(registry),
            None if config.circuit_breaker_enabled => Some(CircuitBreakerRegistry::with_metrics(
                config.circuit_breaker.clone(),
                Arc::clone(&metrics),
            )),
            None => None,
        };

        let mut retry = RetryExecutor::new(config.retry_config()).with_metrics(Arc::clone(&metrics));
        if let Some(hook) = &config.pre_retry_hook {
            retry = retry.with_hook(Arc::clone(hook));
        }

        let resilience = ResilienceOrchestrator::new(retry, breakers, config.breaker_key);

        tracing::debug!(
            host = %config.host,
            retry_count = config.retry_count,
            circuit_breaker = resilience.breakers().is_some(),
            "Built HTTP client"
        );

        Ok(HttpClient {
            config,
            transport,
            resilience,
            metrics,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
