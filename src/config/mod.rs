//! Configuration for the HTTP client.
//!
//! A [`ClientConfig`] is resolved once by its builder: zero or unset values are
//! replaced with the defaults below and the host is normalized, so the client
//! never re-checks configuration on the request path.

use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::errors::{HookError, HttpClientError, HttpClientResult};
use crate::resilience::{
    BreakerKey, CircuitBreakerConfig, PreRetryHook, RetryConfig, DEFAULT_BACKOFF_UNIT,
};
use crate::transport::HttpRequest;

/// Default connection-level request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retries (a single attempt).
pub const DEFAULT_RETRY_COUNT: u32 = 0;

/// Environment variable holding the base host.
pub const ENV_HOST: &str = "HTTPCLIENT_HOST";
/// Environment variable holding the request timeout in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "HTTPCLIENT_TIMEOUT_MS";
/// Environment variable holding the retry count.
pub const ENV_RETRY_COUNT: &str = "HTTPCLIENT_RETRY_COUNT";
/// Environment variable enabling the circuit breaker (`true`/`false`/`1`/`0`).
pub const ENV_CIRCUIT_BREAKER: &str = "HTTPCLIENT_CIRCUIT_BREAKER";
/// Environment variable holding the breaker sleep window in milliseconds.
pub const ENV_CB_SLEEP_WINDOW_MS: &str = "HTTPCLIENT_CB_SLEEP_WINDOW_MS";
/// Environment variable holding the breaker volume threshold.
pub const ENV_CB_ERROR_THRESHOLD: &str = "HTTPCLIENT_CB_ERROR_THRESHOLD";
/// Environment variable holding the breaker command timeout in milliseconds.
pub const ENV_CB_TIMEOUT_MS: &str = "HTTPCLIENT_CB_TIMEOUT_MS";

/// Configuration for the HTTP client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base host, without a trailing `/`.
    pub host: String,
    /// Connection-level request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retry_count: u32,
    /// Linear backoff unit between retries.
    pub backoff_unit: Duration,
    /// Whether backoff delays get up to 10% jitter.
    pub retry_jitter: bool,
    /// Hook run before each retry.
    pub pre_retry_hook: Option<Arc<dyn PreRetryHook>>,
    /// Whether requests are gated by circuit breakers.
    pub circuit_breaker_enabled: bool,
    /// Breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
    /// How breaker keys are derived from request URLs.
    pub breaker_key: BreakerKey,
    /// Headers added to every built request unless the call sets them.
    pub default_headers: Vec<(String, String)>,
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `HTTPCLIENT_HOST` (required): base host
    /// - `HTTPCLIENT_TIMEOUT_MS`: request timeout in milliseconds
    /// - `HTTPCLIENT_RETRY_COUNT`: retries after the first attempt
    /// - `HTTPCLIENT_CIRCUIT_BREAKER`: enable circuit breaking
    /// - `HTTPCLIENT_CB_SLEEP_WINDOW_MS`: breaker sleep window
    /// - `HTTPCLIENT_CB_ERROR_THRESHOLD`: breaker volume threshold
    /// - `HTTPCLIENT_CB_TIMEOUT_MS`: breaker command timeout
    ///
    /// Unparseable values are configuration errors rather than silently ignored.
    pub fn from_env() -> HttpClientResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> HttpClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(ENV_HOST).ok_or_else(|| {
            HttpClientError::configuration(format!("{} environment variable not set", ENV_HOST))
        })?;

        let mut builder = ClientConfigBuilder::new().host(host);
        let mut breaker = CircuitBreakerConfig::new();

        if let Some(ms) = parse_var::<u64>(&lookup, ENV_TIMEOUT_MS)? {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = parse_var::<u32>(&lookup, ENV_RETRY_COUNT)? {
            builder = builder.retry_count(retries);
        }
        if let Some(enabled) = lookup(ENV_CIRCUIT_BREAKER) {
            builder = builder.circuit_breaker_enabled(parse_bool(ENV_CIRCUIT_BREAKER, &enabled)?);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_CB_SLEEP_WINDOW_MS)? {
            breaker = breaker.sleep_window(Duration::from_millis(ms));
        }
        if let Some(threshold) = parse_var::<u32>(&lookup, ENV_CB_ERROR_THRESHOLD)? {
            breaker = breaker.error_threshold(threshold);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_CB_TIMEOUT_MS)? {
            breaker = breaker.timeout(Duration::from_millis(ms));
        }

        builder.circuit_breaker(breaker).build()
    }

    /// Returns the retry settings derived from this configuration.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.retry_count)
            .backoff_unit(self.backoff_unit)
            .jitter(self.retry_jitter)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> HttpClientResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            HttpClientError::configuration(format!("Invalid value '{}' for {}: {}", raw, name, e))
        }),
        None => Ok(None),
    }
}

fn parse_bool(name: &str, raw: &str) -> HttpClientResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(HttpClientError::configuration(format!(
            "Invalid value '{}' for {}: expected a boolean",
            raw, name
        ))),
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .field("retry_count", &self.retry_count)
            .field("backoff_unit", &self.backoff_unit)
            .field("pre_retry_hook", &self.pre_retry_hook.is_some())
            .field("circuit_breaker_enabled", &self.circuit_breaker_enabled)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("breaker_key", &self.breaker_key)
            .finish()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    host: Option<String>,
    timeout: Option<Duration>,
    retry_count: Option<u32>,
    backoff_unit: Option<Duration>,
    retry_jitter: bool,
    pre_retry_hook: Option<Arc<dyn PreRetryHook>>,
    circuit_breaker_enabled: bool,
    circuit_breaker: Option<CircuitBreakerConfig>,
    breaker_key: BreakerKey,
    default_headers: Vec<(String, String)>,
}

impl ClientConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base host, e.g. `http://localhost:8080`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the number of retries after the first attempt.
    pub fn retry_count(mut self, retries: u32) -> Self {
        self.retry_count = Some(retries);
        self
    }

    /// Sets the linear backoff unit.
    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = Some(unit);
        self
    }

    /// Enables backoff jitter.
    pub fn retry_jitter(mut self, jitter: bool) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Sets the pre-retry hook from a closure.
    pub fn pre_retry_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.pre_retry_hook = Some(Arc::new(hook));
        self
    }

    /// Sets the pre-retry hook from a shared handler.
    pub fn pre_retry_handler(mut self, hook: Arc<dyn PreRetryHook>) -> Self {
        self.pre_retry_hook = Some(hook);
        self
    }

    /// Enables or disables circuit breaking.
    pub fn circuit_breaker_enabled(mut self, enabled: bool) -> Self {
        self.circuit_breaker_enabled = enabled;
        self
    }

    /// Sets the breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Sets the breaker key strategy.
    pub fn breaker_key(mut self, key: BreakerKey) -> Self {
        self.breaker_key = key;
        self
    }

    /// Adds a default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> HttpClientResult<ClientConfig> {
        let host = self
            .host
            .unwrap_or_default()
            .trim()
            .trim_end_matches('/')
            .to_string();

        if host.is_empty() {
            return Err(HttpClientError::configuration("missing host"));
        }

        let parsed = Url::parse(&host).map_err(|e| {
            HttpClientError::configuration(format!("Invalid host '{}': {}", host, e))
        })?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(HttpClientError::configuration(format!(
                "Invalid host '{}': expected an http or https base URL",
                host
            )));
        }

        Ok(ClientConfig {
            host,
            timeout: self
                .timeout
                .filter(|t| !t.is_zero())
                .unwrap_or(DEFAULT_TIMEOUT),
            retry_count: self.retry_count.unwrap_or(DEFAULT_RETRY_COUNT),
            backoff_unit: self
                .backoff_unit
                .filter(|u| !u.is_zero())
                .unwrap_or(DEFAULT_BACKOFF_UNIT),
            retry_jitter: self.retry_jitter,
            pre_retry_hook: self.pre_retry_hook,
            circuit_breaker_enabled: self.circuit_breaker_enabled,
            circuit_breaker: self.circuit_breaker.unwrap_or_default().with_defaults_applied(),
            breaker_key: self.breaker_key,
            default_headers: self.default_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_ERROR_THRESHOLD, DEFAULT_SLEEP_WINDOW};
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = ClientConfig::builder()
            .host("http://localhost:8080")
            .build()
            .unwrap();

        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.retry_count, 0);
        assert_eq!(config.backoff_unit, DEFAULT_BACKOFF_UNIT);
        assert!(!config.circuit_breaker_enabled);
        assert_eq!(config.circuit_breaker.sleep_window, DEFAULT_SLEEP_WINDOW);
        assert_eq!(config.circuit_breaker.error_threshold, DEFAULT_ERROR_THRESHOLD);
        assert_eq!(config.circuit_breaker.timeout, DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(config.breaker_key, BreakerKey::Host);
    }

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = ClientConfig::builder()
            .host("http://localhost:8080///")
            .build()
            .unwrap();

        assert_eq!(config.host, "http://localhost:8080");
    }

    #[test]
    fn test_zero_timeout_resolves_to_default() {
        let config = ClientConfig::builder()
            .host("http://localhost")
            .timeout(Duration::ZERO)
            .circuit_breaker(CircuitBreakerConfig::new().sleep_window(Duration::ZERO))
            .build()
            .unwrap();

        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.circuit_breaker.sleep_window, DEFAULT_SLEEP_WINDOW);
    }

    #[test]
    fn test_missing_host() {
        let err = ClientConfig::builder().build().unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: missing host");

        let err = ClientConfig::builder().host("/").build().unwrap_err();
        assert!(matches!(err, HttpClientError::Configuration { .. }));
    }

    #[test]
    fn test_invalid_host() {
        let result = ClientConfig::builder().host("not a host").build();
        assert!(matches!(result, Err(HttpClientError::Configuration { .. })));
    }

    #[test]
    fn test_host_without_http_scheme_is_rejected() {
        for host in ["localhost:8080", "mailto:ops@example.com", "ftp://files.local"] {
            let result = ClientConfig::builder().host(host).build();
            assert!(
                matches!(result, Err(HttpClientError::Configuration { .. })),
                "host {:?} should be rejected",
                host
            );
        }

        let config = ClientConfig::builder().host("https://localhost:8080").build().unwrap();
        assert_eq!(config.host, "https://localhost:8080");
    }

    #[test]
    fn test_from_lookup_reads_all_variables() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_HOST, "http://svc.internal/"),
            (ENV_TIMEOUT_MS, "2500"),
            (ENV_RETRY_COUNT, "3"),
            (ENV_CIRCUIT_BREAKER, "true"),
            (ENV_CB_SLEEP_WINDOW_MS, "750"),
            (ENV_CB_ERROR_THRESHOLD, "5"),
            (ENV_CB_TIMEOUT_MS, "1500"),
        ]))
        .unwrap();

        assert_eq!(config.host, "http://svc.internal");
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.retry_count, 3);
        assert!(config.circuit_breaker_enabled);
        assert_eq!(config.circuit_breaker.sleep_window, Duration::from_millis(750));
        assert_eq!(config.circuit_breaker.error_threshold, 5);
        assert_eq!(config.circuit_breaker.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_from_lookup_missing_host() {
        let result = ClientConfig::from_lookup(lookup(&[(ENV_RETRY_COUNT, "1")]));
        assert!(matches!(result, Err(HttpClientError::Configuration { .. })));
    }

    #[test]
    fn test_from_lookup_rejects_bad_numbers() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_HOST, "http://svc"),
            (ENV_RETRY_COUNT, "many"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains(ENV_RETRY_COUNT));
    }

    #[test]
    fn test_from_lookup_rejects_bad_bool() {
        let result = ClientConfig::from_lookup(lookup(&[
            (ENV_HOST, "http://svc"),
            (ENV_CIRCUIT_BREAKER, "maybe"),
        ]));
        assert!(matches!(result, Err(HttpClientError::Configuration { .. })));
    }

    #[test]
    fn test_retry_config_derivation() {
        let config = ClientConfig::builder()
            .host("http://svc")
            .retry_count(4)
            .backoff_unit(Duration::from_millis(20))
            .build()
            .unwrap();

        let retry = config.retry_config();
        assert_eq!(retry.max_retries, 4);
        assert_eq!(retry.backoff_unit, Duration::from_millis(20));
        assert!(!retry.jitter);
    }
}
