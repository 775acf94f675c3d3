//! Observability for the HTTP client.
//!
//! Structured logging goes through `tracing`; [`LogConfig`] installs a
//! subscriber for applications that do not bring their own. Request, retry and
//! breaker activity is counted by a pluggable [`MetricsCollector`].

mod logging;
mod metrics;

pub use logging::{log_request, log_response, LogConfig, LogFormat, LogLevel};
pub use metrics::{DefaultMetricsCollector, MetricsCollector, NoopMetricsCollector, RequestMetrics};
