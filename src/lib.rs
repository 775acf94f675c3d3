//! # resilient-httpclient
//!
//! An outbound HTTP client that wraps a base transport with timeouts, a bounded
//! retry loop with linear backoff and a pre-retry hook, and optional
//! per-destination circuit breaking.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_httpclient::{CircuitBreakerConfig, HttpClient, RequestParams};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::builder()
//!         .host("http://localhost:8080")
//!         .timeout(Duration::from_millis(500))
//!         .retry_count(3)
//!         .circuit_breaker(
//!             CircuitBreakerConfig::new()
//!                 .error_threshold(5)
//!                 .sleep_window(Duration::from_secs(2)),
//!         )
//!         .build()?;
//!
//!     let response = client
//!         .post(RequestParams::new("/orders").body(serde_json::json!({"sku": "A-1"})))
//!         .await?;
//!
//!     println!("status: {}", response.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! HttpClient -> RetryExecutor -> CircuitBreaker (per destination) -> HttpTransport
//! ```
//!
//! Any HTTP status is returned as a response. Only network failures, command
//! timeouts and short-circuits are errors, and only those are retried.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod errors;
pub mod mocks;
pub mod observability;
pub mod resilience;
pub mod transport;
pub mod types;

pub use client::{build_url, HttpClient, HttpClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use errors::{HookError, HttpClientError, HttpClientResult};
pub use resilience::{
    BreakerKey, BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    Fallback, PreRetryHook,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use types::RequestParams;

/// Re-exported so callers can build methods and headers without a direct `http` dependency.
pub use http::{HeaderMap, Method};
