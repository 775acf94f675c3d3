//! Sends a few GET requests through a retrying, circuit-broken client.
//!
//! ```text
//! HTTPCLIENT_HOST=http://localhost:8080 cargo run --example resilient_get -- /health
//! ```

use resilient_httpclient::observability::{LogConfig, LogLevel};
use resilient_httpclient::{CircuitBreakerConfig, HttpClient, HttpClientError, RequestParams};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    LogConfig::new().with_level(LogLevel::Info).init()?;

    let host = std::env::var("HTTPCLIENT_HOST").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let path = std::env::args().nth(1).unwrap_or_else(|| "/".to_string());

    let client = HttpClient::builder()
        .host(host)
        .timeout(Duration::from_secs(2))
        .retry_count(2)
        .backoff_unit(Duration::from_millis(250))
        .circuit_breaker(
            CircuitBreakerConfig::new()
                .error_threshold(3)
                .sleep_window(Duration::from_secs(5))
                .fallback(|error: HttpClientError| {
                    tracing::warn!(kind = error.kind(), "Fallback invoked");
                    Err(error)
                }),
        )
        .build()?;

    for round in 1..=5 {
        match client.get(RequestParams::new(path.as_str())).await {
            Ok(response) => println!("round {}: {} ({} bytes)", round, response.status, response.body.len()),
            Err(error) => println!("round {}: error: {}", round, error),
        }
    }

    if let Some(registry) = client.breakers() {
        for key in registry.keys() {
            if let Some(snapshot) = registry.snapshot(&key) {
                println!("{}: {} {:?}", snapshot.key, snapshot.state, snapshot.counts);
            }
        }
    }

    println!("{:?}", client.metrics().get_metrics());
    Ok(())
}
