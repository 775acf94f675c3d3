//! Circuit breaker overhead benchmarks.
//!
//! Run with: `cargo bench --bench circuit_breaker_bench`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use resilient_httpclient::{
    CircuitBreakerConfig, CircuitBreakerRegistry, HttpClient, HttpClientError, HttpRequest,
    HttpResponse, HttpTransport, RequestParams, TransportError,
};
use tokio::runtime::Runtime;

/// Transport that answers immediately without recording anything.
struct InstantTransport;

#[async_trait]
impl HttpTransport for InstantTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(200, ""))
    }
}

fn bench_breaker_execute(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("breaker_execute");
    group.throughput(Throughput::Elements(1));

    group.bench_function("closed", |b| {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
        b.to_async(&runtime).iter(|| async {
            let result = registry
                .execute("http://bench.local", || async { Ok(HttpResponse::new(200, "")) })
                .await;
            black_box(result)
        });
    });

    group.bench_function("open", |b| {
        let registry = CircuitBreakerRegistry::new(
            CircuitBreakerConfig::new()
                .error_threshold(1)
                .sleep_window(Duration::from_secs(3600)),
        );
        runtime.block_on(async {
            let _ = registry
                .execute("http://bench.local", || async {
                    Err(HttpClientError::Timeout {
                        timeout: Duration::from_millis(1),
                    })
                })
                .await;
        });
        b.to_async(&runtime).iter(|| async {
            let result = registry
                .execute("http://bench.local", || async { Ok(HttpResponse::new(200, "")) })
                .await;
            black_box(result)
        });
    });

    group.finish();
}

fn bench_registry_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup");

    for destinations in [1usize, 16, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(destinations),
            &destinations,
            |b, &destinations| {
                let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
                let keys: Vec<String> = (0..destinations)
                    .map(|i| format!("http://host-{}.local", i))
                    .collect();
                let mut counter = 0usize;
                b.iter(|| {
                    let key = &keys[counter % destinations];
                    black_box(registry.breaker(black_box(key)));
                    counter = counter.wrapping_add(1);
                });
            },
        );
    }

    group.finish();
}

fn bench_client_get(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let transport: Arc<dyn HttpTransport> = Arc::new(InstantTransport);
    let client = HttpClient::builder()
        .host("http://bench.local")
        .circuit_breaker_enabled(true)
        .transport(transport)
        .build()
        .unwrap();

    c.bench_function("client_get_mock_transport", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = client
                .get(RequestParams::new("/items").path_variable(1).query("q", "x"))
                .await;
            black_box(result)
        });
    });
}

criterion_group!(benches, bench_breaker_execute, bench_registry_lookup, bench_client_get);
criterion_main!(benches);
