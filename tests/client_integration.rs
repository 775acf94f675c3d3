//! End-to-end tests against a local wiremock server.

use pretty_assertions::assert_eq;
use resilient_httpclient::{HttpClient, HttpClientError, RequestParams, TransportError};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpClient {
    HttpClient::builder()
        .host(format!("{}/", server.uri()))
        .timeout(Duration::from_millis(300))
        .header("X-Client", "integration")
        .build()
        .expect("Failed to build client")
}

#[tokio::test]
async fn test_get_with_path_variables_and_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/42/orders"))
        .and(query_param("status", "open"))
        .and(query_param("page", "2"))
        .and(header("x-client", "integration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"orders": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .get(
            RequestParams::new("/users")
                .path_variable(42)
                .path_variable("orders")
                .query("status", "open")
                .query("page", 2),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body, json!({"orders": []}));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"sku": "A-1", "qty": 3})))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .post(RequestParams::new("orders").body(json!({"sku": "A-1", "qty": 3})))
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.text(), "created");
}

#[tokio::test]
async fn test_put_and_delete() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/items/9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/items/9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let put = client
        .put(RequestParams::new("/items").path_variable(9).body(json!({"name": "x"})))
        .await
        .unwrap();
    let delete = client
        .delete(RequestParams::new("/items").path_variable(9))
        .await
        .unwrap();

    assert_eq!(put.status, 204);
    assert_eq!(delete.status, 204);
}

#[tokio::test]
async fn test_error_status_is_a_response_and_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::builder()
        .host(server.uri())
        .retry_count(3)
        .backoff_unit(Duration::from_millis(10))
        .circuit_breaker_enabled(true)
        .build()
        .unwrap();

    let response = client.get(RequestParams::new("/broken")).await.unwrap();

    assert_eq!(response.status, 503);
    assert!(!response.is_success());
}

#[tokio::test]
async fn test_slow_destination_times_out_and_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(3)
        .mount(&server)
        .await;

    let client = HttpClient::builder()
        .host(server.uri())
        .timeout(Duration::from_millis(100))
        .retry_count(2)
        .backoff_unit(Duration::from_millis(10))
        .build()
        .unwrap();

    let result = client.get(RequestParams::new("/slow")).await;

    assert!(matches!(
        result,
        Err(HttpClientError::Transport(TransportError::Timeout { .. }))
    ));
    assert_eq!(client.metrics().get_metrics().retries, 2);
}

#[tokio::test]
async fn test_do_vanilla_against_server() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/raw"))
        .and(header("x-raw", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("raw ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = resilient_httpclient::HttpRequest::parse(
        resilient_httpclient::Method::GET,
        &format!("{}/raw", server.uri()),
    )
    .unwrap()
    .with_header("X-Raw", "1")
    .unwrap();

    let response = client.do_vanilla(request).await.unwrap();

    assert_eq!(response.text(), "raw ok");
}
