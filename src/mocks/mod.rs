//! Mock implementations for testing.
//!
//! [`MockTransport`] stands in for the network: it replays queued outcomes,
//! records every request it receives and can simulate a slow destination.

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// A recorded request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: Method,
    /// Full request URL.
    pub url: String,
    /// Request headers (lower-cased names).
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Option<Bytes>,
}

impl RecordedRequest {
    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parses the body as JSON.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }
}

/// Outcome replayed by the mock for one request.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this response.
    Response(HttpResponse),
    /// Fail with this transport error.
    Error(TransportError),
}

impl MockOutcome {
    /// A response with the given status and body.
    pub fn status(status: u16, body: &str) -> Self {
        MockOutcome::Response(HttpResponse::new(status, body.to_string()))
    }

    /// A JSON response.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        let mut response = HttpResponse::new(status, value.to_string());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        MockOutcome::Response(response)
    }

    /// A connection failure.
    pub fn connection_error(message: &str) -> Self {
        MockOutcome::Error(TransportError::Connection {
            message: message.to_string(),
        })
    }
}

/// Mock HTTP transport for testing.
pub struct MockTransport {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    default_outcome: Mutex<MockOutcome>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    /// Creates a mock that answers `200 OK` with an empty body.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(MockOutcome::status(200, "")),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Creates a mock that fails every request with a connection error.
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.set_default(MockOutcome::connection_error("connection refused"));
        mock
    }

    /// Waits `delay` before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues an outcome; queued outcomes are used before the default.
    pub fn queue(&self, outcome: MockOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Queues a response.
    pub fn queue_response(&self, response: HttpResponse) {
        self.queue(MockOutcome::Response(response));
    }

    /// Queues a transport error.
    pub fn queue_error(&self, error: TransportError) {
        self.queue(MockOutcome::Error(error));
    }

    /// Sets the outcome returned once the queue is empty.
    pub fn set_default(&self, outcome: MockOutcome) {
        *self.default_outcome.lock() = outcome;
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Gets the last recorded request.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().last().cloned()
    }

    /// Returns the number of requests made.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_outcome(&self) -> MockOutcome {
        let queued = self.outcomes.lock().pop_front();
        queued.unwrap_or_else(|| self.default_outcome.lock().clone())
    }

    fn record_request(&self, request: &HttpRequest) {
        let headers = request
            .headers
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|val| (k.as_str().to_string(), val.to_string()))
            })
            .collect();

        self.requests.lock().push(RecordedRequest {
            method: request.method.clone(),
            url: request.url.to_string(),
            headers,
            body: request.body.clone(),
        });
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("queued", &self.outcomes.lock().len())
            .field("requests", &self.request_count())
            .field("delay", &self.delay)
            .finish()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.record_request(&request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_outcome() {
            MockOutcome::Response(response) => Ok(response),
            MockOutcome::Error(error) => Err(error),
        }
    }
}
