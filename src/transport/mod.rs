//! HTTP transport layer.
//!
//! The transport performs exactly one network round trip for a fully formed
//! [`HttpRequest`]. It knows nothing about retries or circuit breaking, which
//! keeps it swappable: the default implementation is built on reqwest and tests
//! substitute [`crate::mocks::MockTransport`].

mod http;

pub use self::http::{HttpTransport, ReqwestTransport};

use ::http::{HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::errors::{HttpClientError, HttpClientResult};

/// A fully formed transport-level request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL, including the query string.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<Bytes>,
    /// Per-request timeout override.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Parses `url` and creates a request.
    pub fn parse(method: Method, url: &str) -> HttpClientResult<Self> {
        Ok(Self::new(method, Url::parse(url)?))
    }

    /// Sets a header, validating its name and value.
    pub fn with_header(mut self, name: &str, value: &str) -> HttpClientResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            HttpClientError::request_construction(format!("Invalid header name '{}': {}", name, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            HttpClientError::request_construction(format!("Invalid header value for '{}': {}", name, e))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP response returned by the transport.
///
/// Any status code is a response; only network-level problems are errors.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers (lower-cased names).
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a response with the given status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Returns true if the status indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parses the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> HttpClientResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Transport error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("Connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// The transport-level timeout elapsed.
    #[error("Transport timeout after {timeout:?}")]
    Timeout {
        /// Timeout duration.
        timeout: Duration,
    },

    /// The request failed after the connection was established.
    #[error("Request error: {message}")]
    Request {
        /// Error message.
        message: String,
    },

    /// The response body could not be read.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },
}
