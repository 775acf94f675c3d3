//! Error types for the HTTP client.
//!
//! Every failure a caller can observe is one variant of [`HttpClientError`].
//! Construction and serialization errors are raised before any network I/O and
//! never consume a retry; transport-level failures, breaker timeouts and
//! short-circuits are retried according to the client's retry policy.

use std::time::Duration;
use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for HTTP client operations.
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// Boxed error returned by user-supplied hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for HTTP client operations.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// Configuration error (missing host, invalid environment values, etc.)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue.
        message: String,
    },

    /// The request body could not be encoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message from the encoder.
        message: String,
    },

    /// The request could not be built (bad method, URL or header).
    #[error("Request construction error: {message}")]
    RequestConstruction {
        /// Error message describing the malformed part.
        message: String,
    },

    /// Network-level failure reported by the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The circuit breaker command timeout elapsed.
    #[error("Command timed out after {timeout:?}")]
    Timeout {
        /// The command timeout that elapsed.
        timeout: Duration,
    },

    /// The circuit breaker for the destination is open.
    #[error("Circuit breaker open for '{key}': destination temporarily unavailable")]
    CircuitOpen {
        /// The destination key whose breaker rejected the call.
        key: String,
    },

    /// The pre-retry hook returned an error, halting the retry loop.
    #[error("Pre-retry hook aborted retries: {source}")]
    PreRetryAbort {
        /// The error returned by the hook.
        source: HookError,
    },

    /// A fallback function panicked.
    #[error("Fallback failed: {message}")]
    Fallback {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,
}

impl HttpClientError {
    /// Returns true if the retry controller may attempt the request again.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            HttpClientError::Configuration { .. }
                | HttpClientError::Serialization { .. }
                | HttpClientError::RequestConstruction { .. }
                | HttpClientError::PreRetryAbort { .. }
                | HttpClientError::Cancelled
        )
    }

    /// Returns true if this error counts as a failure in the breaker's rolling window.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(
            self,
            HttpClientError::Cancelled | HttpClientError::CircuitOpen { .. }
        )
    }

    /// Returns true if the call was short-circuited by an open breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, HttpClientError::CircuitOpen { .. })
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        HttpClientError::Configuration {
            message: message.into(),
        }
    }

    /// Creates a request construction error.
    pub fn request_construction(message: impl Into<String>) -> Self {
        HttpClientError::RequestConstruction {
            message: message.into(),
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HttpClientError::Configuration { .. } => "configuration",
            HttpClientError::Serialization { .. } => "serialization",
            HttpClientError::RequestConstruction { .. } => "request_construction",
            HttpClientError::Transport(_) => "transport",
            HttpClientError::Timeout { .. } => "timeout",
            HttpClientError::CircuitOpen { .. } => "circuit_open",
            HttpClientError::PreRetryAbort { .. } => "pre_retry_abort",
            HttpClientError::Fallback { .. } => "fallback",
            HttpClientError::Cancelled => "cancelled",
        }
    }
}

impl From<serde_json::Error> for HttpClientError {
    fn from(err: serde_json::Error) -> Self {
        HttpClientError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for HttpClientError {
    fn from(err: url::ParseError) -> Self {
        HttpClientError::RequestConstruction {
            message: format!("Invalid URL: {}", err),
        }
    }
}

impl From<http::Error> for HttpClientError {
    fn from(err: http::Error) -> Self {
        HttpClientError::RequestConstruction {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(HttpClientError::Transport(TransportError::Connection {
            message: "refused".to_string(),
        })
        .is_retryable());

        assert!(HttpClientError::CircuitOpen {
            key: "http://host".to_string()
        }
        .is_retryable());

        assert!(HttpClientError::Timeout {
            timeout: Duration::from_millis(10)
        }
        .is_retryable());

        assert!(!HttpClientError::Serialization {
            message: "test".to_string()
        }
        .is_retryable());

        assert!(!HttpClientError::Cancelled.is_retryable());
        assert!(!HttpClientError::PreRetryAbort {
            source: "stop".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_counts_as_failure() {
        assert!(HttpClientError::Timeout {
            timeout: Duration::from_secs(1)
        }
        .counts_as_failure());

        assert!(!HttpClientError::CircuitOpen {
            key: "k".to_string()
        }
        .counts_as_failure());

        assert!(!HttpClientError::Cancelled.counts_as_failure());
    }

    #[test]
    fn test_pre_retry_abort_keeps_source() {
        let error = HttpClientError::PreRetryAbort {
            source: "token refresh failed".into(),
        };

        assert!(error.to_string().contains("token refresh failed"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_url_parse_error_is_request_construction() {
        let err = url::Url::parse("not a url").unwrap_err();
        let error = HttpClientError::from(err);

        assert!(matches!(error, HttpClientError::RequestConstruction { .. }));
        assert_eq!(error.kind(), "request_construction");
    }
}
