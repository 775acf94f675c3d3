//! Per-call request parameters.

use std::collections::BTreeMap;

/// Describes one request relative to the client's host.
///
/// The body type defaults to [`serde_json::Value`]; [`RequestParams::body`]
/// switches it to any `Serialize` type. Query parameters are kept sorted by
/// key, which is also the order they are encoded in.
#[derive(Debug, Clone)]
pub struct RequestParams<B = serde_json::Value> {
    /// Path appended to the host.
    pub path: String,
    /// Segments appended to the path, in order.
    pub path_variables: Vec<String>,
    /// Query parameters.
    pub query: BTreeMap<String, String>,
    /// Per-call headers; these win over the client's default headers.
    pub headers: Vec<(String, String)>,
    /// Structured body, encoded as JSON.
    pub body: Option<B>,
}

impl RequestParams {
    /// Creates parameters for `path` with no body.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            path_variables: Vec::new(),
            query: BTreeMap::new(),
            headers: Vec::new(),
            body: None,
        }
    }
}

impl Default for RequestParams {
    fn default() -> Self {
        Self::new("")
    }
}

impl<B> RequestParams<B> {
    /// Appends one path variable.
    pub fn path_variable(mut self, value: impl ToString) -> Self {
        self.path_variables.push(value.to_string());
        self
    }

    /// Appends several path variables.
    pub fn path_variables<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.path_variables
            .extend(values.into_iter().map(|v| v.to_string()));
        self
    }

    /// Sets a query parameter, replacing any previous value for `key`.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(key.into(), value.to_string());
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body, changing the body type.
    pub fn body<T>(self, body: T) -> RequestParams<T> {
        RequestParams {
            path: self.path,
            path_variables: self.path_variables,
            query: self.query,
            headers: self.headers,
            body: Some(body),
        }
    }
}
