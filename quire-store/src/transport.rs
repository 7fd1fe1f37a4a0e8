//! Transport abstraction.
//!
//! The store never speaks HTTP itself. Loaders and mutation calls are
//! usually built on an [`HttpClient`] supplied by the application; the
//! `reqwest` implementation lives in `quire-client`.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JSON request against the API.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the client's base URL (e.g. `/api/article/post/all`).
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Errors surfaced by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Non-success HTTP status, with the server's `{message}` if it sent one.
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status {
        status: u16,
        message: Option<String>,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("request timed out")]
    Timeout,
}

impl TransportError {
    /// The HTTP status code, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for 401/403 responses.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

/// A generic JSON-over-HTTP client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the decoded JSON body.
    async fn request(&self, request: HttpRequest) -> Result<Value, TransportError>;
}

/// A scripted client for testing.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use crate::lock::lock;

    /// Replays queued responses per `(method, path)` and records every call.
    /// Unscripted requests get a 404.
    #[derive(Debug, Default)]
    pub struct MockHttpClient {
        replies: Mutex<HashMap<(Method, String), VecDeque<Result<Value, TransportError>>>>,
        calls: Mutex<Vec<HttpRequest>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a reply for the next request to `(method, path)`.
        pub fn respond(
            &self,
            method: Method,
            path: impl Into<String>,
            reply: Result<Value, TransportError>,
        ) {
            lock(&self.replies, "mock_respond")
                .entry((method, path.into()))
                .or_default()
                .push_back(reply);
        }

        /// All requests received so far.
        pub fn calls(&self) -> Vec<HttpRequest> {
            lock(&self.calls, "mock_calls").clone()
        }

        pub fn call_count(&self) -> usize {
            lock(&self.calls, "mock_calls").len()
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn request(&self, request: HttpRequest) -> Result<Value, TransportError> {
            let key = (request.method, request.path.clone());
            lock(&self.calls, "mock_request").push(request);
            lock(&self.replies, "mock_request")
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Err(TransportError::Status {
                    status: 404,
                    message: Some("not scripted".to_string()),
                }))
        }
    }
}
