//! `reqwest` transport.
//!
//! Every request is JSON in, JSON out. The bearer token comes from the
//! store's [`SessionGuard`] at send time, so a login or an expiry is picked
//! up without rebuilding the client. Error bodies of the form
//! `{"message": "..."}` are surfaced in [`TransportError::Status`].

use async_trait::async_trait;
use quire_store::{HttpClient, HttpRequest, Method, SessionGuard, TransportError};
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// HTTP client for the blogging API.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
    base_url: String,
    session: Option<SessionGuard>,
}

impl ReqwestClient {
    /// Builds a client from `config`. Requests carry no credentials until
    /// [`with_session`](Self::with_session) is called.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session: None,
        })
    }

    /// Attaches `Authorization: Bearer <token>` while `session` is valid.
    #[must_use]
    pub fn with_session(mut self, session: SessionGuard) -> Self {
        self.session = Some(session);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute paths are used as-is; everything else is joined to the base URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn request(&self, request: HttpRequest) -> Result<Value, TransportError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        let has_auth = request
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION.as_str()));
        if !has_auth {
            if let Some(header) = self.session.as_ref().and_then(SessionGuard::authorization_header) {
                builder = builder.header(AUTHORIZATION, header);
            }
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(network_error)?;

        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string));
            warn!(
                method = %request.method,
                url = %url,
                status = status.as_u16(),
                message = message.as_deref().unwrap_or(""),
                "Request failed"
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

fn network_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}
