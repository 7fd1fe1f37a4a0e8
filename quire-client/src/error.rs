//! Client error types.

use quire_model::ModelError;
use quire_store::{FetchCause, FetchError, StoreError, TransportError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur talking to the blogging API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid form: {0}")]
    InvalidForm(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Returns true if the server rejected the credentials (401/403) or the
    /// local session is no longer valid.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_unauthorized(),
            ClientError::Fetch(e) | ClientError::Store(StoreError::Fetch(e)) => {
                matches!(&e.cause, FetchCause::Transport(t) if t.is_unauthorized())
            }
            ClientError::Store(StoreError::SessionExpired) => true,
            ClientError::Http(e) => e
                .status()
                .is_some_and(|s| matches!(s.as_u16(), 401 | 403)),
            _ => false,
        }
    }

    /// The HTTP status behind this error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transport(e) => e.status(),
            ClientError::Fetch(e) | ClientError::Store(StoreError::Fetch(e)) => match &e.cause {
                FetchCause::Transport(t) => t.status(),
                _ => None,
            },
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
