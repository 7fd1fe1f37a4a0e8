//! Error types for the resource store.

use quire_model::ModelError;
use quire_types::{EntityKey, MutationId};
use thiserror::Error;

use crate::query::QueryKey;
use crate::transport::TransportError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned synchronously by store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The session is absent or past its expiry; nothing was issued.
    #[error("session expired")]
    SessionExpired,

    /// An optimistic mutation had no valid inverse; nothing was applied.
    #[error("cannot compute inverse for {key}: {reason}")]
    InverseComputation { key: EntityKey, reason: InverseError },

    /// A read failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Channel closed before a result was delivered.
    #[error("channel closed")]
    ChannelClosed,
}

/// Why an inverse patch could not be established.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InverseError {
    #[error("patch is empty")]
    EmptyPatch,

    #[error("entity is not cached")]
    NotCached,

    #[error("inverse does not cover fields: {}", .0.join(", "))]
    Incomplete(Vec<String>),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// What made a fetch fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchCause {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Shape(#[from] ModelError),

    #[error("response is not a list")]
    NotAList,
}

/// A failed read. The cache is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch of {key} failed: {cause}")]
pub struct FetchError {
    pub key: QueryKey,
    pub cause: FetchCause,
}

impl FetchError {
    pub fn new(key: QueryKey, cause: impl Into<FetchCause>) -> Self {
        Self {
            key,
            cause: cause.into(),
        }
    }
}

/// A failed write. The optimistic patch has been rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mutation {id} on {key} failed: {cause}")]
pub struct MutationFailed {
    pub id: MutationId,
    pub key: EntityKey,
    pub cause: TransportError,
}
