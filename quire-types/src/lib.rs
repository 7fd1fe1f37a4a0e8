//! Core type definitions for Quire.
//!
//! This crate defines the fundamental, transport-agnostic types used by the
//! resource store and the client:
//! - Entity and collection keys (`article:abc123`, `bookmarks:me`)
//! - Mutation identifiers (UUID v7)
//! - An injectable wall clock, so freshness and session expiry can be tested
//!   against simulated time
//!
//! Entity *shapes* (articles, users, notifications, ...) live in `quire-model`.

mod clock;
mod ids;
mod key;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use ids::MutationId;
pub use key::{CollectionKey, EntityKey, ResourceType, Scope};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
