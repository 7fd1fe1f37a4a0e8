//! Entity model for Quire.
//!
//! Defines the contracts between the blogging API's JSON and the resource
//! store:
//! - [`Article`], [`User`], [`Comment`], [`Notification`], [`Community`]: the
//!   tagged entity shapes, validated once when server data enters the cache
//! - [`EntitySchema`]: per-resource id field, searchable fields and merge
//!   strategy
//! - [`Patch`]: shallow field-level change sets with computable inverses,
//!   the unit of every optimistic update
//!
//! Anything beyond these shapes passes through the store as opaque JSON.

mod patch;
mod schema;
mod shapes;

pub use patch::{FieldOp, Patch};
pub use schema::{EntitySchema, MergeStrategy};
pub use shapes::{
    Article, Comment, Community, CommunityMember, EntityShape, Notification, User, entity_id,
    validate_shape,
};

use quire_types::ResourceType;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating shapes or building patches.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("{resource} payload is not a JSON object")]
    NotAnObject { resource: ResourceType },

    #[error("invalid {resource} shape: {message}")]
    InvalidShape {
        resource: ResourceType,
        message: String,
    },

    #[error("{resource} payload has no id field")]
    MissingId { resource: ResourceType },

    #[error("patch must be a JSON object")]
    PatchNotObject,

    #[error("cannot invert a patch against a non-object value")]
    InvertNonObject,
}
