//! Keys for cached resources.
//!
//! An [`EntityKey`] names one server-owned record (`article:abc123`,
//! `user:me`). A [`CollectionKey`] names an ordered query result
//! (`articles:all`, `bookmarks:me`). Both are stable across refetches.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// The kinds of entity the blogging API serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Article,
    User,
    Comment,
    Notification,
    Community,
}

impl ResourceType {
    /// All resource types, in declaration order.
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Article,
        ResourceType::User,
        ResourceType::Comment,
        ResourceType::Notification,
        ResourceType::Community,
    ];

    /// The key prefix for this resource type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Article => "article",
            ResourceType::User => "user",
            ResourceType::Comment => "comment",
            ResourceType::Notification => "notification",
            ResourceType::Community => "community",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownResourceType(s.to_string()))
    }
}

/// Whether a cached resource belongs to the signed-in user.
///
/// User-scoped entries are invalidated when the session expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Public,
    User,
}

/// Identifier of the signed-in user in keys (`user:me`).
pub const ME: &str = "me";

/// Key of a single cached entity: `(resource_type, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityKey {
    resource: ResourceType,
    id: String,
}

impl EntityKey {
    /// Creates a key for `id` of the given resource type.
    pub fn new(resource: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource,
            id: id.into(),
        }
    }

    pub fn article(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Article, id)
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(ResourceType::User, id)
    }

    pub fn comment(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Comment, id)
    }

    pub fn notification(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Notification, id)
    }

    pub fn community(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Community, id)
    }

    /// The signed-in user's own profile.
    pub fn me() -> Self {
        Self::user(ME)
    }

    /// Returns the resource type.
    #[must_use]
    pub fn resource(&self) -> ResourceType {
        self.resource
    }

    /// Returns the server-side id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Profile and notifications belong to the signed-in user.
    #[must_use]
    pub fn scope(&self) -> Scope {
        match (self.resource, self.id.as_str()) {
            (ResourceType::User, ME) | (ResourceType::Notification, _) => Scope::User,
            _ => Scope::Public,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.id)
    }
}

impl FromStr for EntityKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, id) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidKey(format!("missing ':' in {s:?}")))?;
        if id.is_empty() {
            return Err(Error::InvalidKey(format!("empty id in {s:?}")));
        }
        Ok(Self::new(resource.parse()?, id))
    }
}

impl TryFrom<String> for EntityKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityKey> for String {
    fn from(key: EntityKey) -> Self {
        key.to_string()
    }
}

/// Key of a named collection (an ordered list of entity keys).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionKey {
    name: String,
    scope: Scope,
}

impl CollectionKey {
    /// A collection visible to everyone (e.g. `articles:all`).
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: Scope::Public,
        }
    }

    /// A collection that belongs to the signed-in user (e.g. `bookmarks:me`).
    pub fn user_scoped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: Scope::User,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
