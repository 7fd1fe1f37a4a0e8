//! Tagged entity shapes of the blogging API.
//!
//! Server payloads are validated against these shapes once, when they enter
//! the cache. Only the fields the client relies on are required; everything
//! else is carried in `extra` and passed through unmodified.

use quire_types::{EntityKey, ResourceType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ModelError, ModelResult};

/// A typed view over one resource type's JSON.
pub trait EntityShape: DeserializeOwned {
    const RESOURCE: ResourceType;

    /// The server-side id.
    fn id(&self) -> &str;

    /// The cache key for this entity.
    fn key(&self) -> EntityKey {
        EntityKey::new(Self::RESOURCE, self.id())
    }

    /// Deserializes a JSON payload into this shape.
    fn from_value(value: &Value) -> ModelResult<Self> {
        if !value.is_object() {
            return Err(ModelError::NotAnObject {
                resource: Self::RESOURCE,
            });
        }
        serde_json::from_value(value.clone()).map_err(|e| ModelError::InvalidShape {
            resource: Self::RESOURCE,
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub author: Option<Value>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityShape for Article {
    const RESOURCE: ResourceType = ResourceType::Article;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub followers: Vec<Value>,
    #[serde(default)]
    pub following: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityShape for User {
    const RESOURCE: ResourceType = ResourceType::User;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub author: Option<Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityShape for Comment {
    const RESOURCE: ResourceType = ResourceType::Comment;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityShape for Notification {
    const RESOURCE: ResourceType = ResourceType::Notification;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityMember {
    pub user_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<CommunityMember>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Community {
    /// Whether `user_id` is listed among the members.
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }
}

impl EntityShape for Community {
    const RESOURCE: ResourceType = ResourceType::Community;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Validates a payload against the shape of `resource`.
pub fn validate_shape(resource: ResourceType, value: &Value) -> ModelResult<()> {
    match resource {
        ResourceType::Article => Article::from_value(value).map(drop),
        ResourceType::User => User::from_value(value).map(drop),
        ResourceType::Comment => Comment::from_value(value).map(drop),
        ResourceType::Notification => Notification::from_value(value).map(drop),
        ResourceType::Community => Community::from_value(value).map(drop),
    }
}

/// Extracts the server id (`_id`, falling back to `id`) from a payload.
pub fn entity_id(resource: ResourceType, value: &Value) -> ModelResult<String> {
    let obj = value
        .as_object()
        .ok_or(ModelError::NotAnObject { resource })?;
    match obj.get("_id").or_else(|| obj.get("id")) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ModelError::MissingId { resource }),
    }
}
