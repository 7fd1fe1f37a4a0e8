use quire_types::ResourceType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Describes how a resource type is identified, searched and merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub resource: ResourceType,
    /// Field carrying the server id (`_id` on this API).
    pub id_field: String,
    /// Top-level string fields matched by local search.
    pub searchable_fields: Vec<String>,
    pub merge_strategy: MergeStrategy,
}

impl EntitySchema {
    /// The default schema for a resource type.
    pub fn for_resource(resource: ResourceType) -> Self {
        let searchable: &[&str] = match resource {
            ResourceType::Article => &["title", "description"],
            ResourceType::User => &["username", "name"],
            ResourceType::Comment => &["text"],
            ResourceType::Notification => &["message"],
            ResourceType::Community => &["name", "description"],
        };
        Self {
            resource,
            id_field: "_id".to_string(),
            searchable_fields: searchable.iter().map(|s| s.to_string()).collect(),
            merge_strategy: MergeStrategy::LwwPerField,
        }
    }

    /// Replaces the searchable fields.
    #[must_use]
    pub fn with_searchable_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    /// Case-insensitive substring match of `needle` (already lowercased)
    /// against the searchable fields of `value`.
    pub fn matches(&self, value: &Value, needle_lower: &str) -> bool {
        if needle_lower.is_empty() {
            return true;
        }
        self.searchable_fields.iter().any(|field| {
            value
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|text| text.to_lowercase().contains(needle_lower))
        })
    }
}

/// How a server-confirmed value is folded into an optimistic one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// The server document replaces the local one.
    LwwDocument,
    /// Server fields overwrite local fields; local-only fields survive.
    LwwPerField,
}

impl MergeStrategy {
    /// Merges `server` over `local`. Fields for which `keep_local` returns
    /// true keep their local value (or absence).
    pub fn merge(&self, local: &Value, server: &Value, keep_local: impl Fn(&str) -> bool) -> Value {
        let (Some(local_obj), Some(server_obj)) = (local.as_object(), server.as_object()) else {
            return server.clone();
        };

        let mut merged = match self {
            MergeStrategy::LwwDocument => server_obj.clone(),
            MergeStrategy::LwwPerField => {
                let mut out = local_obj.clone();
                for (k, v) in server_obj {
                    out.insert(k.clone(), v.clone());
                }
                out
            }
        };

        let kept: Vec<&String> = local_obj
            .keys()
            .chain(server_obj.keys())
            .filter(|k| keep_local(k))
            .collect();
        for field in kept {
            match local_obj.get(field) {
                Some(v) => {
                    merged.insert(field.clone(), v.clone());
                }
                None => {
                    merged.remove(field);
                }
            }
        }

        Value::Object(merged)
    }
}
