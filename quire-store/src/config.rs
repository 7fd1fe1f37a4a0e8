use quire_model::EntitySchema;
use quire_types::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the resource store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a fetched entry is served without revalidation (seconds).
    pub ttl_secs: u64,
    /// Debounce window for keystroke search (ms).
    pub debounce_ms: u64,
    /// Interval of the background session expiry check (seconds).
    pub session_check_secs: u64,
    /// Capacity of the store event broadcast channel.
    pub event_capacity: usize,
    /// Per-resource overrides of the searchable fields.
    pub search_fields: HashMap<ResourceType, Vec<String>>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            debounce_ms: 300,
            session_check_secs: 60,
            event_capacity: 256,
            search_fields: HashMap::new(),
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn session_check_interval(&self) -> Duration {
        Duration::from_secs(self.session_check_secs.max(1))
    }

    /// Builds the schema registry, applying search field overrides.
    pub fn schemas(&self) -> SchemaRegistry {
        let mut registry = SchemaRegistry::default();
        for (resource, fields) in &self.search_fields {
            let schema = EntitySchema::for_resource(*resource).with_searchable_fields(fields.clone());
            registry.register(schema);
        }
        registry
    }
}

/// Schemas for every resource type, defaulting to [`EntitySchema::for_resource`].
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<ResourceType, EntitySchema>,
}

impl SchemaRegistry {
    /// Replaces the schema for its resource type.
    pub fn register(&mut self, schema: EntitySchema) {
        self.schemas.insert(schema.resource, schema);
    }

    pub fn get(&self, resource: ResourceType) -> &EntitySchema {
        // Every resource type is populated by `Default`.
        &self.schemas[&resource]
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self {
            schemas: ResourceType::ALL
                .into_iter()
                .map(|r| (r, EntitySchema::for_resource(r)))
                .collect(),
        }
    }
}
