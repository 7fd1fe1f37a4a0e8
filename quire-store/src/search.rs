//! Local search over cached collections.
//!
//! Filtering never touches the network. A [`SearchResults`] holds a
//! snapshot of the collection's cached members; iterating it is lazy and can
//! be restarted any number of times with the same outcome.

use chrono::{DateTime, FixedOffset};
use quire_types::CollectionKey;
use serde_json::Value;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{CacheEntry, EntityCache};
use crate::config::SchemaRegistry;

/// Category value that disables category filtering.
pub const ALL_CATEGORIES: &str = "All";

/// Ordering for [`SearchResults::sorted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Most recent `createdAt` first.
    Newest,
    /// Highest `viewCount` first.
    MostViewed,
}

/// Filtered view over a snapshot of a cached collection.
#[derive(Debug, Clone)]
pub struct SearchResults {
    collection: CollectionKey,
    query: String,
    needle: String,
    category: Option<String>,
    entries: Arc<Vec<CacheEntry>>,
    schemas: Arc<SchemaRegistry>,
}

impl SearchResults {
    pub fn collection(&self) -> &CollectionKey {
        &self.collection
    }

    /// The text as typed.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Matching entries, in collection order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> + '_ {
        self.entries.iter().filter(move |entry| self.matches(entry))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Restricts results to entries whose `categories` contain `category`.
    /// [`ALL_CATEGORIES`] removes the restriction.
    #[must_use]
    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        self.category = (category != ALL_CATEGORIES).then_some(category);
        self
    }

    /// Matching entries, ordered by `order`. Entries without the sort field
    /// go last; ties keep collection order.
    pub fn sorted(&self, order: SortOrder) -> Vec<CacheEntry> {
        let mut out: Vec<CacheEntry> = self.iter().cloned().collect();
        match order {
            SortOrder::Newest => out.sort_by_key(|e| Reverse(created_at(&e.value))),
            SortOrder::MostViewed => {
                out.sort_by_key(|e| Reverse(e.value.get("viewCount").and_then(Value::as_u64)))
            }
        }
        out
    }

    fn matches(&self, entry: &CacheEntry) -> bool {
        let schema = self.schemas.get(entry.key.resource());
        if !schema.matches(&entry.value, &self.needle) {
            return false;
        }
        match &self.category {
            None => true,
            Some(category) => entry
                .value
                .get("categories")
                .and_then(Value::as_array)
                .is_some_and(|cats| cats.iter().any(|c| c.as_str() == Some(category.as_str()))),
        }
    }
}

fn created_at(value: &Value) -> Option<DateTime<FixedOffset>> {
    value
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Builds [`SearchResults`] from the cache.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    cache: EntityCache,
    schemas: Arc<SchemaRegistry>,
}

impl SearchFilter {
    pub fn new(cache: EntityCache) -> Self {
        let schemas = Arc::new(cache.schemas().clone());
        Self { cache, schemas }
    }

    /// Case-insensitive substring search over the searchable fields of the
    /// collection's cached members. An empty `text` matches everything.
    pub fn filter(&self, collection: &CollectionKey, text: &str) -> SearchResults {
        SearchResults {
            collection: collection.clone(),
            query: text.to_string(),
            needle: text.to_lowercase(),
            category: None,
            entries: Arc::new(self.cache.collection_entries(collection)),
            schemas: Arc::clone(&self.schemas),
        }
    }

    /// A keystroke debouncer publishing results for `collection`.
    pub fn debounced(&self, collection: CollectionKey, delay: Duration) -> DebouncedSearch {
        DebouncedSearch::new(self.clone(), collection, delay)
    }
}

/// Runs a search only once input has been quiet for the debounce delay.
///
/// Each [`input`](Self::input) cancels the pending timer. Results are
/// published on a watch channel. Must be used within a Tokio runtime.
#[derive(Debug)]
pub struct DebouncedSearch {
    filter: SearchFilter,
    collection: CollectionKey,
    delay: Duration,
    tx: Arc<watch::Sender<Option<SearchResults>>>,
    timer: Option<JoinHandle<()>>,
}

impl DebouncedSearch {
    pub fn new(filter: SearchFilter, collection: CollectionKey, delay: Duration) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            filter,
            collection,
            delay,
            tx: Arc::new(tx),
            timer: None,
        }
    }

    /// Receives every published result set.
    pub fn subscribe(&self) -> watch::Receiver<Option<SearchResults>> {
        self.tx.subscribe()
    }

    /// The last published results.
    pub fn latest(&self) -> Option<SearchResults> {
        self.tx.borrow().clone()
    }

    pub fn input(&mut self, text: impl Into<String>) {
        self.cancel();
        let text = text.into();
        let filter = self.filter.clone();
        let collection = self.collection.clone();
        let tx = Arc::clone(&self.tx);
        let delay = self.delay;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let results = filter.filter(&collection, &text);
            debug!(collection = %collection, query = %text, "Publishing debounced search");
            tx.send_replace(Some(results));
        }));
    }

    /// Drops the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for DebouncedSearch {
    fn drop(&mut self) {
        self.cancel();
    }
}
