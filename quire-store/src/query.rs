//! Query executor: request coalescing and the freshness policy.
//!
//! At most one loader runs per key at a time; concurrent callers join the
//! in-flight fetch and all receive the same value or the same error.
//!
//! Freshness, decided from the stored entry:
//! - Fresh and younger than the TTL: served from cache, no call.
//! - Stale, Error or past the TTL: served from cache, and a coalesced
//!   background refresh is spawned. Subscribers see the new value when it
//!   lands; a failed refresh marks the entry Error and emits
//!   [`StoreEvent::FetchFailed`].
//! - Missing: the caller awaits the fetch. A failure writes nothing.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use quire_model::{entity_id, validate_shape};
use quire_types::{CollectionKey, EntityKey, ResourceType, Scope};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::cache::{CacheEntry, EntityCache};
use crate::error::{FetchCause, FetchError};
use crate::events::{EventBus, StoreEvent};
use crate::lock::lock;
use crate::session::SessionGuard;
use crate::transport::TransportError;

/// Identifies an in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Entity(EntityKey),
    Collection(CollectionKey),
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Entity(key) => fmt::Display::fmt(key, f),
            QueryKey::Collection(key) => fmt::Display::fmt(key, f),
        }
    }
}

/// One attempt of a loader.
pub type Attempt = dyn Fn() -> BoxFuture<'static, Result<Value, TransportError>> + Send + Sync;

/// Wraps every loader invocation. The store never retries on its own.
#[async_trait]
pub trait RetryPolicy: Send + Sync {
    async fn run(&self, key: &QueryKey, attempt: &Attempt) -> Result<Value, TransportError>;
}

/// Runs each loader exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

#[async_trait]
impl RetryPolicy for NoRetry {
    async fn run(&self, _key: &QueryKey, attempt: &Attempt) -> Result<Value, TransportError> {
        attempt().await
    }
}

#[derive(Debug, Clone)]
enum Landed {
    Entity(CacheEntry),
    Collection(Vec<CacheEntry>),
}

impl Landed {
    fn into_value(self) -> Value {
        match self {
            Landed::Entity(entry) => entry.value,
            Landed::Collection(entries) => Value::Array(entries.into_iter().map(|e| e.value).collect()),
        }
    }

    fn into_entries(self) -> Vec<CacheEntry> {
        match self {
            Landed::Entity(entry) => vec![entry],
            Landed::Collection(entries) => entries,
        }
    }
}

type Loader = Arc<Attempt>;
type SharedFetch = Shared<BoxFuture<'static, Result<Landed, FetchError>>>;

fn boxed_loader<L, Fut>(loader: L) -> Loader
where
    L: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TransportError>> + Send + 'static,
{
    Arc::new(move || loader().boxed())
}

/// Reads through the cache, coalescing concurrent fetches per key.
#[derive(Clone)]
pub struct QueryExecutor {
    cache: EntityCache,
    session: SessionGuard,
    events: EventBus,
    ttl: chrono::Duration,
    retry: Arc<dyn RetryPolicy>,
    in_flight: Arc<Mutex<HashMap<QueryKey, SharedFetch>>>,
}

impl fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("ttl", &self.ttl)
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

impl QueryExecutor {
    pub fn new(cache: EntityCache, session: SessionGuard, events: EventBus, ttl: chrono::Duration) -> Self {
        Self {
            cache,
            session,
            events,
            ttl,
            retry: Arc::new(NoRetry),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wraps every loader in `policy`.
    #[must_use]
    pub fn with_retry(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry = Arc::new(policy);
        self
    }

    /// Number of fetches currently in flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight, "in_flight_count").len()
    }

    /// Reads one entity.
    pub async fn fetch<L, Fut>(&self, key: EntityKey, loader: L) -> Result<Value, FetchError>
    where
        L: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TransportError>> + Send + 'static,
    {
        if key.scope() == Scope::User {
            self.session.check_expiry();
        }
        let loader = boxed_loader(loader);

        if let Some((entry, stale)) = self.cache.freshness(&key, self.ttl) {
            if stale {
                debug!(key = %key, state = ?entry.state, "Serving cached entry; revalidating");
                let shared = self.join_entity(key, loader);
                self.spawn_refresh(shared);
            }
            return Ok(entry.value);
        }

        debug!(key = %key, "Cache miss");
        let shared = self.join_entity(key, loader);
        shared.await.map(Landed::into_value)
    }

    /// Reads a collection of `resource` entities. The loader must resolve to
    /// a JSON array; every item is shape-checked before anything is stored.
    pub async fn fetch_collection<L, Fut>(
        &self,
        key: CollectionKey,
        resource: ResourceType,
        loader: L,
    ) -> Result<Vec<CacheEntry>, FetchError>
    where
        L: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TransportError>> + Send + 'static,
    {
        if key.scope() == Scope::User {
            self.session.check_expiry();
        }
        let loader = boxed_loader(loader);

        if let Some((entries, stale)) = self.cache.collection_freshness(&key, self.ttl) {
            if stale {
                debug!(key = %key, "Serving cached collection; revalidating");
                let shared = self.join_collection(key, resource, loader);
                self.spawn_refresh(shared);
            }
            return Ok(entries);
        }

        debug!(key = %key, "Collection cache miss");
        let shared = self.join_collection(key, resource, loader);
        shared.await.map(Landed::into_entries)
    }

    fn join_entity(&self, key: EntityKey, loader: Loader) -> SharedFetch {
        let this = self.clone();
        self.join(QueryKey::Entity(key.clone()), move |watermark| {
            async move { this.load_entity(key, loader, watermark).await }.boxed()
        })
    }

    fn join_collection(&self, key: CollectionKey, resource: ResourceType, loader: Loader) -> SharedFetch {
        let this = self.clone();
        self.join(QueryKey::Collection(key.clone()), move |watermark| {
            async move { this.load_collection(key, resource, loader, watermark).await }.boxed()
        })
    }

    /// Returns the in-flight fetch for `key`, starting one if there is none.
    fn join<F>(&self, key: QueryKey, start: F) -> SharedFetch
    where
        F: FnOnce(u64) -> BoxFuture<'static, Result<Landed, FetchError>>,
    {
        let mut in_flight = lock(&self.in_flight, "join");
        if let Some(existing) = in_flight.get(&key) {
            debug!(key = %key, "Joining in-flight fetch");
            return existing.clone();
        }
        let watermark = self.cache.watermark();
        let fetch = start(watermark).shared();
        in_flight.insert(key, fetch.clone());
        fetch
    }

    fn finish(&self, key: &QueryKey) {
        lock(&self.in_flight, "finish").remove(key);
    }

    async fn attempt(&self, key: &QueryKey, loader: &Loader) -> Result<Value, FetchError> {
        self.retry
            .run(key, loader.as_ref())
            .await
            .map_err(|e| FetchError::new(key.clone(), e))
    }

    async fn load_entity(&self, key: EntityKey, loader: Loader, watermark: u64) -> Result<Landed, FetchError> {
        let qkey = QueryKey::Entity(key.clone());
        let result = async {
            let value = self.attempt(&qkey, &loader).await?;
            validate_shape(key.resource(), &value).map_err(|e| FetchError::new(qkey.clone(), e))?;
            Ok::<_, FetchError>(value)
        }
        .await;
        self.finish(&qkey);

        let value = result?;
        debug!(key = %key, "Fetched entity");
        Ok(Landed::Entity(self.cache.land(key, value, watermark)))
    }

    async fn load_collection(
        &self,
        key: CollectionKey,
        resource: ResourceType,
        loader: Loader,
        watermark: u64,
    ) -> Result<Landed, FetchError> {
        let qkey = QueryKey::Collection(key.clone());
        let result = async {
            let items = match self.attempt(&qkey, &loader).await? {
                Value::Array(items) => items,
                _ => return Err(FetchError::new(qkey.clone(), FetchCause::NotAList)),
            };
            let mut checked = Vec::with_capacity(items.len());
            for item in items {
                validate_shape(resource, &item).map_err(|e| FetchError::new(qkey.clone(), e))?;
                let id = entity_id(resource, &item).map_err(|e| FetchError::new(qkey.clone(), e))?;
                checked.push((EntityKey::new(resource, id), item));
            }
            Ok::<_, FetchError>(checked)
        }
        .await;
        self.finish(&qkey);

        let checked = result?;
        debug!(key = %key, count = checked.len(), "Fetched collection");
        let mut members = Vec::with_capacity(checked.len());
        let mut entries = Vec::with_capacity(checked.len());
        for (member, value) in checked {
            members.push(member.clone());
            entries.push(self.cache.land(member, value, watermark));
        }
        self.cache.put_collection(key, members);
        Ok(Landed::Collection(entries))
    }

    fn spawn_refresh(&self, fetch: SharedFetch) {
        let cache = self.cache.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(err) = fetch.await {
                warn!(key = %err.key, error = %err.cause, "Background revalidation failed");
                match &err.key {
                    QueryKey::Entity(key) => cache.mark_error(key),
                    QueryKey::Collection(key) => cache.mark_collection_error(key),
                }
                events.emit(StoreEvent::FetchFailed(err));
            }
        });
    }
}
