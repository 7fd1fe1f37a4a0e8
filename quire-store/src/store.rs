//! The resource store: wires the cache, executor, mutator, search and
//! session guard around one clock and one event bus.

use quire_types::{CollectionKey, SharedClock, SystemClock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cache::EntityCache;
use crate::config::StoreConfig;
use crate::events::{EventBus, StoreEvent};
use crate::mutator::OptimisticMutator;
use crate::query::{QueryExecutor, RetryPolicy};
use crate::search::{DebouncedSearch, SearchFilter};
use crate::session::SessionGuard;

/// Client-side resource store.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    config: StoreConfig,
    cache: EntityCache,
    session: SessionGuard,
    query: QueryExecutor,
    mutator: OptimisticMutator,
    search: SearchFilter,
    events: EventBus,
}

impl ResourceStore {
    /// Creates a store on the system clock.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Creates a store on a caller-supplied clock.
    pub fn with_clock(config: StoreConfig, clock: SharedClock) -> Self {
        let events = EventBus::new(config.event_capacity);
        let cache = EntityCache::new(clock, config.schemas());
        let session = SessionGuard::new(cache.clone(), events.clone());
        let query = QueryExecutor::new(cache.clone(), session.clone(), events.clone(), config.ttl());
        let mutator = OptimisticMutator::new(cache.clone(), session.clone(), events.clone());
        let search = SearchFilter::new(cache.clone());
        Self {
            config,
            cache,
            session,
            query,
            mutator,
            search,
            events,
        }
    }

    /// Wraps every loader of the query executor in `policy`.
    #[must_use]
    pub fn with_retry(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.query = self.query.with_retry(policy);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn query(&self) -> &QueryExecutor {
        &self.query
    }

    pub fn mutator(&self) -> &OptimisticMutator {
        &self.mutator
    }

    pub fn search(&self) -> &SearchFilter {
        &self.search
    }

    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// A debouncer over `collection` using the configured delay.
    pub fn debounced_search(&self, collection: CollectionKey) -> DebouncedSearch {
        self.search.debounced(collection, self.config.debounce())
    }

    /// Starts the periodic session expiry check at the configured interval.
    pub fn spawn_session_watch(&self) -> JoinHandle<()> {
        self.session
            .spawn_expiry_watch(self.config.session_check_interval())
    }
}
