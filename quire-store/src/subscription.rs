//! Change subscriptions.
//!
//! Callbacks are registered per entity or collection key and invoked with a
//! snapshot after the cache lock has been released. Every [`Subscription`]
//! carries a generation counter; detaching bumps it, so a notification that
//! was already collected for delivery is discarded instead of reaching a
//! view that has gone away.

use quire_types::{CollectionKey, EntityKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::cache::{CacheEntry, CollectionEntry};
use crate::lock::lock;

pub(crate) type EntityCallback = Arc<dyn Fn(&CacheEntry) + Send + Sync>;
pub(crate) type CollectionCallback = Arc<dyn Fn(&CollectionEntry) + Send + Sync>;

/// Checks whether the subscription a notification was collected for is
/// still attached.
#[derive(Debug, Clone)]
pub struct GenerationGuard {
    generation: Arc<AtomicU64>,
    expected: u64,
}

impl GenerationGuard {
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::Acquire) == self.expected
    }
}

struct Listener<C> {
    id: u64,
    generation: Arc<AtomicU64>,
    callback: C,
}

impl<C: Clone> Listener<C> {
    fn snapshot(&self) -> (GenerationGuard, C) {
        let guard = GenerationGuard {
            generation: Arc::clone(&self.generation),
            expected: self.generation.load(Ordering::Acquire),
        };
        (guard, self.callback.clone())
    }
}

#[derive(Debug, Clone)]
enum Target {
    Entity(EntityKey),
    Collection(CollectionKey),
}

#[derive(Default)]
pub(crate) struct Registry {
    next_id: u64,
    entities: HashMap<EntityKey, Vec<Listener<EntityCallback>>>,
    collections: HashMap<CollectionKey, Vec<Listener<CollectionCallback>>>,
}

impl Registry {
    pub(crate) fn add_entity(
        registry: &Arc<Mutex<Registry>>,
        key: EntityKey,
        callback: EntityCallback,
    ) -> Subscription {
        let generation = Arc::new(AtomicU64::new(0));
        let mut reg = lock(registry, "subscribe");
        let id = reg.allocate();
        reg.entities.entry(key.clone()).or_default().push(Listener {
            id,
            generation: Arc::clone(&generation),
            callback,
        });
        Subscription {
            id,
            target: Target::Entity(key),
            generation,
            registry: Arc::downgrade(registry),
        }
    }

    pub(crate) fn add_collection(
        registry: &Arc<Mutex<Registry>>,
        key: CollectionKey,
        callback: CollectionCallback,
    ) -> Subscription {
        let generation = Arc::new(AtomicU64::new(0));
        let mut reg = lock(registry, "subscribe_collection");
        let id = reg.allocate();
        reg.collections.entry(key.clone()).or_default().push(Listener {
            id,
            generation: Arc::clone(&generation),
            callback,
        });
        Subscription {
            id,
            target: Target::Collection(key),
            generation,
            registry: Arc::downgrade(registry),
        }
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn entity_listeners(&self, key: &EntityKey) -> Vec<(GenerationGuard, EntityCallback)> {
        self.entities
            .get(key)
            .map(|ls| ls.iter().map(Listener::snapshot).collect())
            .unwrap_or_default()
    }

    pub(crate) fn collection_listeners(
        &self,
        key: &CollectionKey,
    ) -> Vec<(GenerationGuard, CollectionCallback)> {
        self.collections
            .get(key)
            .map(|ls| ls.iter().map(Listener::snapshot).collect())
            .unwrap_or_default()
    }

    fn detach(&mut self, target: &Target, id: u64) {
        match target {
            Target::Entity(key) => {
                if let Some(ls) = self.entities.get_mut(key) {
                    ls.retain(|l| l.id != id);
                    if ls.is_empty() {
                        self.entities.remove(key);
                    }
                }
            }
            Target::Collection(key) => {
                if let Some(ls) = self.collections.get_mut(key) {
                    ls.retain(|l| l.id != id);
                    if ls.is_empty() {
                        self.collections.remove(key);
                    }
                }
            }
        }
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum::<usize>()
            + self.collections.values().map(Vec::len).sum::<usize>()
    }
}

/// A registered change callback. Detached on drop.
pub struct Subscription {
    id: u64,
    target: Target,
    generation: Arc<AtomicU64>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Detaches the callback. Notifications already collected for delivery
    /// are discarded.
    pub fn unsubscribe(self) {}

    /// A guard tied to the current generation of this subscription.
    pub fn guard(&self) -> GenerationGuard {
        GenerationGuard {
            generation: Arc::clone(&self.generation),
            expected: self.generation.load(Ordering::Acquire),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("target", &self.target)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry, "unsubscribe").detach(&self.target, self.id);
        }
    }
}
