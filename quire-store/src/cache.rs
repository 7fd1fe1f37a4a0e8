//! Entity cache.
//!
//! Keyed storage of server-backed entities and ordered collections of keys.
//! All state sits behind one mutex that is never held across an `.await`;
//! every operation on a key runs to completion under it. Subscribers are
//! notified with snapshots once the lock has been released.

use chrono::{DateTime, Utc};
use quire_model::Patch;
use quire_types::{CollectionKey, EntityKey, MutationId, Scope, SharedClock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::config::SchemaRegistry;
use crate::error::InverseError;
use crate::ledger::{KeyLedger, MutationStatus, PendingMutation};
use crate::lock::lock;
use crate::subscription::{Registry, Subscription};

/// Freshness of a cached entity or collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Confirmed by the server within the TTL.
    Fresh,
    /// Invalidated or past the TTL. Still served.
    Stale,
    /// Carries at least one unconfirmed optimistic patch.
    Pending,
    /// The last background revalidation failed. The value is retained.
    Error,
}

/// Snapshot of a cached entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: EntityKey,
    pub value: Value,
    pub fetched_at: DateTime<Utc>,
    pub state: EntryState,
}

/// Snapshot of a cached collection. Members are keys, not entity copies.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionEntry {
    pub key: CollectionKey,
    pub members: Vec<EntityKey>,
    pub fetched_at: DateTime<Utc>,
    pub state: EntryState,
}

#[derive(Debug)]
struct Slot {
    value: Value,
    fetched_at: DateTime<Utc>,
    /// Never `Pending`; that is derived from the ledger.
    state: EntryState,
}

#[derive(Debug)]
struct CollectionSlot {
    members: Vec<EntityKey>,
    fetched_at: DateTime<Utc>,
    state: EntryState,
}

#[derive(Debug, Default)]
struct CacheState {
    /// Store-wide logical time. Mutation sequence numbers and commit ticks
    /// are drawn from it.
    tick: u64,
    entries: HashMap<EntityKey, Slot>,
    collections: HashMap<CollectionKey, CollectionSlot>,
    ledgers: HashMap<EntityKey, KeyLedger>,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn snapshot(&self, key: &EntityKey) -> Option<CacheEntry> {
        let slot = self.entries.get(key)?;
        let pending = self.ledgers.get(key).is_some_and(KeyLedger::has_pending);
        Some(CacheEntry {
            key: key.clone(),
            value: slot.value.clone(),
            fetched_at: slot.fetched_at,
            state: if pending { EntryState::Pending } else { slot.state },
        })
    }

    fn collection_snapshot(&self, key: &CollectionKey) -> Option<CollectionEntry> {
        let slot = self.collections.get(key)?;
        Some(CollectionEntry {
            key: key.clone(),
            members: slot.members.clone(),
            fetched_at: slot.fetched_at,
            state: slot.state,
        })
    }

    /// Records that `key` changed: its snapshot plus every collection
    /// referencing it.
    fn touched(&self, key: &EntityKey, changes: &mut Changes) {
        if let Some(entry) = self.snapshot(key) {
            changes.entities.push(entry);
        }
        for (ckey, slot) in &self.collections {
            if slot.members.contains(key) {
                changes.collection(self, ckey);
            }
        }
    }
}

/// Snapshots to deliver once the state lock is released.
#[derive(Default)]
struct Changes {
    entities: Vec<CacheEntry>,
    collections: Vec<CollectionEntry>,
}

impl Changes {
    fn collection(&mut self, state: &CacheState, key: &CollectionKey) {
        if self.collections.iter().any(|c| &c.key == key) {
            return;
        }
        if let Some(entry) = state.collection_snapshot(key) {
            self.collections.push(entry);
        }
    }

    fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.collections.is_empty()
    }
}

struct Inner {
    state: Mutex<CacheState>,
    subscribers: Arc<Mutex<Registry>>,
    clock: SharedClock,
    schemas: SchemaRegistry,
}

/// The store's entity and collection cache. Cheap to clone.
#[derive(Clone)]
pub struct EntityCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state, "debug");
        f.debug_struct("EntityCache")
            .field("entries", &state.entries.len())
            .field("collections", &state.collections.len())
            .finish()
    }
}

impl EntityCache {
    pub fn new(clock: SharedClock, schemas: SchemaRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState::default()),
                subscribers: Arc::new(Mutex::new(Registry::default())),
                clock,
                schemas,
            }),
        }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.inner.schemas
    }

    pub fn get(&self, key: &EntityKey) -> Option<CacheEntry> {
        lock(&self.inner.state, "get").snapshot(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        lock(&self.inner.state, "contains").entries.contains_key(key)
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        lock(&self.inner.state, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a server value as Fresh, rebasing any pending optimistic
    /// patches on top of it.
    pub fn put(&self, key: EntityKey, value: Value) -> CacheEntry {
        let watermark = self.watermark();
        self.land(key, value, watermark)
    }

    /// Current store-wide tick. A fetch records it when issued and passes it
    /// back to [`land`](Self::land).
    pub(crate) fn watermark(&self) -> u64 {
        lock(&self.inner.state, "watermark").tick
    }

    /// Stores a server value fetched at `watermark`. Fields committed after
    /// that point keep their committed value.
    pub(crate) fn land(&self, key: EntityKey, value: Value, watermark: u64) -> CacheEntry {
        let now = self.inner.clock.now();
        let mut changes = Changes::default();
        let entry = {
            let mut state = lock(&self.inner.state, "put");
            let value = match state.ledgers.get_mut(&key) {
                Some(ledger) => ledger.rebase(value, watermark),
                None => value,
            };
            state.entries.insert(
                key.clone(),
                Slot {
                    value,
                    fetched_at: now,
                    state: EntryState::Fresh,
                },
            );
            state.touched(&key, &mut changes);
            state.snapshot(&key)
        };
        self.dispatch(changes);
        entry.unwrap_or_else(|| CacheEntry {
            key,
            value: Value::Null,
            fetched_at: now,
            state: EntryState::Fresh,
        })
    }

    /// Shallow-merges `patch` into an existing entry. Returns false (and does
    /// nothing) if the key is not cached.
    pub fn patch(&self, key: &EntityKey, patch: &Patch) -> bool {
        let mut changes = Changes::default();
        let applied = {
            let mut state = lock(&self.inner.state, "patch");
            match state.entries.get_mut(key) {
                Some(slot) => {
                    patch.apply(&mut slot.value);
                    state.touched(key, &mut changes);
                    true
                }
                None => false,
            }
        };
        self.dispatch(changes);
        applied
    }

    /// Marks an entry Stale, keeping its value.
    pub fn invalidate(&self, key: &EntityKey) {
        self.set_state(key, EntryState::Stale, "invalidate");
    }

    /// Marks an entry as failed to revalidate, keeping its value.
    pub(crate) fn mark_error(&self, key: &EntityKey) {
        self.set_state(key, EntryState::Error, "mark_error");
    }

    fn set_state(&self, key: &EntityKey, to: EntryState, op: &'static str) {
        let mut changes = Changes::default();
        {
            let mut state = lock(&self.inner.state, op);
            let Some(slot) = state.entries.get_mut(key) else {
                return;
            };
            slot.state = to;
            state.touched(key, &mut changes);
        }
        self.dispatch(changes);
    }

    /// Evicts an entity, its mutation ledger and its collection memberships.
    pub fn remove(&self, key: &EntityKey) -> Option<CacheEntry> {
        let mut changes = Changes::default();
        let removed = {
            let mut state = lock(&self.inner.state, "remove");
            let removed = state.snapshot(key);
            state.entries.remove(key);
            state.ledgers.remove(key);
            let mut affected = Vec::new();
            for (ckey, slot) in state.collections.iter_mut() {
                let before = slot.members.len();
                slot.members.retain(|m| m != key);
                if slot.members.len() != before {
                    affected.push(ckey.clone());
                }
            }
            for ckey in &affected {
                changes.collection(&state, ckey);
            }
            removed
        };
        if removed.is_some() {
            debug!(key = %key, "Evicted cache entry");
        }
        self.dispatch(changes);
        removed
    }

    /// Stores a collection's membership as Fresh.
    pub fn put_collection(&self, key: CollectionKey, members: Vec<EntityKey>) -> CollectionEntry {
        let now = self.inner.clock.now();
        let mut changes = Changes::default();
        let entry = CollectionEntry {
            key: key.clone(),
            members: members.clone(),
            fetched_at: now,
            state: EntryState::Fresh,
        };
        {
            let mut state = lock(&self.inner.state, "put_collection");
            state.collections.insert(
                key,
                CollectionSlot {
                    members,
                    fetched_at: now,
                    state: EntryState::Fresh,
                },
            );
            changes.collections.push(entry.clone());
        }
        self.dispatch(changes);
        entry
    }

    pub fn collection(&self, key: &CollectionKey) -> Option<CollectionEntry> {
        lock(&self.inner.state, "collection").collection_snapshot(key)
    }

    /// Snapshots of the collection's cached members, in order. Members that
    /// are not cached are skipped.
    pub fn collection_entries(&self, key: &CollectionKey) -> Vec<CacheEntry> {
        let state = lock(&self.inner.state, "collection_entries");
        state
            .collections
            .get(key)
            .map(|slot| slot.members.iter().filter_map(|m| state.snapshot(m)).collect())
            .unwrap_or_default()
    }

    pub fn invalidate_collection(&self, key: &CollectionKey) {
        self.set_collection_state(key, EntryState::Stale);
    }

    pub(crate) fn mark_collection_error(&self, key: &CollectionKey) {
        self.set_collection_state(key, EntryState::Error);
    }

    fn set_collection_state(&self, key: &CollectionKey, to: EntryState) {
        let mut changes = Changes::default();
        {
            let mut state = lock(&self.inner.state, "collection_state");
            let Some(slot) = state.collections.get_mut(key) else {
                return;
            };
            slot.state = to;
            changes.collection(&state, key);
        }
        self.dispatch(changes);
    }

    /// Marks every user-scoped entity and collection Stale.
    pub fn invalidate_user_scoped(&self) {
        let mut changes = Changes::default();
        {
            let mut state = lock(&self.inner.state, "invalidate_user_scoped");
            let keys: Vec<EntityKey> = state
                .entries
                .keys()
                .filter(|k| k.scope() == Scope::User)
                .cloned()
                .collect();
            let ckeys: Vec<CollectionKey> = state
                .collections
                .keys()
                .filter(|k| k.scope() == Scope::User)
                .cloned()
                .collect();
            for key in &keys {
                if let Some(slot) = state.entries.get_mut(key) {
                    slot.state = EntryState::Stale;
                }
            }
            for key in &ckeys {
                if let Some(slot) = state.collections.get_mut(key) {
                    slot.state = EntryState::Stale;
                }
            }
            for key in &keys {
                state.touched(key, &mut changes);
            }
            for key in &ckeys {
                changes.collection(&state, key);
            }
            debug!(
                entities = keys.len(),
                collections = ckeys.len(),
                "Invalidated user-scoped entries"
            );
        }
        self.dispatch(changes);
    }

    /// Returns the entry and whether it needs revalidation: its stored state
    /// is not Fresh, or it was fetched `ttl` or longer ago.
    pub(crate) fn freshness(&self, key: &EntityKey, ttl: chrono::Duration) -> Option<(CacheEntry, bool)> {
        let now = self.inner.clock.now();
        let state = lock(&self.inner.state, "freshness");
        let slot = state.entries.get(key)?;
        let stale = slot.state != EntryState::Fresh || now - slot.fetched_at >= ttl;
        state.snapshot(key).map(|entry| (entry, stale))
    }

    pub(crate) fn collection_freshness(
        &self,
        key: &CollectionKey,
        ttl: chrono::Duration,
    ) -> Option<(Vec<CacheEntry>, bool)> {
        let now = self.inner.clock.now();
        let state = lock(&self.inner.state, "collection_freshness");
        let slot = state.collections.get(key)?;
        let stale = slot.state != EntryState::Fresh || now - slot.fetched_at >= ttl;
        let entries = slot.members.iter().filter_map(|m| state.snapshot(m)).collect();
        Some((entries, stale))
    }

    /// Pending optimistic mutations on `key`, oldest first.
    pub fn pending(&self, key: &EntityKey) -> Vec<PendingMutation> {
        lock(&self.inner.state, "pending")
            .ledgers
            .get(key)
            .map(|l| l.pending().cloned().collect())
            .unwrap_or_default()
    }

    /// Records a mutation and applies its patch.
    ///
    /// The inverse is either the explicit one, which must cover every patched
    /// field, or computed from the cached value. An explicit inverse on an
    /// uncached key records the mutation without any local change.
    pub(crate) fn begin_mutation(
        &self,
        key: &EntityKey,
        id: MutationId,
        patch: Patch,
        inverse: Option<Patch>,
    ) -> Result<PendingMutation, InverseError> {
        if patch.is_empty() {
            return Err(InverseError::EmptyPatch);
        }
        if let Some(inverse) = &inverse {
            let missing = inverse.missing_from(&patch);
            if !missing.is_empty() {
                return Err(InverseError::Incomplete(missing));
            }
        }

        let mut changes = Changes::default();
        let mutation = {
            let mut state = lock(&self.inner.state, "begin_mutation");
            let inverse = match (inverse, state.entries.get(key)) {
                (Some(inverse), _) => inverse,
                (None, Some(slot)) => patch.invert(&slot.value)?,
                (None, None) => return Err(InverseError::NotCached),
            };
            let seq = state.next_tick();
            let mutation = PendingMutation {
                id,
                target_key: key.clone(),
                seq,
                optimistic_patch: patch,
                inverse_patch: inverse,
                status: MutationStatus::InFlight,
            };
            if let Some(slot) = state.entries.get_mut(key) {
                mutation.optimistic_patch.apply(&mut slot.value);
            }
            state.ledgers.entry(key.clone()).or_default().push(mutation.clone());
            state.touched(key, &mut changes);
            mutation
        };
        self.dispatch(changes);
        Ok(mutation)
    }

    /// Confirms a mutation. A canonical `server` object is merged over the
    /// entry with the schema's merge strategy and the entry becomes Fresh.
    pub(crate) fn commit_mutation(
        &self,
        key: &EntityKey,
        id: MutationId,
        server: Option<Value>,
    ) -> Option<PendingMutation> {
        let strategy = self.inner.schemas.get(key.resource()).merge_strategy;
        let now = self.inner.clock.now();
        let mut changes = Changes::default();
        let committed = {
            let mut state = lock(&self.inner.state, "commit_mutation");
            let tick = state.next_tick();
            let CacheState { entries, ledgers, .. } = &mut *state;
            let ledger = ledgers.get_mut(key)?;
            let slot = entries.get_mut(key);
            let visible = slot.as_ref().map(|s| &s.value);
            let (mutation, merged) = ledger.commit(id, tick, visible, server.as_ref(), strategy)?;
            if let (Some(slot), Some(merged)) = (slot, merged) {
                slot.value = merged;
                slot.state = EntryState::Fresh;
                slot.fetched_at = now;
            }
            state.touched(key, &mut changes);
            mutation
        };
        self.dispatch(changes);
        Some(committed)
    }

    /// Reverts a failed mutation field by field. A no-op if the mutation is
    /// no longer recorded (for example because the key was evicted).
    pub(crate) fn rollback_mutation(&self, key: &EntityKey, id: MutationId) -> Option<PendingMutation> {
        let mut changes = Changes::default();
        let rolled_back = {
            let mut state = lock(&self.inner.state, "rollback_mutation");
            let (mutation, restore) = state.ledgers.get_mut(key)?.rollback(id)?;
            if let Some(slot) = state.entries.get_mut(key) {
                restore.apply(&mut slot.value);
            }
            state.touched(key, &mut changes);
            mutation
        };
        self.dispatch(changes);
        Some(rolled_back)
    }

    pub fn subscribe<F>(&self, key: EntityKey, callback: F) -> Subscription
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        Registry::add_entity(&self.inner.subscribers, key, Arc::new(callback))
    }

    /// Subscribes to a collection. Fires when its membership or state
    /// changes, and when any member entity changes.
    pub fn subscribe_collection<F>(&self, key: CollectionKey, callback: F) -> Subscription
    where
        F: Fn(&CollectionEntry) + Send + Sync + 'static,
    {
        Registry::add_collection(&self.inner.subscribers, key, Arc::new(callback))
    }

    /// Number of attached subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers, "subscriber_count").listener_count()
    }

    fn dispatch(&self, changes: Changes) {
        if changes.is_empty() {
            return;
        }
        let (entity_calls, collection_calls) = {
            let registry = lock(&self.inner.subscribers, "dispatch");
            let entity_calls: Vec<_> = changes
                .entities
                .into_iter()
                .flat_map(|entry| {
                    registry
                        .entity_listeners(&entry.key)
                        .into_iter()
                        .map(move |listener| (entry.clone(), listener))
                })
                .collect();
            let collection_calls: Vec<_> = changes
                .collections
                .into_iter()
                .flat_map(|entry| {
                    registry
                        .collection_listeners(&entry.key)
                        .into_iter()
                        .map(move |listener| (entry.clone(), listener))
                })
                .collect();
            (entity_calls, collection_calls)
        };

        for (entry, (guard, callback)) in entity_calls {
            if guard.is_current() {
                callback(&entry);
            }
        }
        for (entry, (guard, callback)) in collection_calls {
            if guard.is_current() {
                callback(&entry);
            }
        }
    }
}
