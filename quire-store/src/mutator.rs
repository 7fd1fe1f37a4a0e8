//! Optimistic mutations.
//!
//! A mutation is applied to the cache immediately, then its network call
//! runs on the Tokio runtime. Success commits it (merging a canonical server
//! object if one is returned); failure rolls it back field by field and is
//! reported through the [`MutationHandle`] and a
//! [`StoreEvent::MutationFailed`] broadcast.

use quire_model::{validate_shape, Patch};
use quire_types::{EntityKey, MutationId};
use serde_json::Value;
use std::future::Future;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::EntityCache;
use crate::error::{MutationFailed, StoreError, StoreResult};
use crate::events::{EventBus, StoreEvent};
use crate::session::SessionGuard;
use crate::transport::TransportError;

/// How a mutation settled.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Committed,
    RolledBack(MutationFailed),
}

/// Tracks a submitted mutation until it settles.
#[derive(Debug)]
pub struct MutationHandle {
    id: MutationId,
    key: EntityKey,
    rx: oneshot::Receiver<MutationOutcome>,
}

impl MutationHandle {
    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Waits for the network call and the resulting commit or rollback.
    pub async fn settled(self) -> StoreResult<MutationOutcome> {
        self.rx.await.map_err(|_| StoreError::ChannelClosed)
    }
}

/// Applies patches locally before the server confirms them.
#[derive(Debug, Clone)]
pub struct OptimisticMutator {
    cache: EntityCache,
    session: SessionGuard,
    events: EventBus,
}

impl OptimisticMutator {
    pub fn new(cache: EntityCache, session: SessionGuard, events: EventBus) -> Self {
        Self {
            cache,
            session,
            events,
        }
    }

    /// Submits a mutation with an explicit inverse, which must restore every
    /// field `patch` touches.
    ///
    /// `call` performs the network request and may return the canonical
    /// entity. Must be called from within a Tokio runtime.
    pub fn mutate<C, Fut>(
        &self,
        key: EntityKey,
        patch: Patch,
        inverse: Patch,
        call: C,
    ) -> StoreResult<MutationHandle>
    where
        C: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<Value>, TransportError>> + Send + 'static,
    {
        self.submit(key, patch, Some(inverse), call)
    }

    /// Submits a mutation whose inverse is computed from the cached value.
    /// Fails with [`StoreError::InverseComputation`] if the key is not cached.
    pub fn mutate_computed<C, Fut>(&self, key: EntityKey, patch: Patch, call: C) -> StoreResult<MutationHandle>
    where
        C: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<Value>, TransportError>> + Send + 'static,
    {
        self.submit(key, patch, None, call)
    }

    fn submit<C, Fut>(
        &self,
        key: EntityKey,
        patch: Patch,
        inverse: Option<Patch>,
        call: C,
    ) -> StoreResult<MutationHandle>
    where
        C: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<Value>, TransportError>> + Send + 'static,
    {
        self.session.require_valid()?;

        let id = MutationId::new();
        let mutation = self
            .cache
            .begin_mutation(&key, id, patch, inverse)
            .map_err(|reason| StoreError::InverseComputation {
                key: key.clone(),
                reason,
            })?;
        debug!(id = %id, key = %key, seq = mutation.seq, "Applied optimistic patch");

        let (tx, rx) = oneshot::channel();
        let cache = self.cache.clone();
        let events = self.events.clone();
        let target = key.clone();
        tokio::spawn(async move {
            let outcome = match call().await {
                Ok(server) => {
                    let server = server.filter(|value| match validate_shape(target.resource(), value) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(key = %target, error = %e, "Ignoring malformed server response");
                            false
                        }
                    });
                    cache.commit_mutation(&target, id, server);
                    debug!(id = %id, key = %target, "Mutation committed");
                    events.emit(StoreEvent::MutationCommitted { id, key: target });
                    MutationOutcome::Committed
                }
                Err(cause) => {
                    if cache.rollback_mutation(&target, id).is_none() {
                        debug!(id = %id, key = %target, "Mutation no longer recorded; nothing to roll back");
                    }
                    warn!(id = %id, key = %target, error = %cause, "Mutation failed; rolled back");
                    let failed = MutationFailed {
                        id,
                        key: target,
                        cause,
                    };
                    events.emit(StoreEvent::MutationFailed(failed.clone()));
                    MutationOutcome::RolledBack(failed)
                }
            };
            let _ = tx.send(outcome);
        });

        Ok(MutationHandle { id, key, rx })
    }
}
