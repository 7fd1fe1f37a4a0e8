//! Store events delivered to views.
//!
//! Errors that cannot be returned to a caller (rolled-back mutations,
//! failed background revalidations, session expiry) are broadcast here.

use quire_types::{EntityKey, MutationId};
use tokio::sync::broadcast;

use crate::error::{FetchError, MutationFailed};

/// Something a view may want to surface (toast, inline message).
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    MutationCommitted { id: MutationId, key: EntityKey },
    MutationFailed(MutationFailed),
    /// A stale-while-revalidate refresh failed; the entry keeps its value.
    FetchFailed(FetchError),
    SessionExpired,
}

/// Broadcast channel for [`StoreEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns a receiver for events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Emits an event; dropped if nobody listens.
    pub(crate) fn emit(&self, event: StoreEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
