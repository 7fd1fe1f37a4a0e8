//! Session lifecycle and mutation gating.
//!
//! `Anonymous -> Authenticated -> Expired -> Anonymous`. The expiry
//! transition happens lazily on the first guarded call after `expires_at`,
//! or from the background watch started by
//! [`SessionGuard::spawn_expiry_watch`]. On expiry, user-scoped cache entries
//! are invalidated (not dropped) and [`StoreEvent::SessionExpired`] is
//! broadcast.

use chrono::{DateTime, Utc};
use quire_types::SharedClock;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::EntityCache;
use crate::error::{StoreError, StoreResult};
use crate::events::{EventBus, StoreEvent};
use crate::lock::lock;

/// A bearer token and its expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Authenticated,
    Expired,
}

#[derive(Debug)]
enum GuardState {
    Anonymous,
    Authenticated(Session),
    Expired,
}

struct GuardInner {
    state: Mutex<GuardState>,
    clock: SharedClock,
    cache: EntityCache,
    events: EventBus,
}

/// Holds the single session of the store. Cheap to clone.
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<GuardInner>,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("status", &self.peek_status())
            .finish()
    }
}

impl SessionGuard {
    pub fn new(cache: EntityCache, events: EventBus) -> Self {
        let clock = Arc::clone(cache.clock());
        Self {
            inner: Arc::new(GuardInner {
                state: Mutex::new(GuardState::Anonymous),
                clock,
                cache,
                events,
            }),
        }
    }

    /// Replaces the current session.
    pub fn login(&self, session: Session) {
        info!(expires_at = %session.expires_at, "Session started");
        *lock(&self.inner.state, "login") = GuardState::Authenticated(session);
    }

    /// Clears the session and invalidates user-scoped entries.
    pub fn logout(&self) {
        let previous = std::mem::replace(&mut *lock(&self.inner.state, "logout"), GuardState::Anonymous);
        if !matches!(previous, GuardState::Anonymous) {
            info!("Session ended");
            self.inner.cache.invalidate_user_scoped();
        }
    }

    /// The session, if present and not expired.
    pub fn current_session(&self) -> Option<Session> {
        self.check_expiry();
        match &*lock(&self.inner.state, "current_session") {
            GuardState::Authenticated(session) => Some(session.clone()),
            GuardState::Anonymous | GuardState::Expired => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.current_session().is_some()
    }

    /// Gate for mutations and authenticated reads.
    pub fn require_valid(&self) -> StoreResult<Session> {
        self.current_session().ok_or(StoreError::SessionExpired)
    }

    pub fn status(&self) -> SessionStatus {
        self.check_expiry();
        self.peek_status()
    }

    fn peek_status(&self) -> SessionStatus {
        match &*lock(&self.inner.state, "status") {
            GuardState::Anonymous => SessionStatus::Anonymous,
            GuardState::Authenticated(_) => SessionStatus::Authenticated,
            GuardState::Expired => SessionStatus::Expired,
        }
    }

    /// `Bearer <token>` for a valid session.
    pub fn authorization_header(&self) -> Option<String> {
        self.current_session().map(|s| format!("Bearer {}", s.token))
    }

    /// Moves an authenticated session past its expiry to `Expired`.
    /// Returns true if the transition happened on this call.
    pub fn check_expiry(&self) -> bool {
        let now = self.inner.clock.now();
        {
            let mut state = lock(&self.inner.state, "check_expiry");
            let expired =
                matches!(&*state, GuardState::Authenticated(s) if s.is_expired_at(now));
            if !expired {
                return false;
            }
            *state = GuardState::Expired;
        }
        info!("Session expired; invalidating user-scoped entries");
        self.inner.cache.invalidate_user_scoped();
        self.inner.events.emit(StoreEvent::SessionExpired);
        true
    }

    /// Checks expiry every `interval` until the guard is dropped.
    pub fn spawn_expiry_watch(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<GuardInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("Session guard dropped; stopping expiry watch");
                    break;
                };
                SessionGuard { inner }.check_expiry();
            }
        })
    }
}
