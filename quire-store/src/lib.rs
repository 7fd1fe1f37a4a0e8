//! Client-side resource store for Quire.
//!
//! Mediates between views and the blogging API's REST backend:
//!
//! - **EntityCache**: keyed entities and collections with freshness tracking,
//!   a per-key ledger of pending optimistic mutations, and change
//!   subscriptions
//! - **QueryExecutor**: coalesces concurrent fetches of the same key and
//!   applies the freshness policy (fresh hit, stale-while-revalidate, miss)
//! - **OptimisticMutator**: applies a patch locally, issues the network call,
//!   then commits or rolls back field by field
//! - **SearchFilter**: local, restartable text filtering over cached
//!   collections, with a debouncer for keystroke input
//! - **SessionGuard**: bearer-token lifecycle and mutation gating
//!
//! Network access goes through the [`HttpClient`] trait; the store never
//! picks a transport itself.
//!
//! # Example
//!
//! ```
//! use quire_store::{ResourceStore, StoreConfig};
//!
//! let store = ResourceStore::new(StoreConfig {
//!     ttl_secs: 60,
//!     ..Default::default()
//! });
//! assert!(!store.session().is_valid());
//! ```

pub mod cache;
mod config;
mod error;
mod events;
mod ledger;
mod lock;
pub mod mutator;
pub mod query;
pub mod search;
pub mod session;
mod store;
pub mod subscription;
pub mod transport;

pub use cache::{CacheEntry, CollectionEntry, EntityCache, EntryState};
pub use config::{SchemaRegistry, StoreConfig};
pub use error::{FetchCause, FetchError, InverseError, MutationFailed, StoreError, StoreResult};
pub use events::{EventBus, StoreEvent};
pub use ledger::{MutationStatus, PendingMutation};
pub use mutator::{MutationHandle, MutationOutcome, OptimisticMutator};
pub use query::{NoRetry, QueryExecutor, QueryKey, RetryPolicy};
pub use search::{DebouncedSearch, SearchFilter, SearchResults, SortOrder, ALL_CATEGORIES};
pub use session::{Session, SessionGuard, SessionStatus};
pub use store::ResourceStore;
pub use subscription::{GenerationGuard, Subscription};
pub use transport::{HttpClient, HttpRequest, Method, TransportError};
