//! Client-side query cache with optimistic mutations.
//!
//! Inspired by TanStack Query:
//! - `QueryCache` stores one entry per structural `QueryKey`
//! - `QueryObserver` keeps a key fetched while a view is showing it
//! - `MutationCoordinator` applies writes optimistically and rolls them back on failure

mod cache;
mod key;
mod mutation;

pub use cache::{
  CacheEntry, CacheError, CacheEvent, CacheEventKind, CacheSubscription, Invalidation,
  QueryCache, QueryObserver, QueryStatus, Snapshot,
};
pub use key::{KeyPart, QueryKey};
pub use mutation::{MutationCoordinator, MutationError, MutationPhase, PendingMutation};
