//! Optimistic mutations with rollback.
//!
//! Every write runs the same protocol:
//!
//! 1. cancel fetches in flight under the mutation's scope
//! 2. snapshot every entry under the scope
//! 3. apply the optimistic transform
//! 4. await the remote call (the only suspension point)
//! 5. on success invalidate the scope so active queries refetch,
//!    on failure restore the snapshot and hand the error back
//!
//! # Example
//!
//! ```ignore
//! let result = coordinator
//!   .run(
//!     "mark_read",
//!     vec![keys::all()],
//!     |cache| apply_mark_read(cache, &id),
//!     api.mark_read(&id),
//!   )
//!   .await;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::cache::{CacheError, Invalidation, QueryCache, Snapshot};
use super::key::{KeyPart, QueryKey};
use crate::gateway::GatewayError;

/// Where a mutation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
  Idle,
  Snapshotting,
  OptimisticApplied,
  InFlight,
  Committed,
  RolledBack,
  Settled,
}

impl fmt::Display for MutationPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      MutationPhase::Idle => "idle",
      MutationPhase::Snapshotting => "snapshotting",
      MutationPhase::OptimisticApplied => "optimistic_applied",
      MutationPhase::InFlight => "in_flight",
      MutationPhase::Committed => "committed",
      MutationPhase::RolledBack => "rolled_back",
      MutationPhase::Settled => "settled",
    };
    f.write_str(name)
  }
}

/// A failed mutation. The cache has already been rolled back.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
  #[error(transparent)]
  Gateway(#[from] GatewayError),
  #[error(transparent)]
  Cache(#[from] CacheError),
}

type QueueMap = HashMap<KeyPart, Arc<tokio::sync::Mutex<()>>>;

/// Runs optimistic mutations against a shared cache.
#[derive(Clone)]
pub struct MutationCoordinator {
  cache: QueryCache,
  /// Serialize mutations that share a resource family
  serialize: bool,
  queues: Arc<Mutex<QueueMap>>,
}

impl MutationCoordinator {
  pub fn new(cache: QueryCache) -> Self {
    Self {
      cache,
      serialize: true,
      queues: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Allow overlapping mutations on the same keys.
  ///
  /// A rollback then restores a snapshot that may predate another mutation's
  /// optimistic write, discarding it.
  pub fn with_serialization(mut self, serialize: bool) -> Self {
    self.serialize = serialize;
    self
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  /// Lock the queue of every resource family in `scope`, in a fixed order.
  async fn acquire(&self, scope: &[QueryKey]) -> Vec<OwnedMutexGuard<()>> {
    if !self.serialize {
      return Vec::new();
    }

    let roots: BTreeSet<KeyPart> = scope
      .iter()
      .filter_map(|key| key.root_part().cloned())
      .collect();

    let locks: Vec<Arc<tokio::sync::Mutex<()>>> = {
      let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
      roots
        .into_iter()
        .map(|root| queues.entry(root).or_default().clone())
        .collect()
    };

    let mut guards = Vec::with_capacity(locks.len());
    for lock in locks {
      guards.push(lock.lock_owned().await);
    }
    guards
  }

  /// Snapshot the scope and apply the optimistic transform.
  ///
  /// If the transform fails the snapshot is restored and nothing is in flight.
  pub async fn begin<F>(
    &self,
    label: &'static str,
    scope: Vec<QueryKey>,
    apply: F,
  ) -> Result<PendingMutation, MutationError>
  where
    F: FnOnce(&QueryCache) -> Result<(), CacheError>,
  {
    let guards = self.acquire(&scope).await;

    let mut pending = PendingMutation {
      label,
      cache: self.cache.clone(),
      scope,
      snapshot: None,
      cancelled: Vec::new(),
      phase: MutationPhase::Idle,
      _guards: guards,
    };

    pending.transition(MutationPhase::Snapshotting);
    for prefix in &pending.scope {
      let cancelled = self.cache.cancel_in_flight(prefix);
      pending.cancelled.extend(cancelled);
    }
    let scope = pending.scope.clone();
    pending.snapshot = Some(
      self
        .cache
        .snapshot(|key| scope.iter().any(|prefix| key.starts_with(prefix))),
    );

    if let Err(e) = apply(&self.cache) {
      warn!("{}: optimistic update failed: {}", label, e);
      pending.rollback_in_place();
      return Err(e.into());
    }
    pending.transition(MutationPhase::OptimisticApplied);

    Ok(pending)
  }

  /// Run a full mutation: optimistic apply, one remote call, commit or rollback.
  pub async fn run<T, F, Fut>(
    &self,
    label: &'static str,
    scope: Vec<QueryKey>,
    apply: F,
    remote: Fut,
  ) -> Result<T, MutationError>
  where
    F: FnOnce(&QueryCache) -> Result<(), CacheError>,
    Fut: Future<Output = Result<T, GatewayError>>,
  {
    let mut pending = self.begin(label, scope, apply).await?;
    pending.mark_in_flight();
    let result = remote.await;
    pending.settle(result)
  }
}

/// A mutation whose optimistic update is applied and which awaits its remote result.
///
/// Dropping it without settling rolls the cache back.
pub struct PendingMutation {
  label: &'static str,
  cache: QueryCache,
  scope: Vec<QueryKey>,
  snapshot: Option<Snapshot>,
  /// Fetches stopped by `begin`, restarted on rollback
  cancelled: Vec<QueryKey>,
  phase: MutationPhase,
  _guards: Vec<OwnedMutexGuard<()>>,
}

impl PendingMutation {
  fn transition(&mut self, next: MutationPhase) {
    debug!("{}: {} -> {}", self.label, self.phase, next);
    self.phase = next;
  }

  pub fn phase(&self) -> MutationPhase {
    self.phase
  }

  pub fn mark_in_flight(&mut self) {
    self.transition(MutationPhase::InFlight);
  }

  /// Finish with the remote result: commit on `Ok`, roll back on `Err`.
  /// The error is returned unchanged.
  pub fn settle<T, E>(self, result: Result<T, E>) -> Result<T, MutationError>
  where
    E: Into<MutationError>,
  {
    match result {
      Ok(value) => {
        // Refetches run in the background; callers observe them through the cache
        drop(self.commit());
        Ok(value)
      }
      Err(e) => {
        let err = e.into();
        warn!("{}: remote call failed, rolling back: {}", self.label, err);
        self.rollback();
        Err(err)
      }
    }
  }

  /// Keep the optimistic state and invalidate the scope so it re-syncs.
  pub fn commit(mut self) -> Invalidation {
    self.snapshot = None;
    self.transition(MutationPhase::Committed);

    let mut invalidation: Option<Invalidation> = None;
    for prefix in &self.scope {
      let next = self.cache.invalidate(prefix);
      invalidation = Some(match invalidation {
        Some(mut acc) => {
          acc.merge(next);
          acc
        }
        None => next,
      });
    }

    info!("{}: committed", self.label);
    self.transition(MutationPhase::Settled);
    invalidation.unwrap_or_else(Invalidation::empty)
  }

  /// Restore the snapshot taken before the optimistic update.
  pub fn rollback(mut self) {
    self.rollback_in_place();
  }

  fn rollback_in_place(&mut self) {
    if let Some(snapshot) = self.snapshot.take() {
      self.cache.restore(snapshot);
    }
    let cancelled = std::mem::take(&mut self.cancelled);
    let restarted = self.cache.refetch_observed(&cancelled);
    if !restarted.is_empty() {
      debug!("{}: restarted {} cancelled fetches", self.label, restarted.len());
    }
    self.transition(MutationPhase::RolledBack);
    self.transition(MutationPhase::Settled);
  }
}

impl Drop for PendingMutation {
  fn drop(&mut self) {
    if self.phase != MutationPhase::Settled {
      warn!("{}: dropped while {}, rolling back", self.label, self.phase);
      self.rollback_in_place();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;
  use serde_json::json;

  fn setup() -> (QueryCache, MutationCoordinator) {
    let cache = QueryCache::new(Duration::seconds(30));
    let coordinator = MutationCoordinator::new(cache.clone());
    (cache, coordinator)
  }

  fn counter_key() -> QueryKey {
    QueryKey::root("counter")
  }

  fn increment(cache: &QueryCache) -> Result<(), CacheError> {
    cache.update_data::<u64, _>(&counter_key(), |n| n + 1)?;
    Ok(())
  }

  fn server_error() -> GatewayError {
    GatewayError::Server {
      status: 500,
      message: "boom".to_string(),
    }
  }

  #[tokio::test]
  async fn test_optimistic_value_visible_before_settle() {
    let (cache, coordinator) = setup();
    cache.set(counter_key(), json!(1));

    let mut pending = coordinator
      .begin("increment", vec![counter_key()], increment)
      .await
      .unwrap();
    pending.mark_in_flight();

    assert_eq!(pending.phase(), MutationPhase::InFlight);
    assert_eq!(cache.get_data::<u64>(&counter_key()).unwrap(), Some(2));

    let result = pending.settle(Ok::<_, GatewayError>(()));
    assert!(result.is_ok());
    assert_eq!(cache.get_data::<u64>(&counter_key()).unwrap(), Some(2));
    assert!(cache.get(&counter_key()).unwrap().invalidated);
  }

  #[tokio::test]
  async fn test_failure_rolls_back_and_returns_error() {
    let (cache, coordinator) = setup();
    cache.set(counter_key(), json!(1));
    let before = cache.get(&counter_key()).unwrap();

    let result: Result<(), _> = coordinator
      .run("increment", vec![counter_key()], increment, async {
        Err(server_error())
      })
      .await;

    assert!(matches!(
      result,
      Err(MutationError::Gateway(GatewayError::Server { status: 500, .. }))
    ));
    assert_eq!(cache.get(&counter_key()).unwrap(), before);
  }

  #[tokio::test]
  async fn test_failed_transform_restores_partial_writes() {
    let (cache, coordinator) = setup();
    cache.set(counter_key(), json!(1));
    cache.set(QueryKey::root("counter").with("bad"), json!("text"));

    let result = coordinator
      .begin("bump_all", vec![counter_key()], |cache| {
        cache.update_data::<u64, _>(&counter_key(), |n| n + 1)?;
        cache.update_data::<u64, _>(&QueryKey::root("counter").with("bad"), |n| n + 1)?;
        Ok(())
      })
      .await;

    assert!(matches!(result, Err(MutationError::Cache(_))));
    assert_eq!(cache.get_data::<u64>(&counter_key()).unwrap(), Some(1));
  }

  #[tokio::test]
  async fn test_dropped_pending_mutation_rolls_back() {
    let (cache, coordinator) = setup();
    cache.set(counter_key(), json!(5));

    let pending = coordinator
      .begin("increment", vec![counter_key()], increment)
      .await
      .unwrap();
    assert_eq!(cache.get_data::<u64>(&counter_key()).unwrap(), Some(6));
    drop(pending);

    assert_eq!(cache.get_data::<u64>(&counter_key()).unwrap(), Some(5));
  }

  #[tokio::test]
  async fn test_rollback_restarts_fetch_cancelled_by_begin() {
    use std::sync::atomic::{AtomicU32, Ordering};

    let (cache, coordinator) = setup();
    let key = counter_key().with("total");
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let _observer = cache.observe(key.clone(), move || {
      let counter = counter.clone();
      async move {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
          tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
        Ok(json!(7))
      }
    });

    let result: Result<(), MutationError> = coordinator
      .run("increment", vec![counter_key()], increment, async {
        Err(server_error())
      })
      .await;
    assert!(result.is_err());

    let loaded = tokio::time::timeout(std::time::Duration::from_secs(2), async {
      loop {
        if cache.get_data::<u64>(&key).unwrap() == Some(7) {
          break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
      }
    })
    .await;

    assert!(loaded.is_ok(), "observed entry never loaded after rollback");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_serialized_mutations_wait_for_each_other() {
    let (cache, coordinator) = setup();
    cache.set(counter_key(), json!(0));

    let first = coordinator
      .begin("first", vec![counter_key()], increment)
      .await
      .unwrap();

    let second_coordinator = coordinator.clone();
    let second = tokio::spawn(async move {
      second_coordinator
        .run("second", vec![counter_key()], increment, async {
          Ok::<_, GatewayError>(())
        })
        .await
    });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    // Second mutation is queued behind the first
    assert_eq!(cache.get_data::<u64>(&counter_key()).unwrap(), Some(1));

    // First fails: its rollback cannot clobber the second's write
    let _ = first.settle(Err::<(), _>(server_error()));
    second.await.unwrap().unwrap();

    assert_eq!(cache.get_data::<u64>(&counter_key()).unwrap(), Some(1));
  }

  #[tokio::test]
  async fn test_unserialized_rollback_clobbers_later_write() {
    let (cache, coordinator) = setup();
    let coordinator = coordinator.with_serialization(false);
    cache.set(counter_key(), json!(0));

    let first = coordinator
      .begin("first", vec![counter_key()], increment)
      .await
      .unwrap();
    let second = coordinator
      .begin("second", vec![counter_key()], increment)
      .await
      .unwrap();
    assert_eq!(cache.get_data::<u64>(&counter_key()).unwrap(), Some(2));

    second.settle(Ok::<_, GatewayError>(())).unwrap();
    let _ = first.settle(Err::<(), _>(server_error()));

    // The first snapshot predates the second write
    assert_eq!(cache.get_data::<u64>(&counter_key()).unwrap(), Some(0));
  }
}
