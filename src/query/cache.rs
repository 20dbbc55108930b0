//! Process-wide query cache.
//!
//! Values are kept as JSON so one store serves every resource. Typed access goes
//! through serde. Every mutating call runs under a single write lock, so a
//! subscriber never sees a half-applied update.

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::key::QueryKey;

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  Idle,
  Loading,
  Success,
  Error,
}

/// The stored value and freshness metadata for one query key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  /// Last known value, absent until the first fetch or write
  pub data: Option<Value>,
  pub status: QueryStatus,
  /// When `data` was last replaced
  pub updated_at: Option<DateTime<Utc>>,
  pub stale_time: Duration,
  /// Set by `invalidate`, cleared by the next write
  pub invalidated: bool,
  /// Message from the last failed fetch
  pub error: Option<String>,
}

impl CacheEntry {
  fn new(stale_time: Duration) -> Self {
    Self {
      data: None,
      status: QueryStatus::Idle,
      updated_at: None,
      stale_time,
      invalidated: false,
      error: None,
    }
  }

  pub fn is_stale(&self) -> bool {
    self.is_stale_at(Utc::now())
  }

  pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
    if self.invalidated {
      return true;
    }
    match self.updated_at {
      Some(updated_at) => now - updated_at > self.stale_time,
      None => true,
    }
  }

  fn replace_data(&mut self, value: Value) {
    self.data = Some(value);
    self.status = QueryStatus::Success;
    self.updated_at = Some(Utc::now());
    self.invalidated = false;
    self.error = None;
  }

  /// Status to fall back to when a pending fetch is abandoned.
  fn settled_status(&self) -> QueryStatus {
    if self.error.is_some() {
      QueryStatus::Error
    } else if self.data.is_some() {
      QueryStatus::Success
    } else {
      QueryStatus::Idle
    }
  }
}

/// Errors from typed cache access.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("cached data for {key} has an unexpected shape: {source}")]
  Decode {
    key: QueryKey,
    #[source]
    source: serde_json::Error,
  },
  #[error("failed to serialize data for {key}: {source}")]
  Encode {
    key: QueryKey,
    #[source]
    source: serde_json::Error,
  },
}

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
  Updated,
  Invalidated,
  Fetching,
  Failed,
  Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
  pub key: QueryKey,
  pub kind: CacheEventKind,
}

/// Result of a remote fetch, with the error already rendered for display.
pub type FetchResult = Result<Value, String>;

/// A factory producing one fetch future per call.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;

struct Slot {
  entry: CacheEntry,
  /// Bumped whenever a fetch starts or is cancelled; older responses are dropped
  generation: u64,
  in_flight: bool,
  observers: usize,
  fetcher: Option<Fetcher>,
}

impl Slot {
  fn new(stale_time: Duration) -> Self {
    Self {
      entry: CacheEntry::new(stale_time),
      generation: 0,
      in_flight: false,
      observers: 0,
      fetcher: None,
    }
  }
}

/// Pre-mutation cache state, replayed verbatim on rollback.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
  entries: Vec<(QueryKey, Option<CacheEntry>)>,
}

impl Snapshot {
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Outcome of an invalidation: which keys were marked and the refetches started.
pub struct Invalidation {
  pub keys: Vec<QueryKey>,
  refetches: Vec<JoinHandle<()>>,
}

impl Invalidation {
  pub fn empty() -> Self {
    Self {
      keys: Vec::new(),
      refetches: Vec::new(),
    }
  }

  pub fn merge(&mut self, other: Invalidation) {
    self.keys.extend(other.keys);
    self.refetches.extend(other.refetches);
  }

  pub fn refetch_count(&self) -> usize {
    self.refetches.len()
  }

  /// Wait for every background refetch to land in the cache.
  pub async fn settled(self) {
    for handle in self.refetches {
      if let Err(e) = handle.await {
        warn!("refetch task failed: {}", e);
      }
    }
  }
}

struct Inner {
  slots: RwLock<BTreeMap<QueryKey, Slot>>,
  events: broadcast::Sender<CacheEvent>,
  stale_time: Duration,
}

/// Shared handle to the query cache. Clones refer to the same store.
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<Inner>,
}

impl QueryCache {
  pub fn new(stale_time: Duration) -> Self {
    let (events, _) = broadcast::channel(256);
    Self {
      inner: Arc::new(Inner {
        slots: RwLock::new(BTreeMap::new()),
        events,
        stale_time,
      }),
    }
  }

  fn read(&self) -> RwLockReadGuard<'_, BTreeMap<QueryKey, Slot>> {
    self.inner.slots.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<QueryKey, Slot>> {
    self
      .inner
      .slots
      .write()
      .unwrap_or_else(PoisonError::into_inner)
  }

  fn emit(&self, key: &QueryKey, kind: CacheEventKind) {
    // No receivers is fine
    let _ = self.inner.events.send(CacheEvent {
      key: key.clone(),
      kind,
    });
  }

  /// Read an entry without side effects.
  pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
    self.read().get(key).map(|slot| slot.entry.clone())
  }

  /// Read and decode an entry's data.
  pub fn get_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>, CacheError> {
    let data = self.read().get(key).and_then(|slot| slot.entry.data.clone());
    data
      .map(|value| {
        serde_json::from_value(value).map_err(|source| CacheError::Decode {
          key: key.clone(),
          source,
        })
      })
      .transpose()
  }

  /// Replace an entry's data, creating the entry if needed.
  pub fn set(&self, key: QueryKey, value: Value) {
    {
      let mut slots = self.write();
      let stale_time = self.inner.stale_time;
      let slot = slots
        .entry(key.clone())
        .or_insert_with(|| Slot::new(stale_time));
      slot.entry.replace_data(value);
    }
    debug!("cache set {}", key);
    self.emit(&key, CacheEventKind::Updated);
  }

  pub fn set_data<T: Serialize>(&self, key: QueryKey, data: &T) -> Result<(), CacheError> {
    let value = serde_json::to_value(data).map_err(|source| CacheError::Encode {
      key: key.clone(),
      source,
    })?;
    self.set(key, value);
    Ok(())
  }

  /// Apply `updater` to every entry that matches `predicate` and holds data.
  ///
  /// All or nothing: if any updater call fails, no entry is changed.
  /// Returns the keys that were updated.
  pub fn set_many<P, F>(&self, predicate: P, mut updater: F) -> Result<Vec<QueryKey>, CacheError>
  where
    P: Fn(&QueryKey) -> bool,
    F: FnMut(&QueryKey, &Value) -> Result<Value, CacheError>,
  {
    let updated = {
      let mut slots = self.write();

      let mut staged = Vec::new();
      for (key, slot) in slots.iter() {
        if !predicate(key) {
          continue;
        }
        if let Some(current) = &slot.entry.data {
          staged.push((key.clone(), updater(key, current)?));
        }
      }

      let mut updated = Vec::with_capacity(staged.len());
      for (key, value) in staged {
        if let Some(slot) = slots.get_mut(&key) {
          slot.entry.replace_data(value);
          updated.push(key);
        }
      }
      updated
    };

    for key in &updated {
      self.emit(key, CacheEventKind::Updated);
    }
    Ok(updated)
  }

  /// Typed form of [`set_many`](Self::set_many).
  pub fn update_many<T, P, F>(&self, predicate: P, mut updater: F) -> Result<Vec<QueryKey>, CacheError>
  where
    T: Serialize + DeserializeOwned,
    P: Fn(&QueryKey) -> bool,
    F: FnMut(T) -> T,
  {
    self.set_many(predicate, |key, current| {
      let typed: T = serde_json::from_value(current.clone()).map_err(|source| CacheError::Decode {
        key: key.clone(),
        source,
      })?;
      serde_json::to_value(updater(typed)).map_err(|source| CacheError::Encode {
        key: key.clone(),
        source,
      })
    })
  }

  /// Update a single entry if it holds data. Returns whether it did.
  pub fn update_data<T, F>(&self, key: &QueryKey, updater: F) -> Result<bool, CacheError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(T) -> T,
  {
    let mut updater = Some(updater);
    let updated = self.update_many::<T, _, _>(
      |k| k == key,
      |data| match updater.take() {
        Some(f) => f(data),
        None => data,
      },
    )?;
    Ok(!updated.is_empty())
  }

  /// Mark every entry under `prefix` stale and refetch the ones being observed.
  ///
  /// Existing data stays visible until the refetch lands.
  pub fn invalidate(&self, prefix: &QueryKey) -> Invalidation {
    let (keys, observed) = {
      let mut slots = self.write();
      let mut keys = Vec::new();
      let mut observed = Vec::new();
      for (key, slot) in slots
        .range_mut(prefix.clone()..)
        .take_while(|(k, _)| k.starts_with(prefix))
      {
        slot.entry.invalidated = true;
        keys.push(key.clone());
        if slot.observers > 0 && slot.fetcher.is_some() {
          observed.push(key.clone());
        }
      }
      (keys, observed)
    };

    debug!(
      "invalidated {} ({} entries, {} observed)",
      prefix,
      keys.len(),
      observed.len()
    );
    for key in &keys {
      self.emit(key, CacheEventKind::Invalidated);
    }

    let refetches = observed
      .iter()
      .filter_map(|key| self.start_fetch(key, true))
      .collect();

    Invalidation { keys, refetches }
  }

  /// Make pending fetches under `prefix` unable to overwrite their entries.
  ///
  /// The network requests keep running; their responses are dropped on arrival.
  /// Returns the keys whose fetches were cancelled.
  pub fn cancel_in_flight(&self, prefix: &QueryKey) -> Vec<QueryKey> {
    let mut slots = self.write();
    let mut cancelled = Vec::new();
    for (key, slot) in slots
      .range_mut(prefix.clone()..)
      .take_while(|(k, _)| k.starts_with(prefix))
    {
      if slot.in_flight {
        slot.generation += 1;
        slot.in_flight = false;
        slot.entry.status = slot.entry.settled_status();
        cancelled.push(key.clone());
        debug!("cancelled in-flight fetch for {}", key);
      }
    }
    cancelled
  }

  /// Start a fresh fetch for each of `keys` that still has an observer.
  pub fn refetch_observed(&self, keys: &[QueryKey]) -> Vec<JoinHandle<()>> {
    let observed: Vec<QueryKey> = {
      let slots = self.read();
      keys
        .iter()
        .filter(|key| {
          slots
            .get(*key)
            .is_some_and(|slot| slot.observers > 0 && slot.fetcher.is_some())
        })
        .cloned()
        .collect()
    };
    observed
      .iter()
      .filter_map(|key| self.fetch(key))
      .collect()
  }

  /// Register interest in `key`, fetching it if it is missing or stale.
  ///
  /// The fetcher stays registered for later refetches. The key counts as
  /// observed until the returned [`QueryObserver`] is dropped.
  pub fn observe<F, Fut>(&self, key: QueryKey, fetcher: F) -> QueryObserver
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult> + Send + 'static,
  {
    let fetcher: Fetcher = Arc::new(move || fetcher().boxed());
    let subscription = self.subscribe(key.clone());

    let needs_fetch = {
      let mut slots = self.write();
      let stale_time = self.inner.stale_time;
      let slot = slots
        .entry(key.clone())
        .or_insert_with(|| Slot::new(stale_time));
      slot.observers += 1;
      slot.fetcher = Some(fetcher);
      !slot.in_flight && (slot.entry.data.is_none() || slot.entry.is_stale())
    };

    let pending = if needs_fetch {
      self.start_fetch(&key, false)
    } else {
      None
    };

    QueryObserver {
      cache: self.clone(),
      key,
      subscription,
      pending,
    }
  }

  /// Fetch `key` with its registered fetcher, replacing any fetch in progress.
  pub fn fetch(&self, key: &QueryKey) -> Option<JoinHandle<()>> {
    self.start_fetch(key, true)
  }

  fn start_fetch(&self, key: &QueryKey, force: bool) -> Option<JoinHandle<()>> {
    let (fetcher, generation) = {
      let mut slots = self.write();
      let slot = slots.get_mut(key)?;
      if slot.in_flight && !force {
        return None;
      }
      let fetcher = slot.fetcher.clone()?;
      slot.generation += 1;
      slot.in_flight = true;
      slot.entry.status = QueryStatus::Loading;
      (fetcher, slot.generation)
    };

    debug!("fetching {}", key);
    self.emit(key, CacheEventKind::Fetching);

    let cache = self.clone();
    let key = key.clone();
    Some(tokio::spawn(async move {
      let result = fetcher().await;
      cache.complete_fetch(&key, generation, result);
    }))
  }

  fn complete_fetch(&self, key: &QueryKey, generation: u64, result: FetchResult) {
    let kind = {
      let mut slots = self.write();
      let Some(slot) = slots.get_mut(key) else {
        return;
      };
      if slot.generation != generation {
        warn!("discarding superseded response for {}", key);
        return;
      }
      slot.in_flight = false;
      match result {
        Ok(value) => {
          slot.entry.replace_data(value);
          CacheEventKind::Updated
        }
        Err(e) => {
          warn!("fetch for {} failed: {}", key, e);
          slot.entry.status = QueryStatus::Error;
          slot.entry.error = Some(e);
          CacheEventKind::Failed
        }
      }
    };
    self.emit(key, kind);
  }

  fn release(&self, key: &QueryKey) {
    if let Some(slot) = self.write().get_mut(key) {
      slot.observers = slot.observers.saturating_sub(1);
    }
  }

  /// Receive events for every key under `prefix`.
  pub fn subscribe(&self, prefix: QueryKey) -> CacheSubscription {
    CacheSubscription {
      prefix,
      rx: self.inner.events.subscribe(),
    }
  }

  /// Capture every entry whose key matches `predicate`.
  pub fn snapshot<P>(&self, predicate: P) -> Snapshot
  where
    P: Fn(&QueryKey) -> bool,
  {
    let entries = self
      .read()
      .iter()
      .filter(|(key, _)| predicate(key))
      .map(|(key, slot)| (key.clone(), Some(slot.entry.clone())))
      .collect();
    Snapshot { entries }
  }

  /// Capture specific keys, recording the ones that do not exist yet.
  pub fn snapshot_keys(&self, keys: &[QueryKey]) -> Snapshot {
    let slots = self.read();
    let entries = keys
      .iter()
      .map(|key| (key.clone(), slots.get(key).map(|slot| slot.entry.clone())))
      .collect();
    Snapshot { entries }
  }

  /// Put every captured entry back exactly as it was.
  pub fn restore(&self, snapshot: Snapshot) {
    let keys: Vec<QueryKey> = {
      let mut slots = self.write();
      let stale_time = self.inner.stale_time;
      snapshot
        .entries
        .into_iter()
        .map(|(key, prior)| {
          match prior {
            Some(entry) => {
              slots
                .entry(key.clone())
                .or_insert_with(|| Slot::new(stale_time))
                .entry = entry;
            }
            None => {
              let keep = slots
                .get(&key)
                .is_some_and(|slot| slot.observers > 0 || slot.fetcher.is_some());
              if keep {
                if let Some(slot) = slots.get_mut(&key) {
                  slot.entry = CacheEntry::new(stale_time);
                }
              } else {
                slots.remove(&key);
              }
            }
          }
          key
        })
        .collect()
    };

    for key in &keys {
      self.emit(key, CacheEventKind::Updated);
    }
  }

  pub fn remove(&self, key: &QueryKey) -> Option<CacheEntry> {
    let removed = self.write().remove(key).map(|slot| slot.entry);
    if removed.is_some() {
      self.emit(key, CacheEventKind::Removed);
    }
    removed
  }

  pub fn clear(&self) {
    let keys: Vec<QueryKey> = std::mem::take(&mut *self.write()).into_keys().collect();
    for key in &keys {
      self.emit(key, CacheEventKind::Removed);
    }
  }

  pub fn keys(&self) -> Vec<QueryKey> {
    self.read().keys().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().is_empty()
  }
}

/// Event stream filtered to one key prefix.
pub struct CacheSubscription {
  prefix: QueryKey,
  rx: broadcast::Receiver<CacheEvent>,
}

impl CacheSubscription {
  /// Wait for the next matching event. `None` once the cache is gone.
  pub async fn next(&mut self) -> Option<CacheEvent> {
    loop {
      match self.rx.recv().await {
        Ok(event) if event.key.starts_with(&self.prefix) => return Some(event),
        Ok(_) => continue,
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
          warn!("subscriber for {} lagged by {} events", self.prefix, skipped);
        }
        Err(broadcast::error::RecvError::Closed) => return None,
      }
    }
  }

  /// Take the next matching event if one is already queued.
  pub fn try_next(&mut self) -> Option<CacheEvent> {
    loop {
      match self.rx.try_recv() {
        Ok(event) if event.key.starts_with(&self.prefix) => return Some(event),
        Ok(_) => continue,
        Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
          warn!("subscriber for {} lagged by {} events", self.prefix, skipped);
        }
        Err(_) => return None,
      }
    }
  }

  /// Drain queued events, returning how many matched.
  pub fn drain(&mut self) -> usize {
    let mut count = 0;
    while self.try_next().is_some() {
      count += 1;
    }
    count
  }
}

/// An active query. Keeps its key observed, so invalidation refetches it.
pub struct QueryObserver {
  cache: QueryCache,
  key: QueryKey,
  subscription: CacheSubscription,
  pending: Option<JoinHandle<()>>,
}

impl QueryObserver {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn entry(&self) -> Option<CacheEntry> {
    self.cache.get(&self.key)
  }

  pub fn status(&self) -> QueryStatus {
    self
      .entry()
      .map(|entry| entry.status)
      .unwrap_or(QueryStatus::Idle)
  }

  pub fn is_loading(&self) -> bool {
    self.status() == QueryStatus::Loading
  }

  pub fn error(&self) -> Option<String> {
    self.entry().and_then(|entry| entry.error)
  }

  pub fn data<T: DeserializeOwned>(&self) -> Result<Option<T>, CacheError> {
    self.cache.get_data(&self.key)
  }

  /// Force a refetch, superseding any fetch in progress.
  pub fn refetch(&mut self) {
    self.pending = self.cache.fetch(&self.key);
  }

  /// Wait for the fetch started by `observe` or `refetch`, if any.
  pub async fn ready(&mut self) {
    if let Some(handle) = self.pending.take() {
      if let Err(e) = handle.await {
        warn!("fetch task for {} failed: {}", self.key, e);
      }
    }
  }

  /// Returns `true` if the entry changed since the last poll.
  /// Call this from the UI tick handler.
  pub fn poll(&mut self) -> bool {
    self.subscription.drain() > 0
  }
}

impl Drop for QueryObserver {
  fn drop(&mut self) {
    self.cache.release(&self.key);
  }
}
