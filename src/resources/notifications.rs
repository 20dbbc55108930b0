//! Notification queries and optimistic actions.

use tracing::debug;

use crate::gateway::types::{Notification, NotificationCategory, NotificationListParams};
use crate::gateway::NotificationsApi;
use crate::query::{
  CacheError, KeyPart, MutationCoordinator, MutationError, QueryCache, QueryKey, QueryObserver,
};

/// Query key factory for notifications.
pub mod keys {
  use super::*;

  pub fn all() -> QueryKey {
    QueryKey::root("notifications")
  }

  pub fn lists() -> QueryKey {
    all().with("list")
  }

  pub fn list(params: &NotificationListParams) -> QueryKey {
    let category = params.category.map(|c| c.as_str()).unwrap_or("all");
    lists().with(KeyPart::params([
      ("category", Some(category.to_string())),
      ("unreadOnly", Some(params.unread_only.to_string())),
      ("limit", params.limit.map(|l| l.to_string())),
    ]))
  }

  pub fn unread_count() -> QueryKey {
    all().with("unread-count")
  }

  pub fn detail(id: &str) -> QueryKey {
    all().with("detail").with(id)
  }
}

/// Set `is_read` on one notification everywhere it is cached and
/// decrement the unread count if it was unread.
pub fn apply_mark_read(cache: &QueryCache, id: &str) -> Result<(), CacheError> {
  let mut was_unread = false;
  let lists = keys::lists();

  cache.update_many::<Vec<Notification>, _, _>(
    |key| key.starts_with(&lists),
    |mut items| {
      for item in items.iter_mut().filter(|n| n.id == id) {
        was_unread |= !item.is_read;
        item.is_read = true;
      }
      items
    },
  )?;
  cache.update_data::<Notification, _>(&keys::detail(id), |mut item| {
    was_unread |= !item.is_read;
    item.is_read = true;
    item
  })?;

  if was_unread {
    cache.update_data::<u64, _>(&keys::unread_count(), |count| count.saturating_sub(1))?;
  }
  Ok(())
}

/// Mark every notification in `category` (or all of them) read.
///
/// The unread count goes to zero even for a scoped call, matching the backend
/// dashboard's behaviour; the invalidation on commit re-syncs it.
pub fn apply_mark_all_read(
  cache: &QueryCache,
  category: Option<NotificationCategory>,
) -> Result<(), CacheError> {
  let lists = keys::lists();
  let in_scope = |n: &Notification| category.map_or(true, |c| n.category == c);

  cache.update_many::<Vec<Notification>, _, _>(
    |key| key.starts_with(&lists),
    |mut items| {
      for item in items.iter_mut().filter(|n| in_scope(n)) {
        item.is_read = true;
      }
      items
    },
  )?;

  if category.is_some() {
    debug!("scoped mark-all-read resets the whole unread count");
  }
  cache.update_data::<u64, _>(&keys::unread_count(), |_| 0)?;
  Ok(())
}

/// Remove one notification from every cached list.
pub fn apply_delete(cache: &QueryCache, id: &str) -> Result<(), CacheError> {
  let mut was_unread = false;
  let lists = keys::lists();

  cache.update_many::<Vec<Notification>, _, _>(
    |key| key.starts_with(&lists),
    |mut items| {
      if let Some(pos) = items.iter().position(|n| n.id == id) {
        was_unread |= !items.remove(pos).is_read;
      }
      items
    },
  )?;

  if was_unread {
    cache.update_data::<u64, _>(&keys::unread_count(), |count| count.saturating_sub(1))?;
  }
  Ok(())
}

/// Notification feed backed by the shared query cache.
#[derive(Clone)]
pub struct Notifications {
  api: NotificationsApi,
  mutations: MutationCoordinator,
}

impl Notifications {
  pub fn new(api: NotificationsApi, mutations: MutationCoordinator) -> Self {
    Self { api, mutations }
  }

  pub fn cache(&self) -> &QueryCache {
    self.mutations.cache()
  }

  /// Keep a notification list fetched while the observer lives.
  pub fn observe_list(&self, params: NotificationListParams) -> QueryObserver {
    let api = self.api.clone();
    self.cache().observe(keys::list(&params), move || {
      let api = api.clone();
      let params = params.clone();
      async move {
        let items = api.list(&params).await.map_err(|e| e.to_string())?;
        serde_json::to_value(items).map_err(|e| e.to_string())
      }
    })
  }

  pub fn observe_unread_count(&self) -> QueryObserver {
    let api = self.api.clone();
    self.cache().observe(keys::unread_count(), move || {
      let api = api.clone();
      async move {
        let count = api.unread_count().await.map_err(|e| e.to_string())?;
        Ok(serde_json::Value::from(count))
      }
    })
  }

  pub fn observe_detail(&self, id: &str) -> QueryObserver {
    let api = self.api.clone();
    let id = id.to_string();
    self.cache().observe(keys::detail(&id), move || {
      let api = api.clone();
      let id = id.clone();
      async move {
        let item = api.get(&id).await.map_err(|e| e.to_string())?;
        serde_json::to_value(item).map_err(|e| e.to_string())
      }
    })
  }

  /// Cached list for `params`, empty if not fetched yet.
  pub fn cached_list(&self, params: &NotificationListParams) -> Result<Vec<Notification>, CacheError> {
    Ok(self.cache().get_data(&keys::list(params))?.unwrap_or_default())
  }

  pub fn cached_unread_count(&self) -> Result<Option<u64>, CacheError> {
    self.cache().get_data(&keys::unread_count())
  }

  pub async fn mark_read(&self, id: &str) -> Result<Notification, MutationError> {
    self
      .mutations
      .run(
        "mark_notification_read",
        vec![keys::all()],
        |cache| apply_mark_read(cache, id),
        self.api.mark_read(id),
      )
      .await
  }

  pub async fn mark_all_read(&self, category: Option<NotificationCategory>) -> Result<(), MutationError> {
    self
      .mutations
      .run(
        "mark_all_notifications_read",
        vec![keys::all()],
        |cache| apply_mark_all_read(cache, category),
        self.api.mark_all_read(category),
      )
      .await
  }

  pub async fn delete(&self, id: &str) -> Result<(), MutationError> {
    self
      .mutations
      .run(
        "delete_notification",
        vec![keys::all()],
        |cache| apply_delete(cache, id),
        self.api.delete(id),
      )
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gateway::{ApiTransport, GatewayError};
  use crate::query::{CacheEventKind, MutationPhase};
  use chrono::Duration;
  use httpmock::Method::{DELETE, GET, PATCH};
  use httpmock::MockServer;
  use serde_json::json;

  fn notification(id: &str, category: NotificationCategory, is_read: bool) -> Notification {
    Notification {
      id: id.to_string(),
      title: format!("notification {}", id),
      message: String::new(),
      category,
      is_read,
      link: None,
      created_at: None,
    }
  }

  fn all_params() -> NotificationListParams {
    NotificationListParams::default()
  }

  fn order_params() -> NotificationListParams {
    NotificationListParams {
      category: Some(NotificationCategory::Order),
      ..Default::default()
    }
  }

  /// Two overlapping cached lists and an unread count of 3.
  fn seeded_cache() -> QueryCache {
    let cache = QueryCache::new(Duration::seconds(30));
    cache
      .set_data(
        keys::list(&all_params()),
        &vec![
          notification("1", NotificationCategory::Order, false),
          notification("2", NotificationCategory::Review, false),
          notification("3", NotificationCategory::Order, false),
          notification("4", NotificationCategory::System, true),
        ],
      )
      .unwrap();
    cache
      .set_data(
        keys::list(&order_params()),
        &vec![
          notification("1", NotificationCategory::Order, false),
          notification("3", NotificationCategory::Order, false),
        ],
      )
      .unwrap();
    cache.set_data(keys::unread_count(), &3u64).unwrap();
    cache
  }

  fn list(cache: &QueryCache, params: &NotificationListParams) -> Vec<Notification> {
    cache.get_data(&keys::list(params)).unwrap().unwrap()
  }

  fn count(cache: &QueryCache) -> u64 {
    cache.get_data(&keys::unread_count()).unwrap().unwrap()
  }

  fn ids(items: &[Notification]) -> Vec<&str> {
    items.iter().map(|n| n.id.as_str()).collect()
  }

  fn notifications(server: &MockServer, cache: &QueryCache) -> Notifications {
    let transport = ApiTransport::new(&server.base_url(), None, std::time::Duration::from_secs(5)).unwrap();
    Notifications::new(
      NotificationsApi::new(transport),
      MutationCoordinator::new(cache.clone()),
    )
  }

  #[test]
  fn test_list_key_is_structural() {
    let a = keys::list(&order_params());
    let b = keys::list(&NotificationListParams {
      category: Some(NotificationCategory::Order),
      unread_only: false,
      limit: None,
    });
    assert_eq!(a, b);
    assert_ne!(a, keys::list(&all_params()));
    assert!(a.starts_with(&keys::lists()));
  }

  #[test]
  fn test_mark_read_updates_every_list() {
    let cache = seeded_cache();
    apply_mark_read(&cache, "1").unwrap();

    assert!(list(&cache, &all_params())[0].is_read);
    assert!(list(&cache, &order_params())[0].is_read);
    assert!(!list(&cache, &order_params())[1].is_read);
    assert_eq!(count(&cache), 2);
  }

  #[test]
  fn test_mark_read_twice_decrements_once() {
    let cache = seeded_cache();
    apply_mark_read(&cache, "1").unwrap();
    apply_mark_read(&cache, "1").unwrap();
    assert_eq!(count(&cache), 2);
  }

  #[test]
  fn test_unread_count_never_negative() {
    let cache = seeded_cache();
    cache.set_data(keys::unread_count(), &0u64).unwrap();

    apply_mark_read(&cache, "1").unwrap();
    apply_delete(&cache, "2").unwrap();
    apply_delete(&cache, "3").unwrap();

    assert_eq!(count(&cache), 0);
  }

  #[test]
  fn test_mark_all_read_scoped_and_unscoped() {
    let cache = seeded_cache();
    apply_mark_all_read(&cache, Some(NotificationCategory::Order)).unwrap();

    let all = list(&cache, &all_params());
    assert!(all[0].is_read && all[2].is_read);
    assert!(!all[1].is_read);
    // Reset to zero even though a review notification is still unread
    assert_eq!(count(&cache), 0);

    apply_mark_all_read(&cache, None).unwrap();
    assert!(list(&cache, &all_params()).iter().all(|n| n.is_read));
  }

  #[test]
  fn test_mark_all_read_is_idempotent() {
    let cache = seeded_cache();
    apply_mark_all_read(&cache, None).unwrap();
    let first = (list(&cache, &all_params()), list(&cache, &order_params()), count(&cache));

    apply_mark_all_read(&cache, None).unwrap();
    let second = (list(&cache, &all_params()), list(&cache, &order_params()), count(&cache));

    assert_eq!(first, second);
    assert_eq!(second.2, 0);
  }

  #[test]
  fn test_delete_removes_from_every_list() {
    let cache = seeded_cache();
    apply_delete(&cache, "3").unwrap();

    assert_eq!(ids(&list(&cache, &all_params())), vec!["1", "2", "4"]);
    assert_eq!(ids(&list(&cache, &order_params())), vec!["1"]);
    assert_eq!(count(&cache), 2);

    // Deleting a read notification leaves the count alone
    apply_delete(&cache, "4").unwrap();
    assert_eq!(count(&cache), 2);
  }

  #[tokio::test]
  async fn test_delete_rollback_restores_position() {
    let cache = QueryCache::new(Duration::seconds(30));
    cache
      .set_data(
        keys::list(&all_params()),
        &vec![
          notification("A", NotificationCategory::Order, false),
          notification("B", NotificationCategory::Order, false),
          notification("C", NotificationCategory::Order, false),
        ],
      )
      .unwrap();
    let coordinator = MutationCoordinator::new(cache.clone());

    let mut pending = coordinator
      .begin("delete_notification", vec![keys::all()], |cache| {
        apply_delete(cache, "B")
      })
      .await
      .unwrap();
    pending.mark_in_flight();
    assert_eq!(pending.phase(), MutationPhase::InFlight);
    assert_eq!(ids(&list(&cache, &all_params())), vec!["A", "C"]);

    let result = pending.settle(Err::<(), _>(GatewayError::Server {
      status: 500,
      message: "boom".to_string(),
    }));

    assert!(result.is_err());
    assert_eq!(ids(&list(&cache, &all_params())), vec!["A", "B", "C"]);
  }

  #[tokio::test]
  async fn test_failed_mark_read_rolls_back_every_key() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(PATCH).path("/notifications/1/read");
        then.status(500).json_body(json!({ "message": "boom" }));
      })
      .await;

    let cache = seeded_cache();
    let keys_before: Vec<_> = cache.keys();
    let before: Vec<_> = keys_before.iter().map(|k| cache.get(k).unwrap().data).collect();

    let err = notifications(&server, &cache)
      .mark_read("1")
      .await
      .unwrap_err();

    assert!(matches!(err, MutationError::Gateway(GatewayError::Server { status: 500, .. })));
    let after: Vec<_> = keys_before.iter().map(|k| cache.get(k).unwrap().data).collect();
    assert_eq!(before, after);
  }

  #[tokio::test]
  async fn test_mark_read_reaches_cached_detail() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/notifications/7");
        then
          .status(200)
          .json_body(json!({ "data": { "id": 7, "isRead": false } }));
      })
      .await;
    server
      .mock_async(|when, then| {
        when.method(PATCH).path("/notifications/7/read");
        then.status(500).json_body(json!({ "message": "boom" }));
      })
      .await;

    let cache = QueryCache::new(Duration::seconds(30));
    cache.set_data(keys::unread_count(), &1u64).unwrap();
    let feed = notifications(&server, &cache);
    let mut observer = feed.observe_detail("7");
    observer.ready().await;

    apply_mark_read(&cache, "7").unwrap();
    let detail: Notification = cache.get_data(&keys::detail("7")).unwrap().unwrap();
    assert!(detail.is_read);
    assert_eq!(count(&cache), 0);

    // Back to the fetched state, then a failing remote call
    cache.set_data(keys::unread_count(), &1u64).unwrap();
    cache
      .set_data(keys::detail("7"), &Notification { is_read: false, ..detail })
      .unwrap();
    assert!(feed.mark_read("7").await.is_err());

    let detail: Notification = observer.data().unwrap().unwrap();
    assert!(!detail.is_read);
    assert_eq!(count(&cache), 1);
  }

  #[tokio::test]
  async fn test_concurrent_mark_read_both_commit() {
    let server = MockServer::start_async().await;
    for id in ["1", "2"] {
      server
        .mock_async(move |when, then| {
          when.method(PATCH).path(format!("/notifications/{}/read", id));
          then
            .status(200)
            .delay(std::time::Duration::from_millis(20))
            .json_body(json!({ "data": { "id": id, "isRead": true } }));
        })
        .await;
    }

    let cache = QueryCache::new(Duration::seconds(30));
    cache
      .set_data(
        keys::list(&all_params()),
        &vec![
          notification("1", NotificationCategory::Order, false),
          notification("2", NotificationCategory::Order, false),
        ],
      )
      .unwrap();
    cache.set_data(keys::unread_count(), &2u64).unwrap();

    let feed = notifications(&server, &cache);
    let (first, second) = tokio::join!(feed.mark_read("1"), feed.mark_read("2"));
    first.unwrap();
    second.unwrap();

    assert_eq!(count(&cache), 0);
    assert!(list(&cache, &all_params()).iter().all(|n| n.is_read));
  }

  #[tokio::test]
  async fn test_commit_refetches_observed_list() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(DELETE).path("/notifications/2");
        then.status(200).json_body(json!({}));
      })
      .await;
    let list_mock = server
      .mock_async(|when, then| {
        when.method(GET).path("/notifications");
        then
          .status(200)
          .json_body(json!({ "data": [{ "id": 1, "isRead": false }] }));
      })
      .await;

    let cache = QueryCache::new(Duration::seconds(30));
    let feed = notifications(&server, &cache);
    let mut observer = feed.observe_list(all_params());
    observer.ready().await;
    assert_eq!(ids(&feed.cached_list(&all_params()).unwrap()), vec!["1"]);

    let mut events = cache.subscribe(keys::lists());
    feed.delete("2").await.unwrap();

    // Wait for the background refetch triggered by the commit
    let refetched = async {
      let mut invalidated = false;
      while let Some(event) = events.next().await {
        match event.kind {
          CacheEventKind::Invalidated => invalidated = true,
          CacheEventKind::Updated if invalidated => break,
          _ => {}
        }
      }
    };
    tokio::time::timeout(std::time::Duration::from_secs(5), refetched)
      .await
      .unwrap();

    assert!(!cache.get(&keys::list(&all_params())).unwrap().invalidated);
    list_mock.assert_hits_async(2).await;
  }
}
