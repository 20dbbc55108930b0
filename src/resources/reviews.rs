//! Cake review queries and optimistic actions.

use chrono::Utc;

use crate::gateway::types::{Review, ReviewDraft, ReviewPage};
use crate::gateway::ReviewsApi;
use crate::query::{
  CacheError, KeyPart, MutationCoordinator, MutationError, QueryCache, QueryKey, QueryObserver,
};

/// Query key factory for reviews.
pub mod keys {
  use super::*;

  pub fn all() -> QueryKey {
    QueryKey::root("reviews")
  }

  /// Every cached page for one cake.
  pub fn cake(cake_id: &str) -> QueryKey {
    all().with("cake").with(cake_id)
  }

  pub fn page(cake_id: &str, page: u32, limit: u32) -> QueryKey {
    cake(cake_id).with(KeyPart::params([("page", Some(page)), ("limit", Some(limit))]))
  }

  pub fn detail(id: &str) -> QueryKey {
    all().with("detail").with(id)
  }
}

fn is_page(key: &QueryKey) -> bool {
  key.starts_with(&keys::all().with("cake"))
}

/// Update one review in place wherever it is cached, keeping its position.
fn update_review<F>(cache: &QueryCache, id: &str, mut edit: F) -> Result<(), CacheError>
where
  F: FnMut(&mut Review),
{
  cache.update_many::<ReviewPage, _, _>(is_page, |mut page| {
    for review in page.reviews.iter_mut().filter(|r| r.id == id) {
      edit(review);
    }
    page
  })?;
  cache.update_data::<Review, _>(&keys::detail(id), |mut review| {
    edit(&mut review);
    review
  })?;
  Ok(())
}

pub fn apply_update(cache: &QueryCache, id: &str, draft: &ReviewDraft) -> Result<(), CacheError> {
  let now = Utc::now();
  update_review(cache, id, |review| {
    review.rating = draft.rating;
    review.comment = draft.comment.clone();
    review.updated_at = Some(now);
  })
}

pub fn apply_mark_helpful(cache: &QueryCache, id: &str) -> Result<(), CacheError> {
  update_review(cache, id, |review| {
    review.helpful_count = review.helpful_count.saturating_add(1);
  })
}

/// Remove a review from every cached page and shrink that page's total.
pub fn apply_delete(cache: &QueryCache, id: &str) -> Result<(), CacheError> {
  cache.update_many::<ReviewPage, _, _>(is_page, |mut page| {
    if let Some(pos) = page.reviews.iter().position(|r| r.id == id) {
      page.reviews.remove(pos);
      page.pagination.total = page.pagination.total.saturating_sub(1);
    }
    page
  })?;
  Ok(())
}

/// Cake reviews backed by the shared query cache.
#[derive(Clone)]
pub struct Reviews {
  api: ReviewsApi,
  mutations: MutationCoordinator,
}

impl Reviews {
  pub fn new(api: ReviewsApi, mutations: MutationCoordinator) -> Self {
    Self { api, mutations }
  }

  pub fn cache(&self) -> &QueryCache {
    self.mutations.cache()
  }

  pub fn observe_page(&self, cake_id: &str, page: u32, limit: u32) -> QueryObserver {
    let api = self.api.clone();
    let cake = cake_id.to_string();
    self
      .cache()
      .observe(keys::page(cake_id, page, limit), move || {
        let api = api.clone();
        let cake = cake.clone();
        async move {
          let page = api.list(&cake, page, limit).await.map_err(|e| e.to_string())?;
          serde_json::to_value(page).map_err(|e| e.to_string())
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
        let review = api.get(&id).await.map_err(|e| e.to_string())?;
        serde_json::to_value(review).map_err(|e| e.to_string())
      }
    })
  }

  pub fn cached_page(&self, cake_id: &str, page: u32, limit: u32) -> Result<Option<ReviewPage>, CacheError> {
    self.cache().get_data(&keys::page(cake_id, page, limit))
  }

  /// Not optimistic: the new review's id and position come from the server.
  pub async fn create(&self, cake_id: &str, draft: &ReviewDraft) -> Result<Review, MutationError> {
    self
      .mutations
      .run(
        "create_review",
        vec![keys::cake(cake_id)],
        |_| Ok(()),
        self.api.create(cake_id, draft),
      )
      .await
  }

  pub async fn update(&self, id: &str, draft: &ReviewDraft) -> Result<Review, MutationError> {
    self
      .mutations
      .run(
        "update_review",
        vec![keys::all()],
        |cache| apply_update(cache, id, draft),
        self.api.update(id, draft),
      )
      .await
  }

  pub async fn delete(&self, id: &str) -> Result<(), MutationError> {
    self
      .mutations
      .run(
        "delete_review",
        vec![keys::all()],
        |cache| apply_delete(cache, id),
        self.api.delete(id),
      )
      .await
  }

  pub async fn mark_helpful(&self, id: &str) -> Result<u32, MutationError> {
    self
      .mutations
      .run(
        "mark_review_helpful",
        vec![keys::all()],
        |cache| apply_mark_helpful(cache, id),
        self.api.mark_helpful(id),
      )
      .await
  }
}
