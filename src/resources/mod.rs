//! Per-resource query keys and optimistic actions.
//!
//! Each resource pairs a gateway with the shared mutation coordinator. The
//! transforms are plain functions over the cache so they can be tested
//! without a server.

pub mod notifications;
pub mod reviews;

use color_eyre::Result;

use crate::config::Config;
use crate::gateway::{ApiTransport, NotificationsApi, ReviewsApi};
use crate::query::{MutationCoordinator, QueryCache};

pub use notifications::Notifications;
pub use reviews::Reviews;

/// Every resource, wired to one cache.
#[derive(Clone)]
pub struct Backend {
  pub notifications: Notifications,
  pub reviews: Reviews,
}

impl Backend {
  pub fn connect(config: &Config, token: Option<String>) -> Result<Self> {
    let transport = ApiTransport::new(&config.api.url, token, config.api.timeout())?;
    let cache = QueryCache::new(config.cache.stale_time()?);
    let mutations =
      MutationCoordinator::new(cache).with_serialization(config.cache.serialize_mutations);

    Ok(Self {
      notifications: Notifications::new(NotificationsApi::new(transport.clone()), mutations.clone()),
      reviews: Reviews::new(ReviewsApi::new(transport), mutations),
    })
  }
}
