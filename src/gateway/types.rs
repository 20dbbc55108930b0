//! Domain types exchanged with the SweetNest API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accept ids sent as either JSON strings or numbers.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawId {
    Str(String),
    Num(i64),
  }

  Ok(match RawId::deserialize(deserializer)? {
    RawId::Str(s) => s,
    RawId::Num(n) => n.to_string(),
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
  #[serde(alias = "orders")]
  Order,
  #[serde(alias = "reviews")]
  Review,
  #[serde(alias = "promotions")]
  Promotion,
  #[serde(alias = "payments")]
  Payment,
  System,
  #[serde(other)]
  Other,
}

impl NotificationCategory {
  /// Categories a feed can be filtered by, in display order.
  pub const FILTERABLE: [NotificationCategory; 5] = [
    NotificationCategory::Order,
    NotificationCategory::Review,
    NotificationCategory::Promotion,
    NotificationCategory::Payment,
    NotificationCategory::System,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      NotificationCategory::Order => "order",
      NotificationCategory::Review => "review",
      NotificationCategory::Promotion => "promotion",
      NotificationCategory::Payment => "payment",
      NotificationCategory::System => "system",
      NotificationCategory::Other => "other",
    }
  }
}

impl fmt::Display for NotificationCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for NotificationCategory {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "order" | "orders" => Ok(NotificationCategory::Order),
      "review" | "reviews" => Ok(NotificationCategory::Review),
      "promotion" | "promotions" => Ok(NotificationCategory::Promotion),
      "payment" | "payments" => Ok(NotificationCategory::Payment),
      "system" => Ok(NotificationCategory::System),
      other => Err(format!("unknown notification category: {}", other)),
    }
  }
}

fn default_category() -> NotificationCategory {
  NotificationCategory::System
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  #[serde(deserialize_with = "id_from_string_or_number")]
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub message: String,
  #[serde(default = "default_category")]
  pub category: NotificationCategory,
  #[serde(default)]
  pub is_read: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub link: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

/// Filters for listing notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationListParams {
  /// `None` lists every category
  pub category: Option<NotificationCategory>,
  pub unread_only: bool,
  pub limit: Option<u32>,
}

impl NotificationListParams {
  pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(category) = self.category {
      pairs.push(("category", category.as_str().to_string()));
    }
    if self.unread_only {
      pairs.push(("unreadOnly", "true".to_string()));
    }
    if let Some(limit) = self.limit {
      pairs.push(("limit", limit.to_string()));
    }
    pairs
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnreadCount {
  pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
  #[serde(deserialize_with = "id_from_string_or_number")]
  pub id: String,
  #[serde(default)]
  pub cake_id: String,
  #[serde(default)]
  pub user_name: String,
  pub rating: u8,
  #[serde(default)]
  pub comment: String,
  #[serde(default)]
  pub helpful_count: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

/// Body for creating or editing a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewDraft {
  pub rating: u8,
  pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
  pub page: u32,
  pub limit: u32,
  pub total: u64,
  #[serde(default)]
  pub total_pages: u32,
}

/// One page of a cake's reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPage {
  #[serde(rename = "data")]
  pub reviews: Vec<Review>,
  pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpfulCount {
  pub helpful_count: u32,
}
