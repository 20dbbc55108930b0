use ratatui::prelude::Color;

use crate::gateway::types::NotificationCategory;

/// How a notification category is drawn in the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryStyle {
  pub icon: &'static str,
  pub color: Color,
  pub label: &'static str,
}

const ORDER: CategoryStyle = CategoryStyle {
  icon: "[O]",
  color: Color::Cyan,
  label: "Orders",
};
const REVIEW: CategoryStyle = CategoryStyle {
  icon: "[*]",
  color: Color::Yellow,
  label: "Reviews",
};
const PROMOTION: CategoryStyle = CategoryStyle {
  icon: "[%]",
  color: Color::Magenta,
  label: "Promotions",
};
const PAYMENT: CategoryStyle = CategoryStyle {
  icon: "[$]",
  color: Color::Green,
  label: "Payments",
};
const SYSTEM: CategoryStyle = CategoryStyle {
  icon: "[i]",
  color: Color::Blue,
  label: "System",
};
const OTHER: CategoryStyle = CategoryStyle {
  icon: "[-]",
  color: Color::Gray,
  label: "Other",
};

pub fn category_style(category: NotificationCategory) -> CategoryStyle {
  match category {
    NotificationCategory::Order => ORDER,
    NotificationCategory::Review => REVIEW,
    NotificationCategory::Promotion => PROMOTION,
    NotificationCategory::Payment => PAYMENT,
    NotificationCategory::System => SYSTEM,
    NotificationCategory::Other => OTHER,
  }
}

/// Label for a feed filter, `None` meaning every category.
pub fn filter_label(category: Option<NotificationCategory>) -> &'static str {
  category.map_or("All", |c| category_style(c).label)
}

/// Five-slot star bar for a 1-5 rating.
pub fn rating_stars(rating: u8) -> String {
  let filled = rating.min(5) as usize;
  format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}
