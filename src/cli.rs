//! One-shot subcommands. They go through the same cache and coordinator as
//! the dashboard, so a failed write is rolled back and reported the same way.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};

use crate::gateway::types::{Notification, NotificationCategory, NotificationListParams, Review, ReviewDraft, ReviewPage};
use crate::query::QueryObserver;
use crate::resources::Backend;
use crate::ui::renderfns::{category_style, rating_stars};

#[derive(Subcommand, Debug)]
pub enum NotificationsCommand {
  /// List notifications
  List {
    /// Only this category (order, review, promotion, payment, system)
    #[arg(short, long)]
    category: Option<NotificationCategory>,
    /// Only unread notifications
    #[arg(short, long)]
    unread: bool,
  },
  /// Show one notification
  Show { id: String },
  /// Mark one notification as read
  Read { id: String },
  /// Mark every notification as read, optionally within one category
  ReadAll {
    #[arg(short, long)]
    category: Option<NotificationCategory>,
  },
  /// Delete a notification
  Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ReviewsCommand {
  /// List one page of a cake's reviews
  List {
    cake: String,
    #[arg(short, long, default_value_t = 1)]
    page: u32,
  },
  /// Show one review
  Show { id: String },
  /// Add a review to a cake
  Add {
    cake: String,
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=5))]
    rating: u8,
    #[arg(short, long)]
    comment: String,
  },
  /// Replace a review's rating and comment
  Edit {
    id: String,
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=5))]
    rating: u8,
    #[arg(short, long)]
    comment: String,
  },
  /// Delete a review
  Delete { id: String },
  /// Vote a review as helpful
  Helpful { id: String },
}

/// Wait for the observer's fetch and surface its failure.
async fn fetched(mut observer: QueryObserver) -> Result<QueryObserver> {
  observer.ready().await;
  match observer.error() {
    Some(e) => Err(eyre!("Fetching {} failed: {}", observer.key(), e)),
    None => Ok(observer),
  }
}

fn print_notification(n: &Notification) {
  let marker = if n.is_read { ' ' } else { '●' };
  println!(
    "{} {} {:<6} {}  {}",
    marker,
    category_style(n.category).icon,
    n.id,
    n.title,
    n.message
  );
}

fn print_review(r: &Review) {
  println!(
    "{} {:<8} {:<16} +{:<3} {}",
    rating_stars(r.rating),
    r.id,
    r.user_name,
    r.helpful_count,
    r.comment
  );
}

pub async fn notifications(backend: &Backend, command: NotificationsCommand) -> Result<()> {
  let notifications = &backend.notifications;
  match command {
    NotificationsCommand::List { category, unread } => {
      let params = NotificationListParams {
        category,
        unread_only: unread,
        limit: None,
      };
      let observer = fetched(notifications.observe_list(params.clone())).await?;
      let count = fetched(notifications.observe_unread_count()).await?;

      let items = notifications.cached_list(&params)?;
      for n in &items {
        print_notification(n);
      }
      let unread: Option<u64> = count.data()?;
      println!("{} shown, {} unread", items.len(), unread.unwrap_or(0));
      drop(observer);
    }
    NotificationsCommand::Show { id } => {
      let observer = fetched(notifications.observe_detail(&id)).await?;
      let n: Notification = observer
        .data()?
        .ok_or_else(|| eyre!("Notification {} not found", id))?;
      print_notification(&n);
      if let Some(link) = &n.link {
        println!("  {}", link);
      }
    }
    NotificationsCommand::Read { id } => {
      let n = notifications.mark_read(&id).await?;
      println!("Marked {} as read", n.id);
    }
    NotificationsCommand::ReadAll { category } => {
      notifications.mark_all_read(category).await?;
      match category {
        Some(c) => println!("Marked all {} notifications as read", c),
        None => println!("Marked all notifications as read"),
      }
    }
    NotificationsCommand::Delete { id } => {
      notifications.delete(&id).await?;
      println!("Deleted notification {}", id);
    }
  }
  Ok(())
}

pub async fn reviews(backend: &Backend, command: ReviewsCommand, page_size: u32) -> Result<()> {
  let reviews = &backend.reviews;
  match command {
    ReviewsCommand::List { cake, page } => {
      let observer = fetched(reviews.observe_page(&cake, page, page_size)).await?;
      let data: ReviewPage = observer
        .data()?
        .ok_or_else(|| eyre!("No reviews returned for cake {}", cake))?;
      for r in &data.reviews {
        print_review(r);
      }
      println!(
        "page {}/{}, {} reviews",
        data.pagination.page,
        data.pagination.total_pages.max(1),
        data.pagination.total
      );
    }
    ReviewsCommand::Show { id } => {
      let observer = fetched(reviews.observe_detail(&id)).await?;
      let review: Review = observer
        .data()?
        .ok_or_else(|| eyre!("Review {} not found", id))?;
      print_review(&review);
    }
    ReviewsCommand::Add { cake, rating, comment } => {
      let review = reviews.create(&cake, &ReviewDraft { rating, comment }).await?;
      print_review(&review);
    }
    ReviewsCommand::Edit { id, rating, comment } => {
      let review = reviews.update(&id, &ReviewDraft { rating, comment }).await?;
      print_review(&review);
    }
    ReviewsCommand::Delete { id } => {
      reviews.delete(&id).await?;
      println!("Deleted review {}", id);
    }
    ReviewsCommand::Helpful { id } => {
      let count = reviews.mark_helpful(&id).await?;
      println!("Review {} now has {} helpful votes", id, count);
    }
  }
  Ok(())
}
