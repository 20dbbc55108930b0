mod notifications;
mod reviews;

pub use notifications::NotificationFeedView;
pub use reviews::ReviewListView;
