pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use std::future::Future;

use ratatui::prelude::*;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::app::App;
use crate::event::Event;
use crate::query::MutationError;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Breadcrumb or toast
    ])
    .split(frame.area());

  let shortcuts = app.current_view().map(|v| v.shortcuts()).unwrap_or_default();
  renderfns::draw_header(
    frame,
    chunks[0],
    app.title(),
    app.api_url(),
    app.unread_count(),
    &shortcuts,
  );

  if let Some(view) = app.current_view_mut() {
    view.render(frame, chunks[1]);
  }

  renderfns::draw_footer(frame, chunks[2], &app.view_breadcrumb(), app.toast());
}

/// Run a mutation in the background and toast its failure.
/// The cache is already rolled back when the error arrives.
pub fn spawn_mutation<T, F>(tx: &UnboundedSender<Event>, label: &'static str, mutation: F)
where
  F: Future<Output = Result<T, MutationError>> + Send + 'static,
  T: Send + 'static,
{
  let tx = tx.clone();
  tokio::spawn(async move {
    if let Err(e) = mutation.await {
      warn!("{} failed: {}", label, e);
      let _ = tx.send(Event::Toast(format!("{} failed: {}", label, e)));
    }
  });
}
