use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::config::Config;
use crate::debounce::Debouncer;
use crate::event::Event;
use crate::gateway::types::{Notification, NotificationCategory, NotificationListParams};
use crate::query::{QueryObserver, QueryStatus};
use crate::resources::Backend;
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::renderfns::{category_style, ensure_valid_selection, filter_label, time_ago, truncate};
use crate::ui::spawn_mutation;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::ReviewListView;

/// Notification feed with category filter and client-side search
pub struct NotificationFeedView {
  backend: Backend,
  tx: UnboundedSender<Event>,
  category: Option<NotificationCategory>,
  list: QueryObserver,
  unread: QueryObserver,
  list_state: ListState,
  search: SearchInput,
  debouncer: Debouncer<String>,
  /// Applied search text
  filter: String,
  default_cake: Option<String>,
  page_size: u32,
}

fn params_for(category: Option<NotificationCategory>) -> NotificationListParams {
  NotificationListParams {
    category,
    ..Default::default()
  }
}

/// Next feed filter after `current`, wrapping back to every category.
fn next_category(current: Option<NotificationCategory>) -> Option<NotificationCategory> {
  let all = NotificationCategory::FILTERABLE;
  match current {
    None => Some(all[0]),
    Some(c) => all
      .iter()
      .position(|x| *x == c)
      .and_then(|i| all.get(i + 1))
      .copied(),
  }
}

fn matches_filter(item: &Notification, filter: &str) -> bool {
  if filter.is_empty() {
    return true;
  }
  let filter = filter.to_lowercase();
  item.title.to_lowercase().contains(&filter) || item.message.to_lowercase().contains(&filter)
}

impl NotificationFeedView {
  pub fn new(backend: Backend, tx: UnboundedSender<Event>, config: &Config) -> Self {
    let list = backend.notifications.observe_list(params_for(None));
    let unread = backend.notifications.observe_unread_count();

    Self {
      backend,
      tx,
      category: None,
      list,
      unread,
      list_state: ListState::default(),
      search: SearchInput::new(),
      debouncer: Debouncer::new(config.ui.search_debounce()),
      filter: String::new(),
      default_cake: config.default_cake.clone(),
      page_size: config.ui.page_size,
    }
  }

  fn items(&self) -> Vec<Notification> {
    let items = self
      .backend
      .notifications
      .cached_list(&params_for(self.category))
      .unwrap_or_else(|e| {
        warn!("unreadable notification list: {}", e);
        Vec::new()
      });
    items
      .into_iter()
      .filter(|n| matches_filter(n, &self.filter))
      .collect()
  }

  fn selected(&self) -> Option<Notification> {
    let idx = self.list_state.selected()?;
    self.items().into_iter().nth(idx)
  }

  fn cycle_category(&mut self) {
    self.category = next_category(self.category);
    // Replacing the observer releases the previous list
    self.list = self.backend.notifications.observe_list(params_for(self.category));
    self.list_state.select(Some(0));
  }

  fn mark_selected_read(&self) {
    let Some(item) = self.selected() else { return };
    if item.is_read {
      return;
    }
    let notifications = self.backend.notifications.clone();
    spawn_mutation(&self.tx, "Mark as read", async move {
      notifications.mark_read(&item.id).await
    });
  }

  fn mark_all_read(&self) {
    let notifications = self.backend.notifications.clone();
    let category = self.category;
    spawn_mutation(&self.tx, "Mark all as read", async move {
      notifications.mark_all_read(category).await
    });
  }

  fn delete_selected(&self) {
    let Some(item) = self.selected() else { return };
    let notifications = self.backend.notifications.clone();
    spawn_mutation(&self.tx, "Delete", async move {
      notifications.delete(&item.id).await
    });
  }

  fn open_reviews(&self) -> ViewAction {
    match &self.default_cake {
      Some(cake) => ViewAction::Push(Box::new(ReviewListView::new(
        self.backend.clone(),
        self.tx.clone(),
        cake.clone(),
        self.page_size,
      ))),
      None => {
        let _ = self.tx.send(Event::Toast(
          "Set default_cake in the config to browse reviews".to_string(),
        ));
        ViewAction::None
      }
    }
  }

  fn title(&self, shown: usize) -> String {
    let label = filter_label(self.category);
    let search = if self.filter.is_empty() {
      String::new()
    } else {
      format!(" /{}", self.filter)
    };
    match (self.list.status(), self.list.error()) {
      (QueryStatus::Loading, _) => format!(" Notifications [{}]{} (loading...) ", label, search),
      (QueryStatus::Error, Some(e)) => {
        format!(" Notifications [{}]{} (error: {}) ", label, search, truncate(&e, 40))
      }
      _ => format!(" Notifications [{}]{} ({}) ", label, search, shown),
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let items = self.items();
    ensure_valid_selection(&mut self.list_state, items.len());

    let block = Block::default()
      .title(self.title(items.len()))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Magenta));

    if items.is_empty() {
      let content = if self.list.is_loading() {
        "Loading..."
      } else if self.list.error().is_some() {
        "Failed to load notifications. Press 'r' to retry."
      } else if !self.filter.is_empty() {
        "Nothing matches the search."
      } else {
        "You're all caught up."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let now = chrono::Utc::now();
    let rows: Vec<ListItem> = items
      .iter()
      .map(|n| {
        let style = category_style(n.category);
        let title_style = if n.is_read {
          Style::default().fg(Color::Gray)
        } else {
          Style::default().fg(Color::White).bold()
        };
        let line = Line::from(vec![
          Span::styled(if n.is_read { "  " } else { "● " }, Style::default().fg(Color::Yellow)),
          Span::styled(format!("{} ", style.icon), Style::default().fg(style.color)),
          Span::styled(format!("{:<32}", truncate(&n.title, 32)), title_style),
          Span::raw(" "),
          Span::styled(truncate(&n.message, 50), Style::default().fg(Color::DarkGray)),
          Span::raw(" "),
          Span::styled(time_ago(n.created_at, now), Style::default().fg(Color::DarkGray)),
        ]);
        ListItem::new(line)
      })
      .collect();

    let list = List::new(rows)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for NotificationFeedView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Handled => return ViewAction::None,
      KeyResult::Event(SearchEvent::Changed(query)) => {
        if query.is_empty() {
          self.debouncer.cancel();
          self.filter.clear();
        } else {
          self.debouncer.push(query);
        }
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Submitted(query)) => {
        self.debouncer.cancel();
        self.filter = query;
        return ViewAction::None;
      }
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Enter | KeyCode::Char(' ') => self.mark_selected_read(),
      KeyCode::Char('a') => self.mark_all_read(),
      KeyCode::Char('d') => self.delete_selected(),
      KeyCode::Tab => self.cycle_category(),
      KeyCode::Char('r') => {
        self.list.refetch();
        self.unread.refetch();
      }
      KeyCode::Char('v') => return self.open_reviews(),
      KeyCode::Esc if !self.filter.is_empty() => self.filter.clear(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("Notifications [{}]", filter_label(self.category))
  }

  fn tick(&mut self) {
    self.list.poll();
    self.unread.poll();
    if let Some(query) = self.debouncer.poll() {
      self.filter = query;
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("enter", "read").with_priority(10),
      ShortcutInfo::new("a", "read all").with_priority(20),
      ShortcutInfo::new("d", "delete").with_priority(30),
      ShortcutInfo::new("tab", "category").with_priority(40),
      ShortcutInfo::new("/", "search").with_priority(50),
      ShortcutInfo::new("v", "reviews").with_priority(60),
      ShortcutInfo::new("r", "refresh").with_priority(80),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_category_cycle_wraps() {
    let mut category = None;
    let mut seen = Vec::new();
    for _ in 0..=NotificationCategory::FILTERABLE.len() {
      category = next_category(category);
      seen.push(category);
    }
    assert_eq!(seen[0], Some(NotificationCategory::Order));
    assert_eq!(seen[4], Some(NotificationCategory::System));
    assert_eq!(seen[5], None);
  }

  #[test]
  fn test_search_matches_title_or_message() {
    let item: Notification = serde_json::from_value(serde_json::json!({
      "id": "1",
      "title": "Order shipped",
      "message": "Your Red Velvet cake is on its way"
    }))
    .unwrap();

    assert!(matches_filter(&item, ""));
    assert!(matches_filter(&item, "SHIPPED"));
    assert!(matches_filter(&item, "velvet"));
    assert!(!matches_filter(&item, "refund"));
  }
}
