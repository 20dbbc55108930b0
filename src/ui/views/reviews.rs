use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::event::Event;
use crate::gateway::types::{Review, ReviewPage};
use crate::query::{QueryObserver, QueryStatus};
use crate::resources::Backend;
use crate::ui::renderfns::{ensure_valid_selection, rating_stars, time_ago, truncate};
use crate::ui::spawn_mutation;
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// Paged reviews for one cake
pub struct ReviewListView {
  backend: Backend,
  tx: UnboundedSender<Event>,
  cake_id: String,
  page: u32,
  page_size: u32,
  query: QueryObserver,
  list_state: ListState,
}

impl ReviewListView {
  pub fn new(backend: Backend, tx: UnboundedSender<Event>, cake_id: String, page_size: u32) -> Self {
    let query = backend.reviews.observe_page(&cake_id, 1, page_size);
    Self {
      backend,
      tx,
      cake_id,
      page: 1,
      page_size,
      query,
      list_state: ListState::default(),
    }
  }

  fn current(&self) -> Option<ReviewPage> {
    self
      .backend
      .reviews
      .cached_page(&self.cake_id, self.page, self.page_size)
      .unwrap_or_else(|e| {
        warn!("unreadable review page: {}", e);
        None
      })
  }

  fn selected(&self) -> Option<Review> {
    let idx = self.list_state.selected()?;
    self.current()?.reviews.into_iter().nth(idx)
  }

  fn go_to(&mut self, page: u32) {
    self.page = page;
    self.query = self.backend.reviews.observe_page(&self.cake_id, page, self.page_size);
    self.list_state.select(Some(0));
  }

  fn next_page(&mut self) {
    let last = self.current().map_or(1, |p| p.pagination.total_pages.max(1));
    if self.page < last {
      self.go_to(self.page + 1);
    }
  }

  fn prev_page(&mut self) {
    if self.page > 1 {
      self.go_to(self.page - 1);
    }
  }

  fn mark_selected_helpful(&self) {
    let Some(review) = self.selected() else { return };
    let reviews = self.backend.reviews.clone();
    spawn_mutation(&self.tx, "Mark helpful", async move {
      reviews.mark_helpful(&review.id).await
    });
  }

  fn delete_selected(&self) {
    let Some(review) = self.selected() else { return };
    let reviews = self.backend.reviews.clone();
    spawn_mutation(&self.tx, "Delete review", async move {
      reviews.delete(&review.id).await
    });
  }

  fn title(&self, page: Option<&ReviewPage>) -> String {
    match (self.query.status(), page) {
      (QueryStatus::Loading, None) => format!(" Reviews [{}] (loading...) ", self.cake_id),
      (QueryStatus::Error, _) => format!(
        " Reviews [{}] (error: {}) ",
        self.cake_id,
        truncate(&self.query.error().unwrap_or_default(), 40)
      ),
      (_, Some(p)) => format!(
        " Reviews [{}] page {}/{} ({} total) ",
        self.cake_id,
        self.page,
        p.pagination.total_pages.max(1),
        p.pagination.total
      ),
      (_, None) => format!(" Reviews [{}] ", self.cake_id),
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let page = self.current();
    let reviews = page.as_ref().map(|p| p.reviews.as_slice()).unwrap_or(&[]);
    ensure_valid_selection(&mut self.list_state, reviews.len());

    let block = Block::default()
      .title(self.title(page.as_ref()))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow));

    if reviews.is_empty() {
      let content = if self.query.is_loading() {
        "Loading..."
      } else if self.query.error().is_some() {
        "Failed to load reviews. Press 'r' to retry."
      } else {
        "No reviews yet."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let now = chrono::Utc::now();
    let rows: Vec<ListItem> = reviews
      .iter()
      .map(|r| {
        let edited = if r.updated_at.is_some() { " (edited)" } else { "" };
        let line = Line::from(vec![
          Span::styled(rating_stars(r.rating), Style::default().fg(Color::Yellow)),
          Span::raw(" "),
          Span::styled(format!("{:<16}", truncate(&r.user_name, 16)), Style::default().fg(Color::Cyan)),
          Span::styled(format!("{:>4} ", format!("+{}", r.helpful_count)), Style::default().fg(Color::Green)),
          Span::raw(truncate(&r.comment, 60)),
          Span::styled(edited, Style::default().fg(Color::DarkGray)),
          Span::raw(" "),
          Span::styled(time_ago(r.created_at, now), Style::default().fg(Color::DarkGray)),
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

impl View for ReviewListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('h') => self.mark_selected_helpful(),
      KeyCode::Char('d') => self.delete_selected(),
      KeyCode::Char('n') | KeyCode::Right => self.next_page(),
      KeyCode::Char('p') | KeyCode::Left => self.prev_page(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("Reviews [{}]", self.cake_id)
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("h", "helpful").with_priority(10),
      ShortcutInfo::new("d", "delete").with_priority(20),
      ShortcutInfo::new("n/p", "page").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(80),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
