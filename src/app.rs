use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::resources::Backend;
use crate::ui;
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{NotificationFeedView, ReviewListView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::{Duration, Instant};
use tracing::info;

/// How long a toast stays in the footer
const TOAST_TTL: Duration = Duration::from_secs(4);

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  config: Config,

  backend: Backend,

  /// Cake to open on start instead of the feed alone
  start_cake: Option<String>,

  toast: Option<(String, Instant)>,

  should_quit: bool,
}

impl App {
  pub fn new(config: Config, backend: Backend, start_cake: Option<String>) -> Self {
    Self {
      view_stack: Vec::new(),
      config,
      backend,
      start_cake,
      toast: None,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    let mut events = EventHandler::new(self.config.ui.tick_rate());
    let tx = events.sender();

    self.view_stack.push(Box::new(NotificationFeedView::new(
      self.backend.clone(),
      tx.clone(),
      &self.config,
    )));
    if let Some(cake) = self.start_cake.take() {
      self.view_stack.push(Box::new(ReviewListView::new(
        self.backend.clone(),
        tx,
        cake,
        self.config.ui.page_size,
      )));
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let result = self.event_loop(&mut events).await;

    // Restore the terminal even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    info!("dashboard closed");

    result
  }

  async fn event_loop(&mut self, events: &mut EventHandler) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {
        for view in self.view_stack.iter_mut() {
          view.tick();
        }
        if self
          .toast
          .as_ref()
          .is_some_and(|(_, shown)| shown.elapsed() >= TOAST_TTL)
        {
          self.toast = None;
        }
      }
      Event::Toast(message) => self.toast = Some((message, Instant::now())),
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let Some(view) = self.view_stack.last_mut() else {
      self.should_quit = true;
      return;
    };

    match view.handle_key(key) {
      ViewAction::None => {}
      ViewAction::Push(next) => self.view_stack.push(next),
      ViewAction::Pop => {
        self.view_stack.pop();
        if self.view_stack.is_empty() {
          self.should_quit = true;
        }
      }
    }
  }

  // Accessors for UI rendering
  pub fn current_view(&self) -> Option<&dyn View> {
    self.view_stack.last().map(|v| &**v)
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn title(&self) -> &str {
    self.config.title.as_deref().unwrap_or("SweetNest")
  }

  pub fn api_url(&self) -> &str {
    &self.config.api.url
  }

  pub fn unread_count(&self) -> Option<u64> {
    self
      .backend
      .notifications
      .cached_unread_count()
      .ok()
      .flatten()
  }

  pub fn toast(&self) -> Option<&str> {
    self.toast.as_ref().map(|(message, _)| message.as_str())
  }

  pub fn view_breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }
}
