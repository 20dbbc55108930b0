use chrono::{DateTime, Utc};
use ratatui::widgets::ListState;

/// Truncate to `max_len` chars, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Short age like "5m" or "3d"
pub fn time_ago(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
  let Some(at) = at else {
    return String::new();
  };
  let secs = (now - at).num_seconds().max(0);
  match secs {
    0..=59 => "now".to_string(),
    60..=3599 => format!("{}m", secs / 60),
    3600..=86399 => format!("{}h", secs / 3600),
    _ => format!("{}d", secs / 86400),
  }
}

/// Keep the selection inside a list that may have shrunk or emptied.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
    assert_eq!(truncate("crème brûlée", 8), "crème...");
  }

  #[test]
  fn test_time_ago() {
    let now = Utc::now();
    assert_eq!(time_ago(None, now), "");
    assert_eq!(time_ago(Some(now - Duration::seconds(10)), now), "now");
    assert_eq!(time_ago(Some(now - Duration::minutes(5)), now), "5m");
    assert_eq!(time_ago(Some(now - Duration::hours(2)), now), "2h");
    assert_eq!(time_ago(Some(now - Duration::days(3)), now), "3d");
  }

  #[test]
  fn test_selection_clamped_after_delete() {
    let mut state = ListState::default();
    ensure_valid_selection(&mut state, 3);
    assert_eq!(state.selected(), Some(0));

    state.select(Some(2));
    ensure_valid_selection(&mut state, 2);
    assert_eq!(state.selected(), Some(1));

    ensure_valid_selection(&mut state, 0);
    assert_eq!(state.selected(), None);
  }
}
