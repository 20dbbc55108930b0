use std::time::{Duration, Instant};

/// Holds back a changing value until it has been quiet for `delay`.
///
/// Polled from the UI tick, so it needs no timer task of its own.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
  delay: Duration,
  pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      pending: None,
    }
  }

  pub fn push(&mut self, value: T) {
    self.push_at(value, Instant::now());
  }

  /// Replace the pending value and restart the quiet period.
  pub fn push_at(&mut self, value: T, now: Instant) {
    self.pending = Some((value, now));
  }

  pub fn poll(&mut self) -> Option<T> {
    self.poll_at(Instant::now())
  }

  /// Release the pending value once `delay` has passed since the last push.
  pub fn poll_at(&mut self, now: Instant) -> Option<T> {
    match &self.pending {
      Some((_, since)) if now.saturating_duration_since(*since) >= self.delay => {
        self.pending.take().map(|(value, _)| value)
      }
      _ => None,
    }
  }

  /// Release the pending value immediately.
  pub fn flush(&mut self) -> Option<T> {
    self.pending.take().map(|(value, _)| value)
  }

  pub fn cancel(&mut self) {
    self.pending = None;
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const DELAY: Duration = Duration::from_millis(300);

  #[test]
  fn test_releases_after_quiet_period() {
    let start = Instant::now();
    let mut debouncer = Debouncer::new(DELAY);

    debouncer.push_at("c", start);
    assert_eq!(debouncer.poll_at(start + Duration::from_millis(299)), None);
    assert_eq!(debouncer.poll_at(start + DELAY), Some("c"));
    assert!(!debouncer.is_pending());
    assert_eq!(debouncer.poll_at(start + DELAY * 2), None);
  }

  #[test]
  fn test_each_push_restarts_the_wait() {
    let start = Instant::now();
    let mut debouncer = Debouncer::new(DELAY);

    debouncer.push_at("c".to_string(), start);
    debouncer.push_at("ca".to_string(), start + Duration::from_millis(200));
    debouncer.push_at("cak".to_string(), start + Duration::from_millis(400));

    assert_eq!(debouncer.poll_at(start + Duration::from_millis(600)), None);
    assert_eq!(
      debouncer.poll_at(start + Duration::from_millis(700)),
      Some("cak".to_string())
    );
  }

  #[test]
  fn test_flush_and_cancel() {
    let mut debouncer = Debouncer::new(DELAY);

    debouncer.push(1);
    assert!(debouncer.is_pending());
    assert_eq!(debouncer.flush(), Some(1));

    debouncer.push(2);
    debouncer.cancel();
    assert_eq!(debouncer.flush(), None);
  }
}
