/// What a component did with a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Consumed, nothing for the parent to do
  Handled,
  /// Consumed, parent should act on the event
  Event(T),
  /// Not consumed, parent tries its own bindings
  NotHandled,
}
