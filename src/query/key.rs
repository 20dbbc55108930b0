//! Structural query keys.
//!
//! A key is an ordered tuple of parts, e.g. `[notifications, list, {category=order}]`.
//! Keys compare structurally and form a prefix hierarchy: `[notifications]` is a
//! prefix of every notification key, so invalidating it touches all of them.

use std::collections::BTreeMap;
use std::fmt;

/// One element of a query key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
  Str(String),
  Int(i64),
  Bool(bool),
  /// Filter/pagination parameters. Sorted, so insertion order never matters.
  Params(BTreeMap<String, String>),
}

impl KeyPart {
  /// Build a parameter part, skipping parameters without a value.
  pub fn params<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: Into<String>,
    V: ToString,
  {
    KeyPart::Params(
      pairs
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.into(), v.to_string())))
        .collect(),
    )
  }
}

impl From<&str> for KeyPart {
  fn from(s: &str) -> Self {
    KeyPart::Str(s.to_string())
  }
}

impl From<String> for KeyPart {
  fn from(s: String) -> Self {
    KeyPart::Str(s)
  }
}

impl From<&String> for KeyPart {
  fn from(s: &String) -> Self {
    KeyPart::Str(s.clone())
  }
}

impl From<i64> for KeyPart {
  fn from(n: i64) -> Self {
    KeyPart::Int(n)
  }
}

impl From<u32> for KeyPart {
  fn from(n: u32) -> Self {
    KeyPart::Int(i64::from(n))
  }
}

impl From<bool> for KeyPart {
  fn from(b: bool) -> Self {
    KeyPart::Bool(b)
  }
}

impl fmt::Display for KeyPart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyPart::Str(s) => write!(f, "{}", s),
      KeyPart::Int(n) => write!(f, "{}", n),
      KeyPart::Bool(b) => write!(f, "{}", b),
      KeyPart::Params(params) => {
        write!(f, "{{")?;
        for (i, (k, v)) in params.iter().enumerate() {
          if i > 0 {
            write!(f, ",")?;
          }
          write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
      }
    }
  }
}

/// Identifier for a cached query.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
  /// Start a key with its resource name.
  pub fn root(part: impl Into<KeyPart>) -> Self {
    Self(vec![part.into()])
  }

  /// Extend the key with one more part.
  pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
    self.0.push(part.into());
    self
  }

  /// The resource family this key belongs to.
  pub fn root_part(&self) -> Option<&KeyPart> {
    self.0.first()
  }

  /// True if `prefix` is this key or one of its ancestors.
  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.0.starts_with(&prefix.0)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[")?;
    for (i, part) in self.0.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", part)?;
    }
    write!(f, "]")
  }
}
