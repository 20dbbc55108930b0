use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Failure of a single gateway call.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
  /// No response was received
  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  #[error("{resource} not found")]
  NotFound { resource: String },

  #[error("validation failed: {message}")]
  Validation {
    message: String,
    fields: BTreeMap<String, Vec<String>>,
  },

  #[error("unexpected response for {resource}: {source}")]
  Decode {
    resource: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid path segment {segment:?}")]
  InvalidSegment { segment: String },

  #[error("invalid URL {path}: {source}")]
  InvalidUrl {
    path: String,
    #[source]
    source: url::ParseError,
  },
}

/// Error body shape returned by the backend.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
  message: Option<String>,
  #[serde(default)]
  errors: Option<Value>,
}

/// Field errors come as an object of string or string-list values, or as a
/// list of `{ msg, path }` (or `param`) items.
fn field_errors(errors: &Value) -> BTreeMap<String, Vec<String>> {
  let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
  match errors {
    Value::Object(map) => {
      for (field, value) in map {
        let messages: Vec<String> = match value {
          Value::String(message) => vec![message.clone()],
          Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
          _ => continue,
        };
        fields.entry(field.clone()).or_default().extend(messages);
      }
    }
    Value::Array(items) => {
      for item in items {
        let field = item
          .get("path")
          .or_else(|| item.get("param"))
          .and_then(Value::as_str);
        let message = item.get("msg").and_then(Value::as_str);
        if let (Some(field), Some(message)) = (field, message) {
          fields
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
        }
      }
    }
    _ => {}
  }
  fields
}

impl GatewayError {
  /// Map a non-2xx response to a typed error.
  pub fn from_response(status: StatusCode, body: &str, resource: &str) -> Self {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    if status == StatusCode::NOT_FOUND {
      return GatewayError::NotFound {
        resource: resource.to_string(),
      };
    }

    let message = parsed.message.unwrap_or_else(|| {
      let trimmed = body.trim();
      if trimmed.is_empty() {
        status
          .canonical_reason()
          .unwrap_or("request failed")
          .to_string()
      } else {
        trimmed.to_string()
      }
    });

    if matches!(
      status,
      StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
    ) {
      let fields = parsed.errors.as_ref().map(field_errors).unwrap_or_default();
      if !fields.is_empty() {
        return GatewayError::Validation { message, fields };
      }
    }

    GatewayError::Server {
      status: status.as_u16(),
      message,
    }
  }

  /// True when the request never got a response.
  pub fn is_network(&self) -> bool {
    matches!(self, GatewayError::Network(_))
  }
}
