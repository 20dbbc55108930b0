use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::error::GatewayError;

/// Standard `{ "data": ... }` response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
  pub data: T,
}

/// Shared HTTP transport: base URL, auth, and response handling.
#[derive(Clone)]
pub struct ApiTransport {
  http: Client,
  base_url: Url,
  token: Option<String>,
}

impl ApiTransport {
  pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, GatewayError> {
    let invalid = |source| GatewayError::InvalidUrl {
      path: base_url.to_string(),
      source,
    };
    let parsed = Url::parse(base_url).map_err(invalid)?;
    if parsed.cannot_be_a_base() {
      return Err(invalid(url::ParseError::RelativeUrlWithCannotBeABaseBase));
    }

    let http = Client::builder().timeout(timeout).build()?;

    Ok(Self {
      http,
      base_url: parsed,
      token,
    })
  }

  /// Append `segments` to the base path, percent-encoding each one.
  ///
  /// Ids go through here, so a segment can never add or climb path levels.
  fn url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
    if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
      return Err(GatewayError::InvalidSegment {
        segment: bad.to_string(),
      });
    }

    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|()| GatewayError::InvalidUrl {
        path: segments.join("/"),
        source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
      })?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  pub(crate) fn get(&self, segments: &[&str]) -> Result<RequestBuilder, GatewayError> {
    Ok(self.http.get(self.url(segments)?))
  }

  pub(crate) fn post(&self, segments: &[&str]) -> Result<RequestBuilder, GatewayError> {
    Ok(self.http.post(self.url(segments)?))
  }

  pub(crate) fn put(&self, segments: &[&str]) -> Result<RequestBuilder, GatewayError> {
    Ok(self.http.put(self.url(segments)?))
  }

  pub(crate) fn patch(&self, segments: &[&str]) -> Result<RequestBuilder, GatewayError> {
    Ok(self.http.patch(self.url(segments)?))
  }

  pub(crate) fn delete(&self, segments: &[&str]) -> Result<RequestBuilder, GatewayError> {
    Ok(self.http.delete(self.url(segments)?))
  }

  /// Send a request and return the raw body of a 2xx response.
  async fn execute(&self, req: RequestBuilder, resource: &str) -> Result<String, GatewayError> {
    let req = match &self.token {
      Some(token) => req.bearer_auth(token),
      None => req,
    };

    let response = req.send().await?;
    let status = response.status();
    let body = response.text().await?;
    debug!("{} -> {}", resource, status);

    if !status.is_success() {
      return Err(GatewayError::from_response(status, &body, resource));
    }
    Ok(body)
  }

  /// Send a request and decode the whole body.
  pub(crate) async fn send_json<T: DeserializeOwned>(
    &self,
    req: RequestBuilder,
    resource: &str,
  ) -> Result<T, GatewayError> {
    let body = self.execute(req, resource).await?;
    serde_json::from_str(&body).map_err(|source| GatewayError::Decode {
      resource: resource.to_string(),
      source,
    })
  }

  /// Send a request and unwrap the `data` envelope.
  pub(crate) async fn send_data<T: DeserializeOwned>(
    &self,
    req: RequestBuilder,
    resource: &str,
  ) -> Result<T, GatewayError> {
    let envelope: Envelope<T> = self.send_json(req, resource).await?;
    Ok(envelope.data)
  }

  /// Send a request whose response body is ignored.
  pub(crate) async fn send_empty(&self, req: RequestBuilder, resource: &str) -> Result<(), GatewayError> {
    self.execute(req, resource).await?;
    Ok(())
  }
}
