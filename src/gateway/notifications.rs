use serde_json::json;

use super::error::GatewayError;
use super::transport::ApiTransport;
use super::types::{Notification, NotificationCategory, NotificationListParams, UnreadCount};

/// Notification endpoints. Each call performs exactly one request.
#[derive(Clone)]
pub struct NotificationsApi {
  transport: ApiTransport,
}

impl NotificationsApi {
  pub fn new(transport: ApiTransport) -> Self {
    Self { transport }
  }

  pub async fn list(&self, params: &NotificationListParams) -> Result<Vec<Notification>, GatewayError> {
    let req = self.transport.get(&["notifications"])?.query(&params.query_pairs());
    self.transport.send_data(req, "notifications").await
  }

  pub async fn get(&self, id: &str) -> Result<Notification, GatewayError> {
    let req = self.transport.get(&["notifications", id])?;
    self
      .transport
      .send_data(req, &format!("notification {}", id))
      .await
  }

  pub async fn unread_count(&self) -> Result<u64, GatewayError> {
    let req = self.transport.get(&["notifications", "unread-count"])?;
    let count: UnreadCount = self.transport.send_data(req, "unread count").await?;
    Ok(count.count)
  }

  /// Marking an already-read notification succeeds as well.
  pub async fn mark_read(&self, id: &str) -> Result<Notification, GatewayError> {
    let req = self.transport.patch(&["notifications", id, "read"])?;
    self
      .transport
      .send_data(req, &format!("notification {}", id))
      .await
  }

  pub async fn mark_all_read(&self, category: Option<NotificationCategory>) -> Result<(), GatewayError> {
    let body = json!({ "category": category.map(|c| c.as_str()) });
    let req = self.transport.patch(&["notifications", "mark-all-read"])?.json(&body);
    self.transport.send_empty(req, "notifications").await
  }

  pub async fn delete(&self, id: &str) -> Result<(), GatewayError> {
    let req = self.transport.delete(&["notifications", id])?;
    self
      .transport
      .send_empty(req, &format!("notification {}", id))
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use httpmock::Method::{DELETE, GET, PATCH};
  use httpmock::MockServer;
  use std::time::Duration;

  fn api(server: &MockServer) -> NotificationsApi {
    let transport = ApiTransport::new(
      &server.base_url(),
      Some("secret-token".to_string()),
      Duration::from_secs(5),
    )
    .unwrap();
    NotificationsApi::new(transport)
  }

  #[tokio::test]
  async fn test_list_sends_filters_and_auth() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when
          .method(GET)
          .path("/notifications")
          .query_param("category", "order")
          .query_param("unreadOnly", "true")
          .query_param("limit", "10")
          .header("authorization", "Bearer secret-token");
        then.status(200).json_body(serde_json::json!({
          "data": [
            { "id": 1, "title": "Order placed", "category": "order", "isRead": false },
            { "id": 2, "title": "Order shipped", "category": "order", "isRead": false }
          ]
        }));
      })
      .await;

    let params = NotificationListParams {
      category: Some(NotificationCategory::Order),
      unread_only: true,
      limit: Some(10),
    };
    let items = api(&server).list(&params).await.unwrap();

    mock.assert_async().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "1");
    assert_eq!(items[1].title, "Order shipped");
  }

  #[tokio::test]
  async fn test_unread_count() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/notifications/unread-count");
        then
          .status(200)
          .json_body(serde_json::json!({ "data": { "count": 4 } }));
      })
      .await;

    assert_eq!(api(&server).unread_count().await.unwrap(), 4);
  }

  #[tokio::test]
  async fn test_mark_read_and_mark_all_read() {
    let server = MockServer::start_async().await;
    let read = server
      .mock_async(|when, then| {
        when.method(PATCH).path("/notifications/7/read");
        then
          .status(200)
          .json_body(serde_json::json!({ "data": { "id": "7", "isRead": true } }));
      })
      .await;
    let read_all = server
      .mock_async(|when, then| {
        when
          .method(PATCH)
          .path("/notifications/mark-all-read")
          .json_body(serde_json::json!({ "category": "review" }));
        then
          .status(200)
          .json_body(serde_json::json!({ "data": { "modified": 3 } }));
      })
      .await;

    let api = api(&server);
    assert!(api.mark_read("7").await.unwrap().is_read);
    // Repeating is harmless
    assert!(api.mark_read("7").await.unwrap().is_read);
    api
      .mark_all_read(Some(NotificationCategory::Review))
      .await
      .unwrap();

    read.assert_hits_async(2).await;
    read_all.assert_async().await;
  }

  #[tokio::test]
  async fn test_delete_and_not_found() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(DELETE).path("/notifications/1");
        then.status(200).json_body(serde_json::json!({}));
      })
      .await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/notifications/404");
        then
          .status(404)
          .json_body(serde_json::json!({ "message": "Notification not found" }));
      })
      .await;

    let api = api(&server);
    api.delete("1").await.unwrap();
    let err = api.get("404").await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound { .. }));
  }

  #[tokio::test]
  async fn test_server_error_is_surfaced() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/notifications");
        then
          .status(503)
          .json_body(serde_json::json!({ "message": "maintenance" }));
      })
      .await;

    let err = api(&server)
      .list(&NotificationListParams::default())
      .await
      .unwrap_err();
    assert!(matches!(err, GatewayError::Server { status: 503, ref message } if message == "maintenance"));
  }

  #[tokio::test]
  async fn test_network_error() {
    // Nothing listens on port 9 on loopback
    let transport = ApiTransport::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
    let err = NotificationsApi::new(transport)
      .unread_count()
      .await
      .unwrap_err();
    assert!(err.is_network());
  }
}
