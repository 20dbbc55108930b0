use super::error::GatewayError;
use super::transport::ApiTransport;
use super::types::{HelpfulCount, Review, ReviewDraft, ReviewPage};

/// Review endpoints.
#[derive(Clone)]
pub struct ReviewsApi {
  transport: ApiTransport,
}

impl ReviewsApi {
  pub fn new(transport: ApiTransport) -> Self {
    Self { transport }
  }

  pub async fn list(&self, cake_id: &str, page: u32, limit: u32) -> Result<ReviewPage, GatewayError> {
    let req = self
      .transport
      .get(&["cakes", cake_id, "reviews"])?
      .query(&[("page", page), ("limit", limit)]);
    self
      .transport
      .send_json(req, &format!("reviews for cake {}", cake_id))
      .await
  }

  pub async fn get(&self, id: &str) -> Result<Review, GatewayError> {
    let req = self.transport.get(&["reviews", id])?;
    self.transport.send_data(req, &format!("review {}", id)).await
  }

  pub async fn create(&self, cake_id: &str, draft: &ReviewDraft) -> Result<Review, GatewayError> {
    let req = self
      .transport
      .post(&["cakes", cake_id, "reviews"])?
      .json(draft);
    self
      .transport
      .send_data(req, &format!("reviews for cake {}", cake_id))
      .await
  }

  pub async fn update(&self, id: &str, draft: &ReviewDraft) -> Result<Review, GatewayError> {
    let req = self.transport.put(&["reviews", id])?.json(draft);
    self.transport.send_data(req, &format!("review {}", id)).await
  }

  pub async fn delete(&self, id: &str) -> Result<(), GatewayError> {
    let req = self.transport.delete(&["reviews", id])?;
    self.transport.send_empty(req, &format!("review {}", id)).await
  }

  pub async fn mark_helpful(&self, id: &str) -> Result<u32, GatewayError> {
    let req = self.transport.post(&["reviews", id, "helpful"])?;
    let count: HelpfulCount = self
      .transport
      .send_data(req, &format!("review {}", id))
      .await?;
    Ok(count.helpful_count)
  }
}
