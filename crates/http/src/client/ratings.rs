//! Rating API client methods

use super::{ApiClient, ApiRequest, ClientError};
use crate::types::RatingRequest;
use serde_json::{Value as JsonValue, json};

impl ApiClient {
    /// Rate a delivered order
    pub async fn create_rating(&self, rating: &RatingRequest) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post("/ratings").json(rating)?;
        self.send(request).await
    }

    pub async fn ratings_for_order(&self, order_id: &str) -> Result<Vec<JsonValue>, ClientError> {
        let request = ApiRequest::get("/ratings").query(&json!({ "orderId": order_id }))?;
        self.send(request).await
    }
}
