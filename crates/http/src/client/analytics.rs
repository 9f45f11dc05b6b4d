//! Admin analytics API client methods

use super::{ApiClient, ApiRequest, ClientError};
use crate::types::AnalyticsQuery;
use serde_json::Value as JsonValue;

impl ApiClient {
    /// Delays grouped by area and hour
    pub async fn delay_heatmap(&self, query: &AnalyticsQuery) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::get("/analytics/delays/heatmap").query(query)?;
        self.send(request).await
    }

    /// Delay counts over time
    pub async fn delay_trends(&self, query: &AnalyticsQuery) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::get("/analytics/delays/trends").query(query)?;
        self.send(request).await
    }

    /// Side-by-side rider statistics
    pub async fn rider_performance_comparison(&self) -> Result<JsonValue, ClientError> {
        self.send(ApiRequest::get("/analytics/riders/performance"))
            .await
    }
}
