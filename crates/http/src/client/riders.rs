//! Rider API client methods

use super::{ApiClient, ApiRequest, ClientError, FilePart};
use crate::types::{Rider, RiderLocationUpdate};
use serde::Serialize;
use serde_json::Value as JsonValue;

impl ApiClient {
    /// Get a rider profile
    pub async fn get_rider(&self, rider_id: &str) -> Result<Rider, ClientError> {
        self.send(ApiRequest::get(format!("/riders/{rider_id}")))
            .await
    }

    /// Update rider profile fields (including online status)
    pub async fn update_rider<T: Serialize + ?Sized>(
        &self,
        rider_id: &str,
        changes: &T,
    ) -> Result<Rider, ClientError> {
        let request = ApiRequest::patch(format!("/riders/{rider_id}")).json(changes)?;
        self.send(request).await
    }

    /// Replace the rider's photo
    pub async fn upload_rider_photo(
        &self,
        rider_id: &str,
        photo: FilePart,
    ) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post(format!("/riders/{rider_id}/photo")).multipart(vec![photo]);
        self.send(request).await
    }

    /// Delivery statistics for one rider
    pub async fn rider_performance(&self, rider_id: &str) -> Result<JsonValue, ClientError> {
        self.send(ApiRequest::get(format!("/riders/{rider_id}/performance")))
            .await
    }

    /// Report the rider's current position
    pub async fn update_rider_location(
        &self,
        update: &RiderLocationUpdate,
    ) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post("/riders/location").json(update)?;
        self.send(request).await
    }
}
