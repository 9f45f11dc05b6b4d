//! Favorites API client methods

use super::{ApiClient, ApiRequest, ClientError};
use crate::types::Favorite;
use serde::Serialize;

impl ApiClient {
    pub async fn list_favorites(&self) -> Result<Vec<Favorite>, ClientError> {
        self.send(ApiRequest::get("/favorites")).await
    }

    /// Save a restaurant, dish or address
    pub async fn add_favorite<T: Serialize + ?Sized>(
        &self,
        favorite: &T,
    ) -> Result<Favorite, ClientError> {
        let request = ApiRequest::post("/favorites").json(favorite)?;
        self.send(request).await
    }

    pub async fn remove_favorite(&self, favorite_id: &str) -> Result<(), ClientError> {
        let request = ApiRequest::delete(format!("/favorites/{favorite_id}"));
        self.execute(&request).await.map(|_| ())
    }
}
