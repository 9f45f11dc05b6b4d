//! User profile API client methods

use super::{ApiClient, ApiRequest, ClientError, FilePart};
use crate::types::{UpdatePasswordRequest, User};
use serde::Serialize;
use serde_json::Value as JsonValue;

impl ApiClient {
    /// Get a user profile
    pub async fn get_user(&self, user_id: &str) -> Result<User, ClientError> {
        self.send(ApiRequest::get(format!("/users/{user_id}"))).await
    }

    /// Update profile fields
    pub async fn update_user<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        changes: &T,
    ) -> Result<User, ClientError> {
        let request = ApiRequest::patch(format!("/users/{user_id}")).json(changes)?;
        let user: User = self.send(request).await?;

        // Keep the stored account in step when users edit themselves.
        if self.current_user()?.is_some_and(|current| current.id == user.id) {
            self.session_store().update_user(&user)?;
            debug!(user_id, "Stored user updated");
        }
        Ok(user)
    }

    /// Change the account password
    pub async fn update_password(
        &self,
        user_id: &str,
        request: &UpdatePasswordRequest,
    ) -> Result<(), ClientError> {
        let req = ApiRequest::patch(format!("/users/{user_id}/password")).json(request)?;
        self.execute(&req).await.map(|_| ())
    }

    /// Replace the profile photo
    pub async fn upload_user_photo(
        &self,
        user_id: &str,
        photo: FilePart,
    ) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post(format!("/users/{user_id}/photo")).multipart(vec![photo]);
        self.send(request).await
    }
}
