//! Notification API client methods

use super::{ApiClient, ApiRequest, ClientError};
use crate::types::{Notification, SendNotificationRequest};
use serde_json::Value as JsonValue;

impl ApiClient {
    /// Notifications for the signed-in user
    pub async fn list_notifications(&self) -> Result<Vec<Notification>, ClientError> {
        self.send(ApiRequest::get("/notifications")).await
    }

    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<(), ClientError> {
        let request = ApiRequest::patch(format!("/notifications/{notification_id}/read"));
        self.execute(&request).await.map(|_| ())
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), ClientError> {
        let request = ApiRequest::patch("/notifications/read-all");
        self.execute(&request).await.map(|_| ())
    }

    /// Broadcast or target a notification (admins)
    pub async fn send_notification(
        &self,
        notification: &SendNotificationRequest,
    ) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post("/notifications/send").json(notification)?;
        self.send(request).await
    }
}
