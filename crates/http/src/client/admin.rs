//! Admin API client methods

use super::{ApiClient, ApiRequest, ClientError};
use crate::types::{AdminInvite, AdminInviteRequest};

impl ApiClient {
    /// Create an invitation link for a new admin or rider
    pub async fn send_admin_invite(
        &self,
        invite: &AdminInviteRequest,
    ) -> Result<AdminInvite, ClientError> {
        let request = ApiRequest::post("/admin/invite").json(invite)?;
        self.send(request).await
    }
}
