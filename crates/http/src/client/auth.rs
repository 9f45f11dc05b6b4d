//! Authentication API client methods

use super::{ApiClient, ApiRequest, ClientError};
use crate::session::{Persistence, Session, SessionInfo};
use crate::types::{
    LoginRequest, LoginResponse, RegisterRequest, ResetPasswordRequest, User, VerifyEmailRequest,
};
use serde_json::{Value as JsonValue, json};

impl ApiClient {
    /// Create an account
    pub async fn register(&self, request: &RegisterRequest) -> Result<JsonValue, ClientError> {
        let req = ApiRequest::post("/auth/register").json(request)?.anonymous();
        self.send(req).await
    }

    /// Sign in and keep the session in the tier picked by `remember_me`
    pub async fn login(
        &self,
        credentials: &LoginRequest,
        remember_me: bool,
    ) -> Result<LoginResponse, ClientError> {
        let req = ApiRequest::post("/auth/login").json(credentials)?.anonymous();
        let response: LoginResponse = self.send(req).await?;

        let session = Session::new(
            response.access_token.clone(),
            response.refresh_token.clone(),
            Persistence::from_remember_me(remember_me),
        )
        .with_user(response.user.clone());
        self.start_session(&session)?;

        info!(
            email = %credentials.email,
            role = session.user.as_ref().and_then(|user| user.role.as_deref()),
            persistence = %session.persistence,
            "Logged in"
        );
        Ok(response)
    }

    /// Confirm an email address with the code sent to it
    pub async fn verify_email(
        &self,
        request: &VerifyEmailRequest,
    ) -> Result<JsonValue, ClientError> {
        let req = ApiRequest::post("/auth/verify-email").json(request)?.anonymous();
        self.send(req).await
    }

    /// Send a new verification code
    pub async fn resend_code(&self, email: &str) -> Result<(), ClientError> {
        let req = ApiRequest::post("/auth/resend-code")
            .json(&json!({ "email": email }))?
            .anonymous();
        self.execute(&req).await.map(|_| ())
    }

    /// Start the password reset flow
    pub async fn forgot_password(&self, email: &str) -> Result<(), ClientError> {
        let req = ApiRequest::post("/auth/forgot-password")
            .json(&json!({ "email": email }))?
            .anonymous();
        self.execute(&req).await.map(|_| ())
    }

    /// Finish the password reset flow
    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<(), ClientError> {
        let req = ApiRequest::post("/auth/reset-password")
            .json(request)?
            .anonymous();
        self.execute(&req).await.map(|_| ())
    }

    /// Sign out
    ///
    /// The server is told on a best-effort basis; the local session is
    /// cleared and the user sent to login regardless of its answer.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Some(session) = self.session_store().load()? {
            let req = ApiRequest::post("/auth/logout");
            match self.dispatch(&req, Some(&session.access_token)).await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    debug!(status = %response.status(), "Server-side logout was not accepted");
                }
                Err(e) => debug!(error = %e, "Server-side logout failed"),
            }
        }

        self.end_session();
        info!("Logged out");
        Ok(())
    }

    /// Tier and account of the stored session, if one exists
    pub fn restore_session(&self) -> Result<Option<SessionInfo>, ClientError> {
        Ok(self.session_store().load()?.map(SessionInfo::from))
    }

    /// Account of the stored session
    pub fn current_user(&self) -> Result<Option<User>, ClientError> {
        Ok(self.session_store().load()?.and_then(|session| session.user))
    }
}
