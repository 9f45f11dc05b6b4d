//! Swiftmeal API client
//!
//! Every call runs through [`ApiClient::execute`]:
//!
//! 1. the current access token is read from the session store and attached
//!    as a bearer credential (anonymous requests skip this);
//! 2. a 2xx body has its `{ success, data }` envelope stripped;
//! 3. a 401 on an authenticated request joins the refresh protocol in
//!    [`refresh`] and is replayed once with the new token;
//! 4. any other failure becomes a [`ClientError`] with a user-readable
//!    message and is shown once through the [`Notifier`].

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod error;
pub mod favorites;
pub mod notifications;
pub mod notify;
pub mod orders;
pub mod payments;
pub mod ratings;
pub mod refresh;
pub mod riders;
pub mod users;

use crate::config::{BackoffPolicy, ClientConfig};
use crate::session::{Session, SessionStore, TieredSessionStore};
use error::{ClientError, GENERIC_MESSAGE, SESSION_EXPIRED_MESSAGE};
use notify::{HardRedirect, Navigator, Notifier, TracingNotifier};
use refresh::{RefreshOutcome, RefreshSlot, RefreshState};
use reqwest::{Client, ClientBuilder, Method, Response, StatusCode, header, multipart};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Token refresh endpoint, relative to the base URL
pub const REFRESH_PATH: &str = "/auth/refresh-token";

const DEFAULT_USER_AGENT: &str = concat!("swiftmeal-client/", env!("CARGO_PKG_VERSION"));

// Longer plain-text bodies are error pages, not messages.
const MAX_PLAIN_MESSAGE_LEN: usize = 200;

/// Body of an API request
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Sent as `application/json`
    Json(JsonValue),
    /// Sent as `multipart/form-data`
    Multipart(Vec<FilePart>),
}

/// One file in a multipart upload
#[derive(Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(
        field: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    /// Set the part's MIME type
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn to_part(&self) -> Result<multipart::Part, ClientError> {
        let part = multipart::Part::bytes(self.bytes.clone()).file_name(self.file_name.clone());
        match &self.content_type {
            Some(content_type) => part.mime_str(content_type).map_err(|e| {
                ClientError::Configuration(format!("invalid content type '{content_type}': {e}"))
            }),
            None => Ok(part),
        }
    }
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A call to the API that can be sent again verbatim
///
/// The refresh protocol replays a request after the token changes, so the
/// request is kept as data instead of a one-shot `reqwest::RequestBuilder`.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: RequestBody,
    anonymous: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            anonymous: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach query parameters from a flat struct or map
    ///
    /// `null` fields are skipped; non-string scalars are sent in their JSON
    /// spelling.
    pub fn query<T: Serialize + ?Sized>(mut self, params: &T) -> Result<Self, ClientError> {
        match serde_json::to_value(params)? {
            JsonValue::Object(map) => {
                for (key, value) in map {
                    let value = match value {
                        JsonValue::Null => continue,
                        JsonValue::String(value) => value,
                        other => other.to_string(),
                    };
                    self.query.push((key, value));
                }
                Ok(self)
            }
            JsonValue::Null => Ok(self),
            other => Err(ClientError::Configuration(format!(
                "query parameters must serialize to an object, got {other}"
            ))),
        }
    }

    /// Attach a multipart upload
    #[must_use]
    pub fn multipart(mut self, parts: Vec<FilePart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    /// Send without credentials and never refresh on 401
    #[must_use]
    pub const fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub const fn body(&self) -> &RequestBody {
        &self.body
    }

    pub const fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<RefreshedTokens>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshedTokens {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Swiftmeal API client
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    navigator: Option<Arc<dyn Navigator>>,
    fallback_redirect: Arc<dyn Navigator>,
    refresh: RefreshState,
    payment_poll: BackoffPolicy,
}

impl ApiClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Builder preloaded from configuration
    pub fn builder_from_config(config: &ClientConfig) -> ApiClientBuilder {
        let mut builder = Self::builder()
            .base_url(config.api_url.clone())
            .fallback_redirect(HardRedirect::new(config.login_path.clone()))
            .payment_poll(config.payment_poll.clone());

        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        builder
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Store holding the current session
    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Shared refresh coordination state
    pub const fn refresh_state(&self) -> &RefreshState {
        &self.refresh
    }

    /// Send a request and decode its unwrapped payload
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let payload = self.execute(&request).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Send a request and return its unwrapped payload
    pub async fn execute(&self, request: &ApiRequest) -> Result<JsonValue, ClientError> {
        let result = self.execute_with_refresh(request).await;
        if let Err(error) = &result {
            self.report(error);
        }
        result
    }

    /// Like [`send`](Self::send) but leaves reporting to the caller
    async fn send_quietly<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ClientError> {
        let payload = self.execute_with_refresh(request).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Show a failure through the notification surface
    ///
    /// Authentication failures are skipped; the refresh flow reports those
    /// once per burst.
    fn report(&self, error: &ClientError) {
        if error.is_user_facing() {
            self.notifier.error(&error.to_string());
        }
    }

    async fn execute_with_refresh(&self, request: &ApiRequest) -> Result<JsonValue, ClientError> {
        // Taken before the token so a session swap in between is detected.
        let epoch = self.refresh.epoch();
        let token = if request.anonymous {
            None
        } else {
            self.store.access_token()?
        };

        let response = self.dispatch(request, token.as_deref()).await?;
        let Some(stale) = token else {
            return Self::settle(response).await;
        };
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::settle(response).await;
        }

        debug!(method = %request.method, path = %request.path, "Access token rejected");
        let token = self.recover_access_token(&stale, epoch).await?;

        // A second 401 is returned as-is; the request is never queued twice.
        let replay = self.dispatch(request, Some(&token)).await?;
        Self::settle(replay).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(parts) => {
                let mut form = multipart::Form::new();
                for part in parts {
                    form = form.part(part.field.clone(), part.to_part()?);
                }
                builder.multipart(form)
            }
        };

        debug!(
            method = %request.method,
            path = %request.path,
            authenticated = token.is_some(),
            "Dispatching request"
        );
        builder.send().await.map_err(|e| ClientError::network(&e))
    }

    async fn settle(response: Response) -> Result<JsonValue, ClientError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::network(&e))?;

        if status.is_success() {
            unwrap_envelope(&body)
        } else {
            Err(ClientError::from_status(status, server_message(&body)))
        }
    }

    /// Get a token to replay with after `stale` was rejected
    ///
    /// `epoch` is the refresh epoch the request started in.
    async fn recover_access_token(&self, stale: &str, epoch: u64) -> Result<String, ClientError> {
        let store = Arc::clone(&self.store);
        let slot = self.refresh.acquire_refresh_slot(stale, epoch, || {
            store.access_token().unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read session during refresh");
                None
            })
        });

        let leader = match slot {
            RefreshSlot::Ready(token) => {
                debug!("Replaying with token from a settled refresh");
                return Ok(token);
            }
            RefreshSlot::Expired => return Err(ClientError::session_expired()),
            RefreshSlot::Follower(outcome) => {
                return match outcome.await {
                    Ok(RefreshOutcome::Refreshed(token)) => Ok(token),
                    Ok(RefreshOutcome::Failed) | Err(_) => Err(ClientError::session_expired()),
                };
            }
            RefreshSlot::Leader(leader) => leader,
        };

        let result = self.refresh_access_token().await;

        // Runs under the refresh lock; skipped once a login or logout reset it.
        let settled = leader.settle_with(|| match result {
            Ok(tokens) => match self
                .store
                .replace_access_token(&tokens.access_token, tokens.refresh_token.as_deref())
            {
                Ok(()) => (
                    RefreshOutcome::Refreshed(tokens.access_token.clone()),
                    Ok(tokens.access_token),
                ),
                Err(e) => {
                    self.clear_session();
                    (RefreshOutcome::Failed, Err(ClientError::from(e)))
                }
            },
            Err(reason) => {
                // Cleared first so late failures of this burst see no session.
                self.clear_session();
                (RefreshOutcome::Failed, Err(reason))
            }
        });

        let Some((result, released)) = settled else {
            debug!("Session changed during token refresh, discarding result");
            return Err(ClientError::session_expired());
        };

        match result {
            Ok(token) => {
                info!(released, "Access token refreshed");
                Ok(token)
            }
            Err(reason) => {
                warn!(released, reason = %reason, "Token refresh failed, logging out");
                self.notifier.error(SESSION_EXPIRED_MESSAGE);
                self.navigate_to_login();
                Err(ClientError::session_expired())
            }
        }
    }

    /// Exchange the stored refresh token for a new pair
    async fn refresh_access_token(&self) -> Result<RefreshedTokens, ClientError> {
        let refresh_token = self
            .store
            .load()?
            .and_then(|session| session.refresh_token)
            .ok_or_else(|| ClientError::Unauthorized("No refresh token available".to_string()))?;

        let url = format!("{}{}", self.base_url, REFRESH_PATH);
        let response = self
            .client
            .post(url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .map_err(|e| ClientError::network(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::network(&e))?;
        if !status.is_success() {
            return Err(ClientError::from_status(status, server_message(&body)));
        }

        let envelope: RefreshEnvelope = serde_json::from_str(&body)?;
        let tokens = match envelope {
            RefreshEnvelope {
                success: true,
                data: Some(tokens),
            } => tokens,
            _ => {
                return Err(ClientError::Unauthorized(
                    "Refresh response carried no access token".to_string(),
                ));
            }
        };

        Ok(tokens)
    }

    /// Store a fresh session, dropping any refresh state from the last one
    pub fn start_session(&self, session: &Session) -> Result<(), ClientError> {
        self.refresh.reset();
        self.store.save(session)?;
        Ok(())
    }

    /// Remove the session and send the user to the login view
    pub fn end_session(&self) {
        self.refresh.reset();
        self.clear_session();
        self.navigate_to_login();
    }

    fn clear_session(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear session");
        }
    }

    fn navigate_to_login(&self) {
        match &self.navigator {
            Some(navigator) => navigator.navigate_to_login(),
            None => self.fallback_redirect.navigate_to_login(),
        }
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("refreshing", &self.refresh.is_refreshing())
            .finish_non_exhaustive()
    }
}

/// Strip the `{ success, data }` envelope from a 2xx body
fn unwrap_envelope(body: &str) -> Result<JsonValue, ClientError> {
    if body.trim().is_empty() {
        return Ok(JsonValue::Null);
    }

    match serde_json::from_str(body)? {
        JsonValue::Object(mut map) if map.contains_key("success") => {
            if map.get("success") == Some(&JsonValue::Bool(false)) {
                let message = message_field(&map).unwrap_or_else(|| GENERIC_MESSAGE.to_string());
                return Err(ClientError::Rejected(message));
            }
            Ok(map.remove("data").unwrap_or(JsonValue::Null))
        }
        other => Ok(other),
    }
}

/// Message the server put in an error body, if any
fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<JsonValue>(trimmed) {
        Ok(JsonValue::Object(map)) => message_field(&map),
        Ok(JsonValue::String(message)) => Some(message),
        Ok(_) => None,
        Err(_) if trimmed.len() <= MAX_PLAIN_MESSAGE_LEN && !trimmed.starts_with('<') => {
            Some(trimmed.to_string())
        }
        Err(_) => None,
    }
}

fn message_field(map: &Map<String, JsonValue>) -> Option<String> {
    match (map.get("message"), map.get("error")) {
        (Some(JsonValue::String(message)), _) | (_, Some(JsonValue::String(message)))
            if !message.trim().is_empty() =>
        {
            Some(message.clone())
        }
        (_, Some(JsonValue::Object(error))) => match error.get("message") {
            Some(JsonValue::String(message)) => Some(message.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    store: Option<Arc<dyn SessionStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    navigator: Option<Arc<dyn Navigator>>,
    fallback_redirect: Option<Arc<dyn Navigator>>,
    payment_poll: Option<BackoffPolicy>,
}

impl ApiClientBuilder {
    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Set the session store
    #[must_use]
    pub fn session_store(self, store: impl SessionStore + 'static) -> Self {
        self.shared_session_store(Arc::new(store))
    }

    /// Set a session store that the host also holds
    #[must_use]
    pub fn shared_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the notification surface
    #[must_use]
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Register the login navigation callback
    #[must_use]
    pub fn navigator(mut self, navigator: impl Navigator + 'static) -> Self {
        self.navigator = Some(Arc::new(navigator));
        self
    }

    /// Set the redirect used when no navigation callback is registered
    #[must_use]
    pub fn fallback_redirect(mut self, redirect: impl Navigator + 'static) -> Self {
        self.fallback_redirect = Some(Arc::new(redirect));
        self
    }

    /// Set the payment confirmation polling schedule
    #[must_use]
    pub fn payment_poll(mut self, policy: BackoffPolicy) -> Self {
        self.payment_poll = Some(policy);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|e| ClientError::Configuration(format!("invalid base_url '{base_url}': {e}")))?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let mut client_builder = ClientBuilder::new().default_headers(default_headers);
        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }
        client_builder = client_builder
            .user_agent(self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()));

        let client = client_builder
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(ApiClient {
            client,
            base_url,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(TieredSessionStore::in_memory())),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
            navigator: self.navigator,
            fallback_redirect: self
                .fallback_redirect
                .unwrap_or_else(|| Arc::new(HardRedirect::default())),
            refresh: RefreshState::new(),
            payment_poll: self.payment_poll.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_is_stripped() {
        let payload = unwrap_envelope(r#"{"success":true,"data":{"id":"o1"}}"#).unwrap();
        assert_eq!(payload, json!({ "id": "o1" }));
    }

    #[test]
    fn test_envelope_without_data_is_null() {
        let payload = unwrap_envelope(r#"{"success":true,"message":"Marked as read"}"#).unwrap();
        assert_eq!(payload, JsonValue::Null);
    }

    #[test]
    fn test_bare_body_passes_through() {
        assert_eq!(unwrap_envelope("[1,2]").unwrap(), json!([1, 2]));
        assert_eq!(unwrap_envelope("").unwrap(), JsonValue::Null);
    }

    #[test]
    fn test_unsuccessful_envelope_is_an_error() {
        let error = unwrap_envelope(r#"{"success":false,"message":"Cart is empty"}"#).unwrap_err();
        assert!(matches!(error, ClientError::Rejected(_)));
        assert_eq!(error.status(), None);
        assert_eq!(error.to_string(), "Cart is empty");
    }

    #[test]
    fn test_server_message_sources() {
        assert_eq!(
            server_message(r#"{"success":false,"message":"Order not found"}"#).as_deref(),
            Some("Order not found")
        );
        assert_eq!(
            server_message(r#"{"error":"Email already registered"}"#).as_deref(),
            Some("Email already registered")
        );
        assert_eq!(
            server_message(r#"{"error":{"message":"Slow down"}}"#).as_deref(),
            Some("Slow down")
        );
        assert_eq!(server_message("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert_eq!(server_message("<html><body>502</body></html>"), None);
        assert_eq!(server_message(""), None);
        assert_eq!(server_message(r#"{"message":""}"#), None);
    }

    #[test]
    fn test_query_skips_nulls() {
        let request = ApiRequest::get("/orders")
            .query(&json!({ "status": "active", "page": 2, "area": null }))
            .unwrap();

        let mut pairs = request.query_pairs().to_vec();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("page".to_string(), "2".to_string()),
                ("status".to_string(), "active".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_rejects_scalars() {
        let result = ApiRequest::get("/orders").query(&7);
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:5000/api/v1/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/api/v1");
    }

    #[test]
    fn test_builder_rejects_invalid_url() {
        let result = ApiClient::new("not a url");
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }
}
