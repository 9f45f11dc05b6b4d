//! Shared fixtures for client integration tests

#![allow(dead_code)]

use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use swiftmeal_http::client::notify::Notifier;
use swiftmeal_http::{ApiClient, Persistence, Session, SessionStore, TieredSessionStore};
use wiremock::{MockServer, ResponseTemplate};

/// Notifier that keeps every message
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    errors: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

/// Everything a test needs to inspect after driving the client
pub struct Harness {
    pub client: ApiClient,
    pub store: Arc<dyn SessionStore>,
    pub notifier: RecordingNotifier,
    pub logins: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(server: &MockServer) -> Self {
        Self::with_store(server, Arc::new(TieredSessionStore::in_memory()))
    }

    pub fn with_store(server: &MockServer, store: Arc<dyn SessionStore>) -> Self {
        let notifier = RecordingNotifier::default();
        let logins = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&logins);

        let client = ApiClient::builder()
            .base_url(server.uri())
            .shared_session_store(Arc::clone(&store))
            .notifier(notifier.clone())
            .navigator(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        Self {
            client,
            store,
            notifier,
            logins,
        }
    }

    /// Store a session as if the user had logged in earlier
    pub fn signed_in(self, access_token: &str, refresh_token: Option<&str>) -> Self {
        self.store
            .save(&Session::new(
                access_token,
                refresh_token.map(str::to_string),
                Persistence::Durable,
            ))
            .unwrap();
        self
    }

    pub fn login_redirects(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token().unwrap()
    }
}

/// `{ success: true, data }` response
pub fn envelope(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

/// Error response with a server message
pub fn failure(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({ "success": false, "message": message }))
}

pub fn order_json(id: &str) -> Value {
    json!({
        "_id": id,
        "orderNumber": format!("SM-{id}"),
        "status": "preparing",
        "isDelayed": false,
        "items": []
    })
}

/// Bearer tokens of the requests the server saw for `path`, in arrival order
pub async fn bearer_tokens(server: &MockServer, path: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == path)
        .filter_map(|request| {
            request
                .headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim_start_matches("Bearer ").to_string())
        })
        .collect()
}
