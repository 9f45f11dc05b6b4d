//! Token refresh behaviour under concurrent expired requests

mod common;

use common::{Harness, bearer_tokens, envelope, failure, order_json};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use swiftmeal_http::client::error::SESSION_EXPIRED_MESSAGE;
use swiftmeal_http::types::OrderFilters;
use swiftmeal_http::{
    ApiClient, ClientError, Persistence, Session, SessionStore, TieredSessionStore,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BURST: usize = 5;

/// `path` rejects A1 and serves `body` for A2
async fn mount_expiring(server: &MockServer, path_str: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(path_str))
        .and(header("authorization", "Bearer A1"))
        .respond_with(failure(401, "jwt expired"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(path_str))
        .and(header("authorization", "Bearer A2"))
        .respond_with(envelope(body))
        .mount(server)
        .await;
}

async fn mount_refresh(server: &MockServer, response: ResponseTemplate, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .and(body_json(json!({ "refreshToken": "R1" })))
        .respond_with(response.set_delay(Duration::from_millis(200)))
        .expect(expected)
        .mount(server)
        .await;
}

fn rotated_tokens() -> ResponseTemplate {
    envelope(json!({ "accessToken": "A2", "refreshToken": "R2" }))
}

#[tokio::test]
async fn test_concurrent_expiry_triggers_one_refresh() {
    let mock_server = MockServer::start().await;
    mount_expiring(&mock_server, "/orders/o1", order_json("o1")).await;
    mount_refresh(&mock_server, rotated_tokens(), 1).await;

    let harness = Harness::new(&mock_server).signed_in("A1", Some("R1"));
    let results = join_all((0..BURST).map(|_| harness.client.get_order("o1"))).await;

    for result in results {
        assert_eq!(result.unwrap().id.as_deref(), Some("o1"));
    }

    // Each request went out once with A1 and was replayed once with A2.
    let tokens = bearer_tokens(&mock_server, "/orders/o1").await;
    assert_eq!(tokens.iter().filter(|t| *t == "A1").count(), BURST);
    assert_eq!(tokens.iter().filter(|t| *t == "A2").count(), BURST);

    // No replay left before the refresh answered.
    let first_replay = tokens.iter().position(|t| t == "A2").unwrap();
    assert!(tokens[first_replay..].iter().all(|t| t == "A2"));

    let session = harness.store.load().unwrap().unwrap();
    assert_eq!(session.access_token, "A2");
    assert_eq!(session.refresh_token.as_deref(), Some("R2"));
    assert!(!harness.client.refresh_state().is_refreshing());
    assert_eq!(harness.client.refresh_state().pending(), 0);
    assert!(harness.notifier.errors().is_empty());
    assert_eq!(harness.login_redirects(), 0);
}

#[tokio::test]
async fn test_refreshed_token_is_used_directly_afterwards() {
    let mock_server = MockServer::start().await;
    mount_expiring(&mock_server, "/orders/o1", order_json("o1")).await;
    mount_refresh(&mock_server, rotated_tokens(), 1).await;

    let harness = Harness::new(&mock_server).signed_in("A1", Some("R1"));
    harness.client.get_order("o1").await.unwrap();
    harness.client.get_order("o1").await.unwrap();

    let tokens = bearer_tokens(&mock_server, "/orders/o1").await;
    assert_eq!(tokens, vec!["A1", "A2", "A2"]);
}

#[tokio::test]
async fn test_failed_refresh_logs_out_once() {
    let mock_server = MockServer::start().await;
    mount_expiring(&mock_server, "/orders/o1", order_json("o1")).await;
    mount_refresh(&mock_server, failure(401, "Invalid refresh token"), 1).await;

    let harness = Harness::new(&mock_server).signed_in("A1", Some("R1"));
    let results = join_all((0..BURST).map(|_| harness.client.get_order("o1"))).await;

    for result in results {
        let error = result.unwrap_err();
        assert!(error.is_session_expired());
        assert_eq!(error.to_string(), SESSION_EXPIRED_MESSAGE);
    }

    assert!(harness.store.load().unwrap().is_none());
    assert_eq!(harness.login_redirects(), 1);
    assert_eq!(harness.notifier.errors(), vec![SESSION_EXPIRED_MESSAGE]);

    // Nothing was replayed.
    let tokens = bearer_tokens(&mock_server, "/orders/o1").await;
    assert!(tokens.iter().all(|t| t == "A1"));
    assert_eq!(harness.client.refresh_state().pending(), 0);
}

#[tokio::test]
async fn test_refresh_without_refresh_token_logs_out() {
    let mock_server = MockServer::start().await;
    mount_expiring(&mock_server, "/notifications", json!([])).await;
    mount_refresh(&mock_server, rotated_tokens(), 0).await;

    let harness = Harness::new(&mock_server).signed_in("A1", None);
    let error = harness.client.list_notifications().await.unwrap_err();

    assert!(matches!(error, ClientError::SessionExpired(_)));
    assert!(harness.access_token().is_none());
    assert_eq!(harness.login_redirects(), 1);
    assert_eq!(harness.notifier.errors(), vec![SESSION_EXPIRED_MESSAGE]);
}

#[tokio::test]
async fn test_rejected_replay_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/admin/only"))
        .respond_with(failure(401, "Not authorized for this resource"))
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_refresh(&mock_server, rotated_tokens(), 1).await;

    let harness = Harness::new(&mock_server).signed_in("A1", Some("R1"));
    let error = harness
        .client
        .execute(&swiftmeal_http::client::ApiRequest::get("/admin/only"))
        .await
        .unwrap_err();

    assert!(matches!(error, ClientError::Unauthorized(_)));
    assert_eq!(error.to_string(), "Not authorized for this resource");
    assert_eq!(harness.access_token().as_deref(), Some("A2"));
    assert_eq!(harness.login_redirects(), 0);
    assert!(harness.notifier.errors().is_empty());
}

#[tokio::test]
async fn test_refresh_survives_restart_in_durable_store() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session.json");

    TieredSessionStore::with_durable_file(&session_file)
        .save(&Session::new("A1", Some("R1".to_string()), Persistence::Durable))
        .unwrap();

    mount_expiring(&mock_server, "/favorites", json!([{ "_id": "f1" }])).await;
    mount_refresh(&mock_server, rotated_tokens(), 1).await;

    let store: Arc<dyn SessionStore> =
        Arc::new(TieredSessionStore::with_durable_file(&session_file));
    let harness = Harness::with_store(&mock_server, store);
    let favorites = harness.client.list_favorites().await.unwrap();
    assert_eq!(favorites[0].id, "f1");

    let reopened = TieredSessionStore::with_durable_file(&session_file)
        .load()
        .unwrap()
        .unwrap();
    assert_eq!(reopened.access_token, "A2");
    assert_eq!(reopened.refresh_token.as_deref(), Some("R2"));
    assert_eq!(reopened.persistence, Persistence::Durable);
}

#[tokio::test]
async fn test_dashboard_burst_across_endpoints() {
    let mock_server = MockServer::start().await;
    mount_expiring(
        &mock_server,
        "/orders",
        json!({ "orders": [order_json("o1")] }),
    )
    .await;
    mount_expiring(&mock_server, "/notifications", json!([])).await;
    mount_expiring(&mock_server, "/favorites", json!([])).await;
    mount_refresh(&mock_server, rotated_tokens(), 1).await;

    let harness = Harness::new(&mock_server).signed_in("A1", Some("R1"));
    let client = &harness.client;
    let filters = OrderFilters::default();

    let (orders, notifications, favorites) = tokio::join!(
        client.list_orders(&filters),
        client.list_notifications(),
        client.list_favorites(),
    );

    assert_eq!(orders.unwrap().orders.len(), 1);
    assert!(notifications.unwrap().is_empty());
    assert!(favorites.unwrap().is_empty());
    assert_eq!(harness.access_token().as_deref(), Some("A2"));
}

#[tokio::test]
async fn test_late_expiry_after_refresh_replays_without_refreshing() {
    let mock_server = MockServer::start().await;
    mount_expiring(&mock_server, "/orders/o1", order_json("o1")).await;
    mount_refresh(&mock_server, rotated_tokens(), 1).await;

    let harness = Harness::new(&mock_server).signed_in("A1", Some("R1"));
    harness.client.get_order("o1").await.unwrap();

    // A request that read A1 before the rotation comes back 401 afterwards.
    let state = harness.client.refresh_state();
    let store = Arc::clone(&harness.store);
    let slot = state.acquire_refresh_slot("A1", state.epoch(), || store.access_token().unwrap());
    assert!(matches!(
        slot,
        swiftmeal_http::client::refresh::RefreshSlot::Ready(ref token) if token == "A2"
    ));
}

#[tokio::test]
async fn test_fallback_redirect_without_navigator() {
    let mock_server = MockServer::start().await;
    mount_expiring(&mock_server, "/orders/o1", order_json("o1")).await;
    mount_refresh(&mock_server, failure(403, "Refresh token revoked"), 1).await;

    let redirects = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&redirects);
    let store = TieredSessionStore::in_memory();
    store
        .save(&Session::new("A1", Some("R1".to_string()), Persistence::Ephemeral))
        .unwrap();

    let client = ApiClient::builder()
        .base_url(mock_server.uri())
        .session_store(store)
        .fallback_redirect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    let error = client.get_order("o1").await.unwrap_err();
    assert!(error.is_session_expired());
    assert_eq!(redirects.load(Ordering::SeqCst), 1);
    assert!(client.session_store().load().unwrap().is_none());
}

#[tokio::test]
async fn test_login_after_logout_starts_clean() {
    let mock_server = MockServer::start().await;
    mount_expiring(&mock_server, "/orders/o1", order_json("o1")).await;
    mount_refresh(&mock_server, failure(401, "Invalid refresh token"), 1).await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(envelope(json!({ "accessToken": "A2", "refreshToken": "R2" })))
        .mount(&mock_server)
        .await;

    let harness = Harness::new(&mock_server).signed_in("A1", Some("R1"));
    assert!(harness.client.get_order("o1").await.is_err());
    assert_eq!(harness.login_redirects(), 1);

    let credentials = swiftmeal_http::types::LoginRequest {
        email: "ada@example.com".to_string(),
        password: "pw".to_string(),
    };
    harness.client.login(&credentials, false).await.unwrap();

    let order = harness.client.get_order("o1").await.unwrap();
    assert_eq!(order.id.as_deref(), Some("o1"));
    assert!(!harness.client.refresh_state().is_refreshing());
}

/// Refresh endpoint that answers slowly enough for a session change to land first
async fn mount_slow_refresh(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .respond_with(rotated_tokens().set_delay(Duration::from_millis(400)))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_during_refresh_keeps_new_session() {
    let mock_server = MockServer::start().await;
    mount_expiring(&mock_server, "/orders/o1", order_json("o1")).await;
    mount_slow_refresh(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(envelope(json!({ "accessToken": "B1", "refreshToken": "S1" })))
        .mount(&mock_server)
        .await;

    let harness = Harness::new(&mock_server).signed_in("A1", Some("R1"));
    let client = harness.client.clone();
    let pending = tokio::spawn(async move { client.get_order("o1").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.client.refresh_state().is_refreshing());

    let credentials = swiftmeal_http::types::LoginRequest {
        email: "grace@example.com".to_string(),
        password: "pw".to_string(),
    };
    harness.client.login(&credentials, true).await.unwrap();

    let error = pending.await.unwrap().unwrap_err();
    assert!(error.is_session_expired());

    // The old refresh result never reached the new session.
    let session = harness.store.load().unwrap().unwrap();
    assert_eq!(session.access_token, "B1");
    assert_eq!(session.refresh_token.as_deref(), Some("S1"));
    assert!(harness.notifier.errors().is_empty());
    assert_eq!(harness.login_redirects(), 0);
}

#[tokio::test]
async fn test_logout_during_refresh_redirects_once() {
    let mock_server = MockServer::start().await;
    mount_expiring(&mock_server, "/orders/o1", order_json("o1")).await;
    mount_slow_refresh(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(envelope(json!(null)))
        .mount(&mock_server)
        .await;

    let harness = Harness::new(&mock_server).signed_in("A1", Some("R1"));
    let client = harness.client.clone();
    let pending = tokio::spawn(async move { client.get_order("o1").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.client.logout().await.unwrap();
    assert_eq!(harness.login_redirects(), 1);

    let error = pending.await.unwrap().unwrap_err();
    assert!(error.is_session_expired());

    // The refreshed pair was discarded and nothing was shown twice.
    assert!(harness.store.load().unwrap().is_none());
    assert!(harness.notifier.errors().is_empty());
    assert_eq!(harness.login_redirects(), 1);
    assert!(!harness.client.refresh_state().is_refreshing());
}
