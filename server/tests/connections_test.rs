//! HTTP Integration Tests for the Connection Lifecycle API
//!
//! Covers the handshake endpoints and page management:
//! - POST /connect/start
//! - GET  /connect/callback
//! - GET  /pages, GET /pages/{id}
//! - POST /pages/{id}/refresh
//! - POST /pages/{id}/revoke
//!
//! Run with: `cargo test --test connections_test -- --ignored --nocapture`
//! (needs the test containers documented on `Config::default_for_test`)

mod helpers;

use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::http::Method;
use chrono::{Duration, Utc};
use helpers::{
    body_to_json, create_test_connection, create_test_user, generate_access_token, make_admin,
    set_connection_status, TestApp,
};
use hl_server::provider::{MockProviderClient, ProviderError};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use url::Url;
use uuid::Uuid;

// ============================================================================
// Handshake Helpers
// ============================================================================

/// A unique external page ID so concurrent test runs never collide on the
/// one-live-connection-per-page index.
fn unique_page_id(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().to_string()[..8])
}

/// POST /connect/start and pull the state token out of the authorize URL.
async fn start_handshake(app: &TestApp, token: &str) -> String {
    let request = TestApp::request(Method::POST, "/connect/start")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::to_string(&json!({
                "pageUrl": "https://pages.example.com/acme-careers"
            }))
            .unwrap(),
        ))
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 200, "Handshake start should succeed");

    let body = body_to_json(response).await;
    assert_eq!(body["success"], true);
    let authorize_url = body["authorizeUrl"].as_str().expect("authorizeUrl missing");

    Url::parse(authorize_url)
        .expect("authorize URL should parse")
        .query_pairs()
        .find_map(|(k, v)| (k == "state").then(|| v.into_owned()))
        .expect("authorize URL should carry a state token")
}

/// GET /connect/callback with a code and state, returning the Location header.
async fn run_callback(app: &TestApp, code: &str, state: &str) -> String {
    let request = TestApp::request(
        Method::GET,
        &format!("/connect/callback?code={code}&state={state}"),
    )
    .body(Body::empty())
    .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 303, "Callback should redirect");
    response.headers()["location"].to_str().unwrap().to_string()
}

/// Fetch status columns of a connection row by external page ID.
async fn connection_state(pool: &PgPool, external_page_id: &str) -> (String, String) {
    sqlx::query_as::<_, (String, String)>(
        "SELECT status::TEXT, webhook_status::TEXT FROM page_connections WHERE external_page_id = $1",
    )
    .bind(external_page_id)
    .fetch_one(pool)
    .await
    .expect("connection row should exist")
}

// ============================================================================
// POST /connect/start
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_start_connection_unauthenticated() {
    let app = helpers::fresh_test_app().await;

    let request = TestApp::request(Method::POST, "/connect/start")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::to_string(&json!({"pageUrl": "https://pages.example.com/acme"})).unwrap(),
        ))
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 401);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_start_connection_requires_page_url() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    let request = TestApp::request(Method::POST, "/connect/start")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::to_string(&json!({"pageUrl": "   "})).unwrap(),
        ))
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 400);

    let body = body_to_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "MISSING_PAGE_URL");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_start_connection_rejects_foreign_host() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    // Test config allows only pages.example.com
    let request = TestApp::request(Method::POST, "/connect/start")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::to_string(&json!({"pageUrl": "https://evil.example.net/acme"})).unwrap(),
        ))
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 400);

    let body = body_to_json(response).await;
    assert_eq!(body["error"], "INVALID_PAGE_URL");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_start_connection_returns_authorize_url() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    let state = start_handshake(&app, &token).await;

    // The state token is an opaque 32-byte hex string
    assert_eq!(state.len(), 64);
    assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
}

// ============================================================================
// GET /connect/callback
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_callback_completes_connection() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    let external_id = unique_page_id("page-cb");
    app.provider
        .set_exchange(Ok(MockProviderClient::grant(&external_id, "Acme Careers", 60)));

    let state = start_handshake(&app, &token).await;
    let location = run_callback(&app, "test-code", &state).await;

    assert!(
        location.starts_with("http://localhost:5173/connect/result"),
        "Should land on the dashboard result screen: {location}"
    );
    assert!(location.contains("success=true"), "{location}");
    // The redirect never carries the page access token
    assert!(!location.contains("mock-token"), "{location}");

    let (status, webhook_status) = connection_state(&app.pool, &external_id).await;
    assert_eq!(status, "connected");
    assert_eq!(webhook_status, "subscribed");
    assert_eq!(app.provider.exchange_calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.provider.subscribe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_callback_state_is_single_use() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    app.provider.set_exchange(Ok(MockProviderClient::grant(
        &unique_page_id("page-replay"),
        "Acme Careers",
        60,
    )));

    let state = start_handshake(&app, &token).await;

    let first = run_callback(&app, "test-code", &state).await;
    assert!(first.contains("success=true"), "{first}");

    // Replaying the callback must fail without a second code exchange
    let second = run_callback(&app, "test-code", &state).await;
    assert!(second.contains("error="), "{second}");
    assert!(!second.contains("success=true"), "{second}");
    assert_eq!(app.provider.exchange_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_callback_rejects_unknown_state() {
    let app = helpers::fresh_test_app().await;

    let location = run_callback(&app, "test-code", &"f".repeat(64)).await;
    assert!(location.contains("error="), "{location}");
    assert_eq!(app.provider.exchange_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_callback_provider_error_short_circuits() {
    let app = helpers::fresh_test_app().await;

    let request = TestApp::request(
        Method::GET,
        "/connect/callback?error=access_denied&error_description=user+backed+out",
    )
    .body(Body::empty())
    .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 303);

    let location = response.headers()["location"].to_str().unwrap();
    assert!(location.contains("error="), "{location}");
    assert!(!location.contains("success=true"), "{location}");
    // No exchange is attempted when the provider already said no
    assert_eq!(app.provider.exchange_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_callback_requires_code_and_state() {
    let app = helpers::fresh_test_app().await;

    let request = TestApp::request(Method::GET, "/connect/callback")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 303);

    let location = response.headers()["location"].to_str().unwrap();
    assert!(location.contains("error="), "{location}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_reconnect_replaces_live_connection() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    let external_id = unique_page_id("page-redo");

    app.provider
        .set_exchange(Ok(MockProviderClient::grant(&external_id, "Acme Careers", 10)));
    let state = start_handshake(&app, &token).await;
    let first = run_callback(&app, "test-code", &state).await;
    assert!(first.contains("success=true"), "{first}");

    // Reconnect the same page through a fresh handshake
    app.provider.set_exchange(Ok(MockProviderClient::grant(
        &external_id,
        "Acme Careers (renamed)",
        90,
    )));
    let state = start_handshake(&app, &token).await;
    let second = run_callback(&app, "test-code", &state).await;
    assert!(second.contains("success=true"), "{second}");

    let rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM page_connections WHERE external_page_id = $1",
    )
    .bind(&external_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(rows, 1, "Reconnecting must refresh the live row in place");

    let name: String =
        sqlx::query_scalar("SELECT page_name FROM page_connections WHERE external_page_id = $1")
            .bind(&external_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(name, "Acme Careers (renamed)");
}

// ============================================================================
// GET /pages and GET /pages/{id}
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_list_pages_reports_days_remaining() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);
    let page_id = create_test_connection(&app.pool, user_id, Utc::now() + Duration::days(40)).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    let request = TestApp::request(Method::GET, "/pages")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 200);

    let body = body_to_json(response).await;
    let page = body["pages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == page_id.to_string())
        .expect("created page should be listed");

    let days = page["daysRemaining"].as_i64().unwrap();
    assert!((39..=40).contains(&days), "got {days}");
    assert_eq!(page["status"], "connected");
    assert_eq!(page["webhookStatus"], "subscribed");
    assert_eq!(page["ownerId"], user_id.to_string());

    // Tokens never show up in list responses, sealed or otherwise
    let raw = serde_json::to_string(&body).unwrap();
    assert!(!raw.contains("accessToken"));
    assert!(!raw.contains("test-access-token"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_get_page_not_found() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    let request = TestApp::request(Method::GET, &format!("/pages/{}", Uuid::now_v7()))
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 404);

    let body = body_to_json(response).await;
    assert_eq!(body["error"], "CONNECTION_NOT_FOUND");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_get_page_rejects_malformed_id() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    let request = TestApp::request(Method::GET, "/pages/not-a-page-id")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 400);

    let body = body_to_json(response).await;
    assert_eq!(body["error"], "MISSING_PAGE_ID");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_list_pages_unauthenticated() {
    let app = helpers::fresh_test_app().await;

    let request = TestApp::request(Method::GET, "/pages")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 401);
}

// ============================================================================
// POST /pages/{id}/refresh
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_refresh_extends_expiry_and_reconnects() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);
    let page_id = create_test_connection(&app.pool, user_id, Utc::now() + Duration::days(3)).await;
    set_connection_status(&app.pool, page_id, "expiring").await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    let request = TestApp::request(Method::POST, &format!("/pages/{page_id}/refresh"))
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 200);

    let body = body_to_json(response).await;
    assert_eq!(body["status"], "connected");
    assert_eq!(body["refreshFailures"], 0);
    assert!(body["lastRefreshedAt"].is_string());

    // Mock refresh grants 60 days
    let days = body["daysRemaining"].as_i64().unwrap();
    assert!((59..=60).contains(&days), "got {days}");
    assert_eq!(app.provider.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_refresh_forbidden_for_non_owner() {
    let app = helpers::fresh_test_app().await;
    let (owner_id, _) = create_test_user(&app.pool).await;
    let (other_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, other_id);
    let page_id = create_test_connection(&app.pool, owner_id, Utc::now() + Duration::days(30)).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(owner_id);
    guard.delete_user(other_id);

    let request = TestApp::request(Method::POST, &format!("/pages/{page_id}/refresh"))
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 403);
    assert_eq!(app.provider.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_admin_may_refresh_any_connection() {
    let app = helpers::fresh_test_app().await;
    let (owner_id, _) = create_test_user(&app.pool).await;
    let (admin_id, _) = create_test_user(&app.pool).await;
    make_admin(&app.pool, admin_id).await;
    let token = generate_access_token(&app.config, admin_id);
    let page_id = create_test_connection(&app.pool, owner_id, Utc::now() + Duration::days(30)).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(owner_id);
    guard.delete_user(admin_id);

    let request = TestApp::request(Method::POST, &format!("/pages/{page_id}/refresh"))
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_refresh_conflicts_when_revoked() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);
    let page_id = create_test_connection(&app.pool, user_id, Utc::now() + Duration::days(30)).await;
    set_connection_status(&app.pool, page_id, "revoked").await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    let request = TestApp::request(Method::POST, &format!("/pages/{page_id}/refresh"))
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 409);

    let body = body_to_json(response).await;
    assert_eq!(body["error"], "CONNECTION_REVOKED");
    assert_eq!(app.provider.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_refresh_failure_is_counted_and_notified() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);
    let page_id = create_test_connection(&app.pool, user_id, Utc::now() + Duration::days(5)).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    app.provider.set_refresh(Err(ProviderError::TokenInvalid));

    let request = TestApp::request(Method::POST, &format!("/pages/{page_id}/refresh"))
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 400);

    let body = body_to_json(response).await;
    assert_eq!(body["error"], "PROVIDER_TOKEN_INVALID");

    // The failure is counted but the status is left for the monitor to move
    let (failures, status): (i64, String) = sqlx::query_as(
        "SELECT refresh_failures, status::TEXT FROM page_connections WHERE id = $1",
    )
    .bind(page_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(failures, 1);
    assert_eq!(status, "connected");

    // A terminal refresh failure notifies the owner with kind `expired`
    let notified: i64 = sqlx::query_scalar(
        r"SELECT COUNT(*) FROM notifications
          WHERE page_id = $1 AND recipient_id = $2 AND kind = 'expired'",
    )
    .bind(page_id)
    .bind(user_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(notified, 1);
}

// ============================================================================
// POST /pages/{id}/revoke
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_revoke_is_idempotent() {
    let app = helpers::fresh_test_app().await;
    let (user_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, user_id);
    let page_id = create_test_connection(&app.pool, user_id, Utc::now() + Duration::days(30)).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    for _ in 0..2 {
        let request = TestApp::request(Method::POST, &format!("/pages/{page_id}/revoke"))
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await;
        assert_eq!(response.status(), 200);

        let body = body_to_json(response).await;
        assert_eq!(body["status"], "revoked");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[ignore] // Requires PostgreSQL and Redis
async fn test_revoke_forbidden_for_non_owner() {
    let app = helpers::fresh_test_app().await;
    let (owner_id, _) = create_test_user(&app.pool).await;
    let (other_id, _) = create_test_user(&app.pool).await;
    let token = generate_access_token(&app.config, other_id);
    let page_id = create_test_connection(&app.pool, owner_id, Utc::now() + Duration::days(30)).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(owner_id);
    guard.delete_user(other_id);

    let request = TestApp::request(Method::POST, &format!("/pages/{page_id}/revoke"))
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await;
    assert_eq!(response.status(), 403);

    let status: String =
        sqlx::query_scalar("SELECT status::TEXT FROM page_connections WHERE id = $1")
            .bind(page_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(status, "connected");
}
