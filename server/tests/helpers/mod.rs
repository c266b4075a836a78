//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for building and sending requests through the full axum
//! router, plus utilities for user creation, admin grants, JWT generation, and
//! connection fixtures.
//!
//! ## Shared Resources
//!
//! Use [`shared_pool()`] and [`shared_redis()`] to avoid creating new connections per test.
//!
//! ## Cleanup Guards
//!
//! Use [`CleanupGuard`] for RAII-based cleanup that runs even if a test panics.
//! All test data hangs off users via `ON DELETE CASCADE`, so deleting the
//! test's users is usually enough.
#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{self, Method, Request, Response};
use axum::Router;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

use hl_server::api::{create_router, AppState, AppStateConfig};
use hl_server::auth::jwt;
use hl_server::config::Config;
use hl_server::db;
use hl_server::events::EventBus;
use hl_server::provider::MockProviderClient;
use hl_server::secrets;

// ============================================================================
// Shared resources
// ============================================================================

/// Shared database pool across all tests in the same binary.
static SHARED_POOL: OnceCell<PgPool> = OnceCell::const_new();

/// Shared Redis client across all tests in the same binary.
static SHARED_REDIS: OnceCell<fred::clients::Client> = OnceCell::const_new();

/// Shared config across all tests in the same binary.
static SHARED_CONFIG: OnceCell<Config> = OnceCell::const_new();

/// Get or create a shared database pool.
///
/// Reuses a single pool across all test cases in the same binary,
/// avoiding connection exhaustion from creating pools per-test.
pub async fn shared_pool() -> &'static PgPool {
    SHARED_POOL
        .get_or_init(|| async {
            let config = shared_config().await;
            let pool = db::create_pool(&config.database_url)
                .await
                .expect("Failed to connect to test DB");
            db::run_migrations(&pool)
                .await
                .expect("Failed to migrate test DB");
            pool
        })
        .await
}

/// Get or create a shared Redis client.
pub async fn shared_redis() -> &'static fred::clients::Client {
    SHARED_REDIS
        .get_or_init(|| async {
            let config = shared_config().await;
            db::create_redis_client(&config.redis_url)
                .await
                .expect("Failed to connect to test Redis")
        })
        .await
}

/// Get or create a shared config.
pub async fn shared_config() -> &'static Config {
    SHARED_CONFIG
        .get_or_init(|| async { Config::default_for_test() })
        .await
}

// ============================================================================
// Cleanup Guard
// ============================================================================

/// Async cleanup action type.
type CleanupAction = Box<dyn FnOnce(PgPool) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// RAII guard that runs cleanup actions on drop, even if the test panics.
///
/// # Example
///
/// ```ignore
/// let mut guard = CleanupGuard::new(app.pool.clone());
/// guard.delete_user(user_id);
///
/// // Test assertions here — cleanup runs even if these panic
/// assert_eq!(resp.status(), 200);
/// // guard dropped here → cleanup runs
/// ```
pub struct CleanupGuard {
    pool: PgPool,
    actions: Vec<CleanupAction>,
}

impl CleanupGuard {
    /// Create a new cleanup guard for the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            actions: Vec::new(),
        }
    }

    /// Register a generic async cleanup action.
    pub fn add<F, Fut>(&mut self, action: F)
    where
        F: FnOnce(PgPool) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.actions
            .push(Box::new(move |pool| Box::pin(action(pool))));
    }

    /// Register cleanup to delete a user by ID. Connections, handshake
    /// sessions, and notifications cascade.
    pub fn delete_user(&mut self, user_id: Uuid) {
        self.add(move |pool| async move {
            let _ = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(user_id)
                .execute(&pool)
                .await;
        });
    }

    /// Register cleanup to delete a page connection by ID.
    pub fn delete_connection(&mut self, page_id: Uuid) {
        self.add(move |pool| async move {
            let _ = sqlx::query("DELETE FROM page_connections WHERE id = $1")
                .bind(page_id)
                .execute(&pool)
                .await;
        });
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let actions = std::mem::take(&mut self.actions);
        if actions.is_empty() {
            return;
        }

        let pool = self.pool.clone();
        let handle = tokio::runtime::Handle::current();

        // Spawn a blocking thread to run async cleanup.
        // This works regardless of tokio runtime flavor.
        std::thread::spawn(move || {
            handle.block_on(async move {
                for action in actions {
                    action(pool.clone()).await;
                }
            });
        })
        .join()
        .expect("Cleanup thread panicked");
    }
}

// ============================================================================
// Test App
// ============================================================================

/// A test application wrapping the full axum router.
///
/// The provider is a scriptable mock; tests reach it through `provider` to
/// set failure behavior and read call counts.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub provider: Arc<MockProviderClient>,
    pub events: EventBus,
}

impl TestApp {
    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// Create a [`CleanupGuard`] for this app's pool.
    pub fn cleanup_guard(&self) -> CleanupGuard {
        CleanupGuard::new(self.pool.clone())
    }
}

/// Build a [`TestApp`] with fresh DB and Redis resources for one test.
///
/// Prefer this helper for HTTP integration tests that are sensitive to stale
/// runtime-bound connections across `#[tokio::test]` runs. The event bus runs
/// without Redis fan-out so events stay local to the test.
pub async fn fresh_test_app() -> TestApp {
    let config = shared_config().await.clone();
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to test DB");
    db::run_migrations(&pool)
        .await
        .expect("Failed to migrate test DB");
    let redis = db::create_redis_client(&config.redis_url)
        .await
        .expect("Failed to connect to test Redis");

    let provider = Arc::new(MockProviderClient::new());
    let events = EventBus::new(None);

    let state = AppState::new(AppStateConfig {
        db: pool.clone(),
        redis,
        config: config.clone(),
        provider: provider.clone(),
        events: events.clone(),
        email: None,
    })
    .expect("Failed to build test AppState");
    let router = create_router(state.clone());

    TestApp {
        router,
        state,
        pool,
        config: Arc::new(config),
        provider,
        events,
    }
}

// ============================================================================
// User & Auth helpers
// ============================================================================

/// Create a test user and return `(user_id, username)`.
pub async fn create_test_user(pool: &PgPool) -> (Uuid, String) {
    const MAX_ATTEMPTS: usize = 6;
    let test_id = Uuid::new_v4().to_string()[..8].to_string();
    let username = format!("httptest_{test_id}");

    for attempt in 1..=MAX_ATTEMPTS {
        match db::create_user(pool, &username, "HTTP Test User", None).await {
            Ok(user) => return (user.id, username),
            Err(sqlx::Error::PoolTimedOut) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    attempt,
                    max_attempts = MAX_ATTEMPTS,
                    "Pool timed out creating test user; retrying"
                );
                tokio::time::sleep(Duration::from_millis((attempt as u64) * 200)).await;
            }
            Err(err) => panic!("Failed to create test user: {err:?}"),
        }
    }

    unreachable!("create_test_user retry loop must return or panic")
}

/// Grant admin to a user.
pub async fn make_admin(pool: &PgPool, user_id: Uuid) {
    sqlx::query("UPDATE users SET is_admin = TRUE WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .expect("Failed to grant admin");
}

/// Set a user's email address and opt-in flag.
pub async fn set_user_email(pool: &PgPool, user_id: Uuid, email: &str, notifications: bool) {
    sqlx::query("UPDATE users SET email = $2, email_notifications = $3 WHERE id = $1")
        .bind(user_id)
        .bind(email)
        .bind(notifications)
        .execute(pool)
        .await
        .expect("Failed to set user email");
}

/// Generate an access token for the given user.
pub fn generate_access_token(config: &Config, user_id: Uuid) -> String {
    jwt::issue_access_token(user_id, &config.jwt_secret, config.jwt_access_expiry)
        .expect("Failed to issue access token")
}

/// Delete a user by ID (cascades to connections and notifications).
pub async fn delete_user(pool: &PgPool, user_id: Uuid) {
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .expect("Failed to delete test user");
}

/// Collect a response body and parse it as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}

// ============================================================================
// Connection fixtures
// ============================================================================

/// The token key from the test config.
pub fn test_token_key() -> Vec<u8> {
    hex::decode(&Config::default_for_test().token_encryption_key)
        .expect("test token key must be valid hex")
}

/// Seal a plaintext token with the test key.
pub fn seal_test_token(token: &str) -> String {
    secrets::seal_token(token, &test_token_key()).expect("Failed to seal test token")
}

/// Insert a connected page for a user, expiring at the given instant.
/// Returns the connection ID.
pub async fn create_test_connection(
    pool: &PgPool,
    owner_id: Uuid,
    expires_at: DateTime<Utc>,
) -> Uuid {
    let id = Uuid::now_v7();
    let external_page_id = format!("page-{}", &id.to_string()[..8]);
    let sealed = seal_test_token("test-access-token");

    sqlx::query(
        r"INSERT INTO page_connections
            (id, external_page_id, page_name, owner_id, access_token_sealed,
             obtained_at, expires_at, status, webhook_status)
          VALUES ($1, $2, $3, $4, $5, NOW(), $6, 'connected', 'subscribed')",
    )
    .bind(id)
    .bind(&external_page_id)
    .bind("Test Careers Page")
    .bind(owner_id)
    .bind(&sealed)
    .bind(expires_at)
    .execute(pool)
    .await
    .expect("Failed to insert test connection");

    id
}

/// Force a connection into a specific status.
pub async fn set_connection_status(pool: &PgPool, page_id: Uuid, status: &str) {
    sqlx::query("UPDATE page_connections SET status = $2::connection_status WHERE id = $1")
        .bind(page_id)
        .bind(status)
        .execute(pool)
        .await
        .expect("Failed to set connection status");
}
