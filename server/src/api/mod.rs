//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::sync::Arc;

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use anyhow::{ensure, Context, Result};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth,
    config::Config,
    connections::{self, ConnectionManager},
    email::EmailService,
    events::EventBus,
    notifications::{self, NotificationEngine},
    provider::ProviderClient,
    webhooks::WebhookSubscriptionService,
    ws,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,
    /// Redis client
    pub redis: fred::clients::Client,
    /// Server configuration
    pub config: Arc<Config>,
    /// In-process event bus with Redis fan-out
    pub events: EventBus,
    /// Page provider client
    pub provider: Arc<dyn ProviderClient>,
    /// Connection lifecycle manager
    pub connections: ConnectionManager,
    /// Webhook subscription service
    pub webhooks: WebhookSubscriptionService,
    /// Notification engine
    pub notifications: NotificationEngine,
}

/// Externally constructed parts `AppState::new` wires together.
pub struct AppStateConfig {
    pub db: PgPool,
    pub redis: fred::clients::Client,
    pub config: Config,
    pub provider: Arc<dyn ProviderClient>,
    pub events: EventBus,
    pub email: Option<EmailService>,
}

impl AppState {
    /// Create new application state, wiring the service graph.
    ///
    /// # Errors
    /// Fails when the token encryption key is not 64 hex characters.
    pub fn new(parts: AppStateConfig) -> Result<Self> {
        let token_key = hex::decode(&parts.config.token_encryption_key)
            .context("TOKEN_ENCRYPTION_KEY is not valid hex")?;
        ensure!(
            token_key.len() == 32,
            "TOKEN_ENCRYPTION_KEY must be 64 hex characters (32 bytes)"
        );

        let config = Arc::new(parts.config);

        let notifications =
            NotificationEngine::new(parts.db.clone(), parts.events.clone(), parts.email);
        let webhooks = WebhookSubscriptionService::new(
            parts.db.clone(),
            parts.provider.clone(),
            parts.events.clone(),
            notifications.clone(),
            token_key.clone(),
        );
        let connections = ConnectionManager::new(
            parts.db.clone(),
            config.clone(),
            parts.provider.clone(),
            parts.events.clone(),
            notifications.clone(),
            webhooks.clone(),
            token_key,
        );

        Ok(Self {
            db: parts.db,
            redis: parts.redis,
            config,
            events: parts.events,
            provider: parts.provider,
            connections,
            webhooks,
            notifications,
        })
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Routes that require authentication
    let protected_routes = Router::new()
        .route(
            "/connect/start",
            post(connections::handlers::start_connection),
        )
        .nest("/pages", connections::pages_router())
        .nest("/notifications", notifications::router())
        .layer(from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // The provider redirects the browser here; authenticated by the
        // single-use state token rather than a session
        .route(
            "/connect/callback",
            get(connections::handlers::connect_callback),
        )
        .merge(protected_routes)
        // WebSocket (token in query)
        .route("/ws", get(ws::handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        // State
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Whether email alerts are configured
    email_alerts: bool,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        email_alerts: state.config.has_smtp(),
    })
}
