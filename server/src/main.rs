//! Hireline Server - Main Entry Point
//!
//! Page connection lifecycle backend for the recruiting dashboard.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use hl_server::{api, config, db, email, events, monitor, provider};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hl_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Hireline Server"
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;

    // Initialize Redis
    let redis = db::create_redis_client(&config.redis_url).await?;

    // Event bus with cross-instance fan-out
    let bus = events::EventBus::new(Some(redis.clone()));
    let _bridge_handle = events::spawn_event_bridge(redis.clone(), bus.clone());

    // Initialize email alerts (optional - disabled if SMTP is not configured)
    let email = if config.has_smtp() {
        match email::EmailService::new(&config) {
            Ok(service) => match service.test_connection().await {
                Ok(()) => {
                    info!(host = ?config.smtp_host, "SMTP connected, email alerts enabled");
                    Some(service)
                }
                Err(e) => {
                    tracing::warn!("SMTP connection test failed: {}. Email alerts disabled.", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Email service initialization failed: {}. Email alerts disabled.",
                    e
                );
                None
            }
        }
    } else {
        info!("SMTP not configured, email alerts disabled");
        None
    };

    // Initialize the page provider client
    let provider_client = provider::HttpProviderClient::new(&config)?;

    // Build application state
    let state = api::AppState::new(api::AppStateConfig {
        db: db_pool,
        redis,
        config: config.clone(),
        provider: Arc::new(provider_client),
        events: bus,
        email,
    })?;

    // Start the token expiry monitor
    let _monitor_handle = monitor::spawn_monitor_task(state.clone());

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    info!("Server shutdown complete");

    Ok(())
}
