//! Page Connection Lifecycle
//!
//! Everything between "a recruiter pastes a page URL" and "the dashboard
//! shows a live, webhook-subscribed connection": handshake sessions, token
//! exchange and sealing, refresh, revocation, and the queries that keep
//! status transitions one-directional.

mod error;
pub mod handlers;
mod manager;
pub mod queries;
mod sessions;
pub mod types;

pub use error::{ConnectError, ConnectResult, SessionError};
pub use manager::{expire_for_invalid_token, ConnectionManager, StartedConnection};

use axum::routing::{get, post};
use axum::Router;

use crate::api::AppState;

/// Routes mounted at `/pages` (auth required).
pub fn pages_router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_pages))
        .route("/{id}", get(handlers::get_page))
        .route("/{id}/refresh", post(handlers::refresh_page))
        .route("/{id}/resubscribe", post(handlers::resubscribe_page))
        .route("/{id}/revoke", post(handlers::revoke_page))
}
