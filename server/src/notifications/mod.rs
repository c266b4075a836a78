//! Notifications for page lifecycle findings.
//!
//! The engine creates per-recipient records with a daily dedup key and
//! fans them out over the event bus and email. Handlers expose the list,
//! banner, and read-state endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::api::AppState;

mod engine;
mod error;
pub mod handlers;
pub mod queries;
pub mod types;

pub use engine::NotificationEngine;
pub use error::{NotificationError, NotificationResult};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/banner", get(handlers::banner_notifications))
        .route("/unread-count", get(handlers::unread_count))
        .route("/read-all", post(handlers::mark_all_notifications_read))
        .route("/{id}/read", post(handlers::mark_notification_read))
}
