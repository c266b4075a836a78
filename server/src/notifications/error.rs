//! Notification Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Notification error types.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Notification not found (or not addressed to the caller).
    #[error("Notification not found")]
    NotFound,

    /// The page the notification concerns does not exist.
    #[error("Page connection not found")]
    PageNotFound,

    /// Admin standing required.
    #[error("Admin access required")]
    AdminRequired,

    /// Database error.
    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::NotFound => (StatusCode::NOT_FOUND, "NOTIFICATION_NOT_FOUND"),
            Self::PageNotFound => (StatusCode::NOT_FOUND, "PAGE_NOT_FOUND"),
            Self::AdminRequired => (StatusCode::FORBIDDEN, "ADMIN_REQUIRED"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;
