//! Connection Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::provider::ProviderError;
use crate::secrets::SecretsError;

/// Authorization handshake session failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The presented state token matches no session.
    #[error("Unknown or mismatched state token")]
    InvalidState,

    /// The session existed but its window has passed.
    #[error("The authorization session expired, start the connection again")]
    Expired,

    /// The session was already used by an earlier callback.
    #[error("The authorization session was already used")]
    AlreadyConsumed,
}

/// Connection lifecycle error types.
///
/// Display strings are safe for user-facing responses; raw provider bodies
/// and database details are logged where they occur, never carried here.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// No page URL in the start request.
    #[error("A page URL is required")]
    MissingPageUrl,

    /// The page URL is malformed or points outside the provider.
    #[error("Not a valid provider page URL: {0}")]
    InvalidPageUrl(String),

    /// No usable page id in the request path.
    #[error("A page id is required")]
    MissingPageId,

    /// Connection not found.
    #[error("Connection not found")]
    ConnectionNotFound,

    /// The connection was revoked and can no longer be operated on.
    #[error("Connection has been revoked")]
    ConnectionRevoked,

    /// Caller may not manage this connection.
    #[error("You do not manage this connection")]
    Forbidden,

    /// Handshake session failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Provider-side failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Token sealing failure.
    #[error("Token processing failed")]
    Secrets(#[from] SecretsError),

    /// Database error.
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    /// Internal server error.
    #[error("Internal server error")]
    Internal(String),
}

/// Error response body. Connection endpoints answer with an explicit
/// `success` flag so the dashboard can branch without inspecting codes.
#[derive(Debug, Serialize)]
pub struct ConnectErrorBody {
    pub success: bool,
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ConnectError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::MissingPageUrl => (StatusCode::BAD_REQUEST, "MISSING_PAGE_URL"),
            Self::InvalidPageUrl(_) => (StatusCode::BAD_REQUEST, "INVALID_PAGE_URL"),
            Self::MissingPageId => (StatusCode::BAD_REQUEST, "MISSING_PAGE_ID"),
            Self::ConnectionNotFound => (StatusCode::NOT_FOUND, "CONNECTION_NOT_FOUND"),
            Self::ConnectionRevoked => (StatusCode::CONFLICT, "CONNECTION_REVOKED"),
            Self::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Session(SessionError::InvalidState) => (StatusCode::BAD_REQUEST, "INVALID_STATE"),
            Self::Session(SessionError::Expired) => (StatusCode::GONE, "SESSION_EXPIRED"),
            Self::Session(SessionError::AlreadyConsumed) => {
                (StatusCode::CONFLICT, "SESSION_CONSUMED")
            }
            Self::Provider(ProviderError::NetworkFailure) => {
                (StatusCode::BAD_GATEWAY, "PROVIDER_UNAVAILABLE")
            }
            Self::Provider(ProviderError::InvalidGrant) => (StatusCode::BAD_REQUEST, "INVALID_GRANT"),
            Self::Provider(ProviderError::RateLimited) => {
                (StatusCode::TOO_MANY_REQUESTS, "PROVIDER_RATE_LIMITED")
            }
            Self::Provider(ProviderError::TokenInvalid) => {
                (StatusCode::BAD_REQUEST, "PROVIDER_TOKEN_INVALID")
            }
            Self::Provider(ProviderError::PageNotFound) => {
                (StatusCode::NOT_FOUND, "PROVIDER_PAGE_NOT_FOUND")
            }
            Self::Secrets(_) | Self::Database(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = Json(ConnectErrorBody {
            success: false,
            error: code.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type for connection operations.
pub type ConnectResult<T> = Result<T, ConnectError>;
