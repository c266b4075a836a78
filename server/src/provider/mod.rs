//! Page Provider Client
//!
//! Talks to the external messaging-page provider: authorization handshake,
//! token exchange and refresh, and webhook subscription management. The
//! provider is reached over HTTPS in production ([`http::HttpProviderClient`]);
//! tests and local development use [`mock::MockProviderClient`].

pub mod http;
pub mod mock;

pub use self::http::HttpProviderClient;
pub use self::mock::MockProviderClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Provider-side failures, classified for lifecycle decisions.
///
/// Messages are safe for user display. Raw provider error bodies are logged
/// at the call site and never carried in the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider could not be reached or answered with a server error.
    #[error("The messaging provider could not be reached")]
    NetworkFailure,

    /// The authorization code or grant was rejected.
    #[error("The provider rejected the authorization grant")]
    InvalidGrant,

    /// The provider rate limit was hit.
    #[error("The provider rate limit was hit, try again shortly")]
    RateLimited,

    /// The provider no longer accepts the page access token.
    #[error("The provider rejected the page access token")]
    TokenInvalid,

    /// The page does not exist or is not accessible to the app.
    #[error("The page was not found or is not accessible")]
    PageNotFound,
}

impl ProviderError {
    /// Stable machine-readable code carried in API responses.
    #[must_use]
    pub const fn wire_code(self) -> &'static str {
        match self {
            Self::NetworkFailure => "network_failure",
            Self::InvalidGrant => "invalid_grant",
            Self::RateLimited => "rate_limited",
            Self::TokenInvalid => "token_invalid",
            Self::PageNotFound => "page_not_found",
        }
    }
}

/// Result of a successful authorization code exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// Page access token, plaintext. Sealed before it is persisted.
    pub access_token: String,
    /// When the token stops working.
    pub expires_at: DateTime<Utc>,
    /// Provider-side page identifier.
    pub external_page_id: String,
    /// Human-readable page name.
    pub page_name: String,
}

/// Result of a successful token refresh.
#[derive(Debug, Clone)]
pub struct RefreshGrant {
    /// Replacement access token, plaintext.
    pub access_token: String,
    /// When the replacement token stops working.
    pub expires_at: DateTime<Utc>,
}

/// Operations against the external page provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Build the authorization URL the browser is sent to for the handshake.
    fn authorize_url(&self, state: &str, nonce: &str) -> String;

    /// Exchange an authorization code for a page access token.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError>;

    /// Request a replacement token for a page before the current one expires.
    async fn refresh_token(&self, current_token: &str) -> Result<RefreshGrant, ProviderError>;

    /// Subscribe this app to webhook deliveries for a page.
    async fn subscribe_webhooks(
        &self,
        external_page_id: &str,
        access_token: &str,
    ) -> Result<(), ProviderError>;
}
