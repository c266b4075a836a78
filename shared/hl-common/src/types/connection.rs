//! Page Connection Types

use serde::{Deserialize, Serialize};

/// Lifecycle status of a page connection, matching the
/// `connection_status` `PostgreSQL` enum.
///
/// Transitions run forward only (`Pending` → `Connected` → `Expiring` →
/// `Expired`), with two exceptions: a successful token refresh returns
/// `Expiring`/`Expired` to `Connected`, and `Revoked` is reachable from
/// any state and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "connection_status", rename_all = "lowercase")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ConnectionStatus {
    /// Handshake started, no token yet.
    Pending,
    /// Valid token, more than the warning window remaining.
    Connected,
    /// Token inside the warning window.
    Expiring,
    /// Token past its validity window (or rejected by the provider).
    Expired,
    /// Disconnected by an operator. Terminal.
    Revoked,
}

impl ConnectionStatus {
    /// Parse from the lowercase string form.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "connected" => Some(Self::Connected),
            "expiring" => Some(Self::Expiring),
            "expired" => Some(Self::Expired),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }

    /// Convert to the lowercase string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Connected => "connected",
            Self::Expiring => "expiring",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    /// Whether no further transitions are possible.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked)
    }

    /// Whether the connection holds a token the provider may still accept.
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Connected | Self::Expiring)
    }

    /// Whether moving to `next` is a legal lifecycle transition.
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            // Revoked is terminal.
            (Self::Revoked, _) => false,
            // Revoke is allowed from any non-terminal state.
            (_, Self::Revoked) => true,
            // Refresh / reconnect recovers an aging token.
            (Self::Expiring | Self::Expired, Self::Connected) => true,
            // Forward-only aging.
            (Self::Pending, Self::Connected)
            | (Self::Connected, Self::Expiring | Self::Expired)
            | (Self::Expiring, Self::Expired) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| crate::Error::unknown_variant("connection_status", s))
    }
}

/// Webhook delivery registration state, matching the `webhook_status`
/// `PostgreSQL` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "webhook_status", rename_all = "lowercase")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum WebhookStatus {
    /// Provider is delivering page events to us.
    Subscribed,
    /// No subscription registered (initial state).
    Unsubscribed,
    /// Last (re)subscription attempt failed.
    Failed,
}

impl WebhookStatus {
    /// Parse from the lowercase string form.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "subscribed" => Some(Self::Subscribed),
            "unsubscribed" => Some(Self::Unsubscribed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Convert to the lowercase string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::Unsubscribed => "unsubscribed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebhookStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| crate::Error::unknown_variant("webhook_status", s))
    }
}
