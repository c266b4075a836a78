//! Notification Types

use serde::{Deserialize, Serialize};

/// What a notification is about, matching the `notification_kind`
/// `PostgreSQL` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "notification_kind", rename_all = "snake_case")
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum NotificationKind {
    /// Token expires within the routine warning window.
    ExpiringSoon,
    /// Token expires within the urgent warning window.
    ExpiringUrgent,
    /// Token is past its validity window or was rejected by the provider.
    Expired,
    /// Webhook (re)subscription for the page failed.
    WebhookFailed,
}

impl NotificationKind {
    /// Parse from the `snake_case` string form.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "expiring_soon" => Some(Self::ExpiringSoon),
            "expiring_urgent" => Some(Self::ExpiringUrgent),
            "expired" => Some(Self::Expired),
            "webhook_failed" => Some(Self::WebhookFailed),
            _ => None,
        }
    }

    /// Convert to the `snake_case` string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExpiringSoon => "expiring_soon",
            Self::ExpiringUrgent => "expiring_urgent",
            Self::Expired => "expired",
            Self::WebhookFailed => "webhook_failed",
        }
    }

    /// Whether the kind belongs in the admin banner (action needed now,
    /// not routine advance warning).
    pub const fn is_banner_severity(&self) -> bool {
        matches!(self, Self::ExpiringUrgent | Self::Expired)
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| crate::Error::unknown_variant("notification_kind", s))
    }
}
