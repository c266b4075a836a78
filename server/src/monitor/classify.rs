//! Token validity classification.
//!
//! Pure functions over `expires_at`; the scan pass and the HTTP layer
//! both use `days_remaining` so the dashboard never disagrees with the
//! monitor.

use chrono::{DateTime, Utc};
use hl_common::{ConnectionStatus, NotificationKind};

/// Whole days until `expires_at`, flooring toward negative infinity.
///
/// A token 36 hours from expiry has 1 day remaining; a token 12 hours
/// past expiry has -1.
#[must_use]
pub fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().div_euclid(86_400)
}

/// How close a connection's token is to the end of its validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryClass {
    /// Validity window has closed (or closes within the day).
    Expired,
    /// Inside the urgent warning window.
    Urgent,
    /// Inside the routine warning window.
    Soon,
    /// Far enough out that nothing needs saying.
    Healthy,
}

/// Classify a day count against the configured warning windows.
#[must_use]
pub const fn classify(days: i64, urgent_days: i64, soon_days: i64) -> ExpiryClass {
    if days <= 0 {
        ExpiryClass::Expired
    } else if days <= urgent_days {
        ExpiryClass::Urgent
    } else if days <= soon_days {
        ExpiryClass::Soon
    } else {
        ExpiryClass::Healthy
    }
}

impl ExpiryClass {
    /// The value stored in `last_expiry_bucket`; `None` for healthy
    /// connections, which carry no bucket.
    #[must_use]
    pub const fn bucket(self) -> Option<&'static str> {
        match self {
            Self::Expired => Some("expired"),
            Self::Urgent => Some("expiring_urgent"),
            Self::Soon => Some("expiring_soon"),
            Self::Healthy => None,
        }
    }

    /// The notification kind this classification warrants, if any.
    #[must_use]
    pub const fn kind(self) -> Option<NotificationKind> {
        match self {
            Self::Expired => Some(NotificationKind::Expired),
            Self::Urgent => Some(NotificationKind::ExpiringUrgent),
            Self::Soon => Some(NotificationKind::ExpiringSoon),
            Self::Healthy => None,
        }
    }

    /// The connection status this classification moves a live
    /// connection to, if any.
    #[must_use]
    pub const fn status(self) -> Option<ConnectionStatus> {
        match self {
            Self::Expired => Some(ConnectionStatus::Expired),
            Self::Urgent | Self::Soon => Some(ConnectionStatus::Expiring),
            Self::Healthy => None,
        }
    }
}
