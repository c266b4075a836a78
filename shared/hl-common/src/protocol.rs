//! Real-time dashboard event protocol.
//!
//! Events flow one way, from the server to connected dashboard clients.
//! Payloads are invalidation hints: they carry enough for a client to
//! update its view or decide which resource to refetch, never the full
//! resource and never any token material.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ConnectionStatus, NotificationKind, WebhookStatus};

/// Events published on the dashboard event bus.
///
/// Tagged with a dotted `type` discriminator on the wire, e.g.
/// `{"type": "connection.updated", "page_id": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardEvent {
    /// A page finished the authorization handshake and is connected.
    #[serde(rename = "connection.established")]
    ConnectionEstablished {
        page_id: Uuid,
        external_page_id: String,
        page_name: String,
        status: ConnectionStatus,
    },
    /// A connection changed state (refresh, expiry transition, forced expiry).
    #[serde(rename = "connection.updated")]
    ConnectionUpdated {
        page_id: Uuid,
        status: ConnectionStatus,
        expires_at: DateTime<Utc>,
    },
    /// A connection was revoked by an operator.
    #[serde(rename = "connection.revoked")]
    ConnectionRevoked { page_id: Uuid },
    /// The webhook subscription state of a connection changed.
    #[serde(rename = "webhook.updated")]
    WebhookUpdated {
        page_id: Uuid,
        webhook_status: WebhookStatus,
    },
    /// A notification was created for a recipient.
    #[serde(rename = "notification.created")]
    NotificationCreated {
        notification_id: Uuid,
        recipient_id: Uuid,
        page_id: Uuid,
        kind: NotificationKind,
        days_remaining: i64,
    },
}

impl DashboardEvent {
    /// The page this event concerns.
    #[must_use]
    pub const fn page_id(&self) -> Uuid {
        match self {
            Self::ConnectionEstablished { page_id, .. }
            | Self::ConnectionUpdated { page_id, .. }
            | Self::ConnectionRevoked { page_id }
            | Self::WebhookUpdated { page_id, .. }
            | Self::NotificationCreated { page_id, .. } => *page_id,
        }
    }

    /// Notification events are addressed to a single recipient; everything
    /// else is visible to any authenticated dashboard user.
    #[must_use]
    pub const fn recipient(&self) -> Option<Uuid> {
        match self {
            Self::NotificationCreated { recipient_id, .. } => Some(*recipient_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_dotted_type_tags() {
        let event = DashboardEvent::ConnectionUpdated {
            page_id: Uuid::now_v7(),
            status: ConnectionStatus::Expiring,
            expires_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connection.updated");
        assert_eq!(json["status"], "expiring");
    }

    #[test]
    fn event_round_trip() {
        let event = DashboardEvent::NotificationCreated {
            notification_id: Uuid::now_v7(),
            recipient_id: Uuid::now_v7(),
            page_id: Uuid::now_v7(),
            kind: NotificationKind::ExpiringUrgent,
            days_remaining: 5,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: DashboardEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn only_notifications_are_addressed() {
        let revoked = DashboardEvent::ConnectionRevoked {
            page_id: Uuid::now_v7(),
        };
        assert_eq!(revoked.recipient(), None);

        let recipient = Uuid::now_v7();
        let created = DashboardEvent::NotificationCreated {
            notification_id: Uuid::now_v7(),
            recipient_id: recipient,
            page_id: Uuid::now_v7(),
            kind: NotificationKind::WebhookFailed,
            days_remaining: 12,
        };
        assert_eq!(created.recipient(), Some(recipient));
    }
}
