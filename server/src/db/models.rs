//! Database Models

use chrono::{DateTime, NaiveDate, Utc};
use hl_common::{ConnectionStatus, NotificationKind, WebhookStatus};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub email_notifications: bool,
    pub created_at: DateTime<Utc>,
}

/// A connected third-party messaging page.
///
/// Deliberately not `Serialize`: the sealed access token must never reach
/// a response body. API handlers map this into a response DTO instead.
#[derive(Debug, Clone, FromRow)]
pub struct PageConnection {
    pub id: Uuid,
    pub external_page_id: String,
    pub page_name: String,
    pub owner_id: Uuid,
    pub access_token_sealed: String,
    pub obtained_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ConnectionStatus,
    pub webhook_status: WebhookStatus,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub last_expiry_bucket: Option<String>,
    pub refresh_failures: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pending authorization handshake state.
///
/// Not `Serialize`: handshake internals (nonce, state hash) stay server-side.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthSession {
    pub id: Uuid,
    pub state_hash: String,
    pub nonce: String,
    pub requested_page_url: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// A notification delivered to a dashboard user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub page_id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub days_remaining: i64,
    pub day_bucket: NaiveDate,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
