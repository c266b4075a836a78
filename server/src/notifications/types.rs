//! Notification API Types

use chrono::{DateTime, Utc};
use hl_common::NotificationKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::NotificationRecord;

/// A notification as seen by the dashboard.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: Uuid,
    pub page_id: Uuid,
    pub kind: NotificationKind,
    pub days_remaining: i64,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationRecord> for NotificationResponse {
    fn from(record: NotificationRecord) -> Self {
        Self {
            id: record.id,
            page_id: record.page_id,
            kind: record.kind,
            days_remaining: record.days_remaining,
            read: record.read,
            created_at: record.created_at,
        }
    }
}

/// Query parameters for the notification list.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ListQuery {
    /// Maximum notifications to return (1-100, default 50).
    pub limit: Option<i64>,
}

/// Response for the notification list and banner endpoints.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationResponse>,
}

/// Response for the unread count endpoint.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub count: i64,
}

/// Response after marking all notifications read.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadResponse {
    pub success: bool,
    /// How many notifications were newly marked read.
    pub updated: u64,
}
