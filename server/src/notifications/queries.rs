//! Notification Queries
//!
//! The dedup constraint over (page, recipient, kind, day) does the heavy
//! lifting: creation is `ON CONFLICT DO NOTHING`, so two scan passes or two
//! server instances emitting the same notification on the same day produce
//! exactly one row and the losers learn it atomically.

use chrono::NaiveDate;
use hl_common::NotificationKind;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::db::queries::db_error;
use crate::db::NotificationRecord;

/// Create a notification unless the same one already exists for this day.
///
/// Returns `None` when the dedup key matched an existing row.
pub async fn insert_notification(
    pool: &PgPool,
    page_id: Uuid,
    recipient_id: Uuid,
    kind: NotificationKind,
    days_remaining: i64,
    day_bucket: NaiveDate,
) -> sqlx::Result<Option<NotificationRecord>> {
    sqlx::query_as::<_, NotificationRecord>(
        r"INSERT INTO notifications (id, page_id, recipient_id, kind, days_remaining, day_bucket)
          VALUES ($1, $2, $3, $4, $5, $6)
          ON CONFLICT (page_id, recipient_id, kind, day_bucket) DO NOTHING
          RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(page_id)
    .bind(recipient_id)
    .bind(kind)
    .bind(days_remaining)
    .bind(day_bucket)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("insert_notification", page_id = %page_id, recipient_id = %recipient_id))
}

/// Recent notifications for a user, newest first.
pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> sqlx::Result<Vec<NotificationRecord>> {
    sqlx::query_as::<_, NotificationRecord>(
        r"SELECT * FROM notifications
          WHERE recipient_id = $1
          ORDER BY created_at DESC
          LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(db_error!("list_notifications", user_id = %user_id))
}

/// Unread urgent and expired notifications for the dashboard banner.
pub async fn list_banner(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Vec<NotificationRecord>> {
    sqlx::query_as::<_, NotificationRecord>(
        r"SELECT * FROM notifications
          WHERE recipient_id = $1
            AND read = FALSE
            AND kind IN ('expiring_urgent', 'expired')
          ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(db_error!("list_banner_notifications", user_id = %user_id))
}

/// Mark one notification read. Scoped to the recipient; marking twice keeps
/// the original `read_at`.
pub async fn mark_read(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> sqlx::Result<Option<NotificationRecord>> {
    sqlx::query_as::<_, NotificationRecord>(
        r"UPDATE notifications
          SET read = TRUE, read_at = COALESCE(read_at, NOW())
          WHERE id = $1 AND recipient_id = $2
          RETURNING *",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("mark_notification_read", notification_id = %id))
}

/// Mark everything read for a user. Returns how many rows changed.
pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r"UPDATE notifications
          SET read = TRUE, read_at = NOW()
          WHERE recipient_id = $1 AND read = FALSE",
    )
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(db_error!("mark_all_notifications_read", user_id = %user_id))?;
    Ok(result.rows_affected())
}

/// Unread notification count for a user.
pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND read = FALSE",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(db_error!("unread_notification_count", user_id = %user_id))
}
