//! Notification HTTP handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::AuthUser;

use super::error::{NotificationError, NotificationResult};
use super::types::{
    ListQuery, MarkAllReadResponse, NotificationListResponse, NotificationResponse,
    UnreadCountResponse,
};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

/// List the current user's notifications, newest first.
#[utoipa::path(
    get,
    path = "/notifications",
    params(ListQuery),
    responses(
        (status = 200, description = "Notifications for the current user", body = NotificationListResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "notifications"
)]
#[tracing::instrument(skip(state, user))]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> NotificationResult<Json<NotificationListResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let records = state.notifications.list_for_user(user.id, limit).await?;

    Ok(Json(NotificationListResponse {
        notifications: records.into_iter().map(NotificationResponse::from).collect(),
    }))
}

/// Unread urgent and expired notifications for the admin banner.
#[utoipa::path(
    get,
    path = "/notifications/banner",
    responses(
        (status = 200, description = "Unread urgent notifications", body = NotificationListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin")
    ),
    tag = "notifications"
)]
#[tracing::instrument(skip(state, user))]
pub async fn banner_notifications(
    State(state): State<AppState>,
    user: AuthUser,
) -> NotificationResult<Json<NotificationListResponse>> {
    if !user.is_admin {
        return Err(NotificationError::AdminRequired);
    }

    let records = state.notifications.banner_for_user(user.id).await?;

    Ok(Json(NotificationListResponse {
        notifications: records.into_iter().map(NotificationResponse::from).collect(),
    }))
}

/// Unread notification count for the current user.
#[utoipa::path(
    get,
    path = "/notifications/unread-count",
    responses(
        (status = 200, description = "Unread count", body = UnreadCountResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "notifications"
)]
#[tracing::instrument(skip(state, user))]
pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> NotificationResult<Json<UnreadCountResponse>> {
    let count = state.notifications.unread_count(user.id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// Mark one notification read.
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification marked read", body = NotificationResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Notification not found")
    ),
    tag = "notifications"
)]
#[tracing::instrument(skip(state, user))]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> NotificationResult<Json<NotificationResponse>> {
    let record = state.notifications.mark_read(id, user.id).await?;
    Ok(Json(NotificationResponse::from(record)))
}

/// Mark all of the current user's notifications read.
#[utoipa::path(
    post,
    path = "/notifications/read-all",
    responses(
        (status = 200, description = "All notifications marked read", body = MarkAllReadResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "notifications"
)]
#[tracing::instrument(skip(state, user))]
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    user: AuthUser,
) -> NotificationResult<Json<MarkAllReadResponse>> {
    let updated = state.notifications.mark_all_read(user.id).await?;
    Ok(Json(MarkAllReadResponse {
        success: true,
        updated,
    }))
}
