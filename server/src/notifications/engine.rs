//! Notification Engine
//!
//! Turns lifecycle findings into notifications. Recipients are the page
//! owner and every admin; creation is deduplicated per UTC day by the
//! database. Each created notification is published on the event bus and,
//! for recipients who opted in, mirrored to email. Email and event delivery
//! are best-effort and never fail the emit.

use chrono::Utc;
use hl_common::{DashboardEvent, NotificationKind};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connections;
use crate::db::{find_user_by_id, list_admin_users, NotificationRecord, User};
use crate::email::EmailService;
use crate::events::EventBus;

use super::error::{NotificationError, NotificationResult};
use super::queries;

#[derive(Clone)]
pub struct NotificationEngine {
    db: PgPool,
    events: EventBus,
    email: Option<EmailService>,
}

impl NotificationEngine {
    #[must_use]
    pub fn new(db: PgPool, events: EventBus, email: Option<EmailService>) -> Self {
        Self { db, events, email }
    }

    /// Emit a notification about a page to the owner and all admins.
    ///
    /// Returns the records actually created; recipients already notified
    /// with the same kind for this page today are silently skipped.
    #[tracing::instrument(skip(self))]
    pub async fn emit(
        &self,
        page_id: Uuid,
        kind: NotificationKind,
        days_remaining: i64,
    ) -> NotificationResult<Vec<NotificationRecord>> {
        let connection = connections::queries::find_connection(&self.db, page_id)
            .await?
            .ok_or(NotificationError::PageNotFound)?;

        let mut recipients = list_admin_users(&self.db).await?;
        if !recipients.iter().any(|u| u.id == connection.owner_id) {
            if let Some(owner) = find_user_by_id(&self.db, connection.owner_id).await? {
                recipients.push(owner);
            }
        }

        let day_bucket = Utc::now().date_naive();
        let mut created = Vec::new();

        for recipient in recipients {
            let Some(record) = queries::insert_notification(
                &self.db,
                page_id,
                recipient.id,
                kind,
                days_remaining,
                day_bucket,
            )
            .await?
            else {
                debug!(
                    page_id = %page_id,
                    recipient_id = %recipient.id,
                    kind = %kind,
                    "Notification deduplicated"
                );
                continue;
            };

            self.events
                .publish(DashboardEvent::NotificationCreated {
                    notification_id: record.id,
                    recipient_id: record.recipient_id,
                    page_id: record.page_id,
                    kind: record.kind,
                    days_remaining: record.days_remaining,
                })
                .await;

            self.send_email_alert(&recipient, &connection.page_name, kind, days_remaining)
                .await;

            created.push(record);
        }

        Ok(created)
    }

    /// Mirror a notification to email when the recipient opted in.
    async fn send_email_alert(
        &self,
        recipient: &User,
        page_name: &str,
        kind: NotificationKind,
        days_remaining: i64,
    ) {
        let Some(email_service) = &self.email else {
            return;
        };
        if !recipient.email_notifications {
            return;
        }
        let Some(address) = &recipient.email else {
            return;
        };

        if let Err(e) = email_service
            .send_lifecycle_alert(address, &recipient.display_name, page_name, kind, days_remaining)
            .await
        {
            warn!(recipient_id = %recipient.id, error = %e, "Failed to send alert email");
        }
    }

    /// Recent notifications for a user, newest first.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> NotificationResult<Vec<NotificationRecord>> {
        Ok(queries::list_for_user(&self.db, user_id, limit).await?)
    }

    /// Unread urgent and expired notifications for an admin's banner.
    pub async fn banner_for_user(&self, user_id: Uuid) -> NotificationResult<Vec<NotificationRecord>> {
        Ok(queries::list_banner(&self.db, user_id).await?)
    }

    /// Mark one of the user's notifications read.
    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> NotificationResult<NotificationRecord> {
        queries::mark_read(&self.db, id, user_id)
            .await?
            .ok_or(NotificationError::NotFound)
    }

    /// Mark all of the user's notifications read.
    pub async fn mark_all_read(&self, user_id: Uuid) -> NotificationResult<u64> {
        Ok(queries::mark_all_read(&self.db, user_id).await?)
    }

    /// Unread notification count for a user.
    pub async fn unread_count(&self, user_id: Uuid) -> NotificationResult<i64> {
        Ok(queries::unread_count(&self.db, user_id).await?)
    }
}
