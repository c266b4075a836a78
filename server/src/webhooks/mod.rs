//! Webhook Subscription Management
//!
//! Keeps the provider's webhook subscription for each connected page in
//! step with its database record. Subscription happens once after the
//! OAuth handshake and can be retried on demand; every outcome updates
//! `webhook_status` and is announced on the event bus. A subscription
//! failure never tears down the connection itself, with one exception:
//! when the provider rejects the stored token outright the connection is
//! expired, since every later call would fail the same way.

use std::sync::Arc;

use chrono::Utc;
use hl_common::{ConnectionStatus, DashboardEvent, NotificationKind, WebhookStatus};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::connections::{self, queries, ConnectError, ConnectResult};
use crate::db::PageConnection;
use crate::events::EventBus;
use crate::monitor::days_remaining;
use crate::notifications::NotificationEngine;
use crate::provider::{ProviderClient, ProviderError};
use crate::secrets;

/// Result of a subscription attempt that reached the provider.
///
/// Provider-side failures are reported here rather than as errors so the
/// caller can show the outcome; only local failures (missing connection,
/// unsealable token, database) surface as `ConnectError`.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionOutcome {
    pub subscribed: bool,
    pub error: Option<ProviderError>,
}

#[derive(Clone)]
pub struct WebhookSubscriptionService {
    db: PgPool,
    provider: Arc<dyn ProviderClient>,
    events: EventBus,
    engine: NotificationEngine,
    token_key: Vec<u8>,
}

impl WebhookSubscriptionService {
    #[must_use]
    pub fn new(
        db: PgPool,
        provider: Arc<dyn ProviderClient>,
        events: EventBus,
        engine: NotificationEngine,
        token_key: Vec<u8>,
    ) -> Self {
        Self {
            db,
            provider,
            events,
            engine,
            token_key,
        }
    }

    /// Subscribe webhooks for a freshly established connection.
    ///
    /// Called with the plaintext token still in hand from the handshake,
    /// so no unseal round-trip is needed.
    #[tracing::instrument(skip(self, connection, access_token), fields(page_id = %connection.id))]
    pub async fn subscribe(
        &self,
        connection: &PageConnection,
        access_token: &str,
    ) -> ConnectResult<()> {
        match self
            .provider
            .subscribe_webhooks(&connection.external_page_id, access_token)
            .await
        {
            Ok(()) => {
                self.record_outcome(connection.id, WebhookStatus::Subscribed)
                    .await?;
                info!(page_id = %connection.id, "Webhooks subscribed");
                Ok(())
            }
            Err(e) => {
                self.handle_failure(connection, e).await?;
                Err(e.into())
            }
        }
    }

    /// Retry the webhook subscription for an existing connection.
    #[tracing::instrument(skip(self))]
    pub async fn resubscribe(&self, page_id: Uuid) -> ConnectResult<SubscriptionOutcome> {
        let connection = queries::find_connection(&self.db, page_id)
            .await?
            .ok_or(ConnectError::ConnectionNotFound)?;
        if connection.status == ConnectionStatus::Revoked {
            return Err(ConnectError::ConnectionRevoked);
        }

        let access_token = secrets::unseal_token(&connection.access_token_sealed, &self.token_key)?;

        match self
            .provider
            .subscribe_webhooks(&connection.external_page_id, &access_token)
            .await
        {
            Ok(()) => {
                self.record_outcome(page_id, WebhookStatus::Subscribed)
                    .await?;
                info!(page_id = %page_id, "Webhooks resubscribed");
                Ok(SubscriptionOutcome {
                    subscribed: true,
                    error: None,
                })
            }
            Err(e) => {
                self.handle_failure(&connection, e).await?;
                Ok(SubscriptionOutcome {
                    subscribed: false,
                    error: Some(e),
                })
            }
        }
    }

    /// Persist and announce a webhook status change.
    async fn record_outcome(&self, page_id: Uuid, status: WebhookStatus) -> ConnectResult<()> {
        queries::set_webhook_status(&self.db, page_id, status).await?;
        self.events
            .publish(DashboardEvent::WebhookUpdated {
                page_id,
                webhook_status: status,
            })
            .await;
        Ok(())
    }

    /// Record a failed attempt, notify recipients, and expire the
    /// connection when the provider rejected the token itself.
    async fn handle_failure(
        &self,
        connection: &PageConnection,
        error: ProviderError,
    ) -> ConnectResult<()> {
        warn!(page_id = %connection.id, error = %error, "Webhook subscription failed");
        self.record_outcome(connection.id, WebhookStatus::Failed)
            .await?;

        let days = days_remaining(connection.expires_at, Utc::now());
        if let Err(e) = self
            .engine
            .emit(connection.id, NotificationKind::WebhookFailed, days)
            .await
        {
            warn!(page_id = %connection.id, error = %e, "Failed to notify about webhook failure");
        }

        if error == ProviderError::TokenInvalid {
            connections::expire_for_invalid_token(&self.db, &self.events, connection.id).await?;
        }

        Ok(())
    }
}
