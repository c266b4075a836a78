//! Connection Manager
//!
//! Orchestrates the connection lifecycle: the authorization handshake,
//! manual token refresh, revocation, and the forced expiry used when the
//! provider rejects a token outright. Status only ever moves forward
//! (`connected` -> `expiring` -> `expired`) except through a successful
//! refresh or a fresh handshake; `revoked` is terminal.

use std::sync::Arc;

use chrono::Utc;
use hl_common::{ConnectionStatus, DashboardEvent, NotificationKind};
use sqlx::PgPool;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::db::PageConnection;
use crate::events::EventBus;
use crate::monitor::days_remaining;
use crate::notifications::NotificationEngine;
use crate::provider::{ProviderClient, ProviderError};
use crate::secrets;
use crate::webhooks::WebhookSubscriptionService;

use super::error::{ConnectError, ConnectResult};
use super::{queries, sessions};

/// A started handshake: where to send the browser.
#[derive(Debug)]
pub struct StartedConnection {
    pub authorize_url: String,
    pub session_id: Uuid,
}

#[derive(Clone)]
pub struct ConnectionManager {
    db: PgPool,
    config: Arc<Config>,
    provider: Arc<dyn ProviderClient>,
    events: EventBus,
    engine: NotificationEngine,
    webhooks: WebhookSubscriptionService,
    token_key: Vec<u8>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(
        db: PgPool,
        config: Arc<Config>,
        provider: Arc<dyn ProviderClient>,
        events: EventBus,
        engine: NotificationEngine,
        webhooks: WebhookSubscriptionService,
        token_key: Vec<u8>,
    ) -> Self {
        Self {
            db,
            config,
            provider,
            events,
            engine,
            webhooks,
            token_key,
        }
    }

    /// Start a handshake for a page URL on behalf of a user.
    ///
    /// Persists a single-use session keyed by the hash of a fresh state
    /// token and hands back the provider authorize URL carrying that token.
    #[tracing::instrument(skip(self, page_url))]
    pub async fn start_connection(
        &self,
        owner_id: Uuid,
        page_url: &str,
    ) -> ConnectResult<StartedConnection> {
        let page_url = page_url.trim();
        if page_url.is_empty() {
            return Err(ConnectError::MissingPageUrl);
        }
        validate_page_url(page_url, &self.config.provider_allowed_domains)?;

        let state_token = secrets::generate_state_token();
        let nonce = secrets::generate_nonce();

        let session = sessions::create(
            &self.db,
            owner_id,
            page_url,
            &secrets::hash_state_token(&state_token),
            &nonce,
            self.config.oauth_session_ttl_secs,
        )
        .await?;

        info!(session_id = %session.id, owner_id = %owner_id, "Started connection handshake");

        Ok(StartedConnection {
            authorize_url: self.provider.authorize_url(&state_token, &nonce),
            session_id: session.id,
        })
    }

    /// Complete a handshake from the provider callback.
    ///
    /// The session is claimed before the code is exchanged, so a replayed
    /// callback fails fast instead of burning a second exchange. After the
    /// token is sealed and stored, webhook subscription is attempted; its
    /// failure does not undo the connection.
    #[tracing::instrument(skip(self, code, state_token))]
    pub async fn complete_connection(
        &self,
        code: &str,
        state_token: &str,
    ) -> ConnectResult<PageConnection> {
        let session = sessions::claim(&self.db, state_token).await?;

        let grant = self.provider.exchange_code(code).await?;
        let sealed = secrets::seal_token(&grant.access_token, &self.token_key)?;

        let connection = queries::upsert_connection(
            &self.db,
            queries::NewConnection {
                external_page_id: &grant.external_page_id,
                page_name: &grant.page_name,
                owner_id: session.owner_id,
                access_token_sealed: &sealed,
                expires_at: grant.expires_at,
            },
        )
        .await?;

        info!(
            page_id = %connection.id,
            external_page_id = %connection.external_page_id,
            owner_id = %session.owner_id,
            "Page connection established"
        );

        self.events
            .publish(DashboardEvent::ConnectionEstablished {
                page_id: connection.id,
                external_page_id: connection.external_page_id.clone(),
                page_name: connection.page_name.clone(),
                status: connection.status,
            })
            .await;

        // Webhook subscription is part of establishing a connection, but a
        // subscription failure leaves the connection itself standing.
        if let Err(e) = self
            .webhooks
            .subscribe(&connection, &grant.access_token)
            .await
        {
            warn!(page_id = %connection.id, error = %e, "Webhook subscription failed after handshake");
        }

        // Re-read so the response reflects the webhook outcome.
        queries::find_connection(&self.db, connection.id)
            .await?
            .ok_or(ConnectError::ConnectionNotFound)
    }

    /// Refresh the access token of a connection.
    ///
    /// Success stores the new sealed token, returns the connection to
    /// `connected`, and clears expiry bookkeeping. Failure leaves the status
    /// untouched, counts the attempt, and notifies recipients with a kind
    /// matching how terminal the failure is.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_connection(&self, page_id: Uuid) -> ConnectResult<PageConnection> {
        let connection = self.get(page_id).await?;
        if connection.status == ConnectionStatus::Revoked {
            return Err(ConnectError::ConnectionRevoked);
        }

        let current_token = secrets::unseal_token(&connection.access_token_sealed, &self.token_key)?;

        match self.provider.refresh_token(&current_token).await {
            Ok(grant) => {
                let sealed = secrets::seal_token(&grant.access_token, &self.token_key)?;
                let updated = queries::apply_refresh(&self.db, page_id, &sealed, grant.expires_at)
                    .await?
                    .ok_or(ConnectError::ConnectionRevoked)?;

                info!(page_id = %page_id, expires_at = %updated.expires_at, "Connection token refreshed");

                self.events
                    .publish(DashboardEvent::ConnectionUpdated {
                        page_id: updated.id,
                        status: updated.status,
                        expires_at: updated.expires_at,
                    })
                    .await;

                Ok(updated)
            }
            Err(provider_error) => {
                warn!(page_id = %page_id, error = %provider_error, "Connection token refresh failed");
                queries::record_refresh_failure(&self.db, page_id).await?;

                let kind = match provider_error {
                    ProviderError::TokenInvalid
                    | ProviderError::InvalidGrant
                    | ProviderError::PageNotFound => NotificationKind::Expired,
                    ProviderError::NetworkFailure | ProviderError::RateLimited => {
                        NotificationKind::ExpiringUrgent
                    }
                };
                let days = days_remaining(connection.expires_at, Utc::now());
                if let Err(e) = self.engine.emit(page_id, kind, days).await {
                    warn!(page_id = %page_id, error = %e, "Failed to notify about refresh failure");
                }

                Err(provider_error.into())
            }
        }
    }

    /// Revoke a connection. Idempotent: revoking an already revoked
    /// connection succeeds without a second event.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, page_id: Uuid) -> ConnectResult<PageConnection> {
        if let Some(revoked) = queries::mark_revoked(&self.db, page_id).await? {
            info!(page_id = %page_id, "Connection revoked");
            self.events
                .publish(DashboardEvent::ConnectionRevoked { page_id })
                .await;
            return Ok(revoked);
        }

        // No row changed: either the connection does not exist, or it was
        // already revoked (the only status the update's guard excludes).
        queries::find_connection(&self.db, page_id)
            .await?
            .ok_or(ConnectError::ConnectionNotFound)
    }

    /// Force a connection to `expired` after the provider rejected its
    /// token. No-op (and no event) when it is already expired or revoked.
    pub async fn expire_for_invalid_token(
        &self,
        page_id: Uuid,
    ) -> ConnectResult<Option<PageConnection>> {
        expire_for_invalid_token(&self.db, &self.events, page_id).await
    }

    /// All connections, newest first.
    pub async fn list(&self) -> ConnectResult<Vec<PageConnection>> {
        Ok(queries::list_connections(&self.db).await?)
    }

    /// A single connection.
    pub async fn get(&self, page_id: Uuid) -> ConnectResult<PageConnection> {
        queries::find_connection(&self.db, page_id)
            .await?
            .ok_or(ConnectError::ConnectionNotFound)
    }
}

/// Force-expire a connection whose token the provider rejected.
///
/// Free function so the webhook service can escalate without holding a
/// manager. Publishes a status event only when the row actually moved.
pub async fn expire_for_invalid_token(
    pool: &PgPool,
    events: &EventBus,
    page_id: Uuid,
) -> ConnectResult<Option<PageConnection>> {
    let expired = queries::mark_expired(pool, page_id).await?;

    if let Some(connection) = &expired {
        warn!(page_id = %page_id, "Connection force-expired after provider token rejection");
        events
            .publish(DashboardEvent::ConnectionUpdated {
                page_id: connection.id,
                status: connection.status,
                expires_at: connection.expires_at,
            })
            .await;
    }

    Ok(expired)
}

/// Check that a requested page URL is well-formed and points at the
/// provider. An empty allowlist accepts any host.
fn validate_page_url(raw: &str, allowed_domains: &[String]) -> ConnectResult<()> {
    let url = Url::parse(raw).map_err(|_| ConnectError::InvalidPageUrl(raw.to_string()))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConnectError::InvalidPageUrl(raw.to_string()));
    }

    let Some(host) = url.host_str() else {
        return Err(ConnectError::InvalidPageUrl(raw.to_string()));
    };

    if allowed_domains.is_empty() {
        return Ok(());
    }

    let host = host.to_lowercase();
    let allowed = allowed_domains
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")));
    if allowed {
        Ok(())
    } else {
        Err(ConnectError::InvalidPageUrl(raw.to_string()))
    }
}
