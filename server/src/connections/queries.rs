//! Page Connection Queries
//!
//! Runtime queries over `page_connections`. State transitions are expressed
//! as conditional updates so concurrent writers cannot move a connection
//! backwards or resurrect a revoked row.

use chrono::{DateTime, Utc};
use hl_common::{ConnectionStatus, WebhookStatus};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::db::queries::db_error;
use crate::db::PageConnection;

/// Parameters for recording a completed handshake.
#[derive(Debug)]
pub struct NewConnection<'a> {
    pub external_page_id: &'a str,
    pub page_name: &'a str,
    pub owner_id: Uuid,
    pub access_token_sealed: &'a str,
    pub expires_at: DateTime<Utc>,
}

/// Insert or replace the live connection for an external page.
///
/// Conflicts on the partial unique index over non-revoked rows: reconnecting
/// a page that already has a live connection refreshes that row in place,
/// while revoked history rows never get in the way.
pub async fn upsert_connection(
    pool: &PgPool,
    new: NewConnection<'_>,
) -> sqlx::Result<PageConnection> {
    sqlx::query_as::<_, PageConnection>(
        r"INSERT INTO page_connections
              (id, external_page_id, page_name, owner_id, access_token_sealed, expires_at,
               status, webhook_status)
          VALUES ($1, $2, $3, $4, $5, $6, 'connected', 'unsubscribed')
          ON CONFLICT (external_page_id) WHERE status <> 'revoked'
          DO UPDATE SET
              page_name = EXCLUDED.page_name,
              owner_id = EXCLUDED.owner_id,
              access_token_sealed = EXCLUDED.access_token_sealed,
              obtained_at = NOW(),
              expires_at = EXCLUDED.expires_at,
              status = 'connected',
              webhook_status = 'unsubscribed',
              last_refreshed_at = NULL,
              last_expiry_bucket = NULL,
              refresh_failures = 0,
              updated_at = NOW()
          RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(new.external_page_id)
    .bind(new.page_name)
    .bind(new.owner_id)
    .bind(new.access_token_sealed)
    .bind(new.expires_at)
    .fetch_one(pool)
    .await
    .map_err(db_error!("upsert_connection", external_page_id = %new.external_page_id))
}

/// Find a connection by ID.
pub async fn find_connection(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<PageConnection>> {
    sqlx::query_as::<_, PageConnection>("SELECT * FROM page_connections WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_connection", page_id = %id))
}

/// List all connections, newest first.
pub async fn list_connections(pool: &PgPool) -> sqlx::Result<Vec<PageConnection>> {
    sqlx::query_as::<_, PageConnection>(
        "SELECT * FROM page_connections ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await
    .map_err(db_error!("list_connections"))
}

/// Connections the expiry monitor has to look at.
pub async fn list_for_expiry_scan(pool: &PgPool) -> sqlx::Result<Vec<PageConnection>> {
    sqlx::query_as::<_, PageConnection>(
        r"SELECT * FROM page_connections
          WHERE status IN ('connected', 'expiring')
          ORDER BY expires_at",
    )
    .fetch_all(pool)
    .await
    .map_err(db_error!("list_for_expiry_scan"))
}

/// Store a refreshed token and return the connection to `connected`.
///
/// Clears the expiry bucket so the monitor starts over against the new
/// expiry date. Returns `None` if the connection is gone or revoked.
pub async fn apply_refresh(
    pool: &PgPool,
    id: Uuid,
    access_token_sealed: &str,
    expires_at: DateTime<Utc>,
) -> sqlx::Result<Option<PageConnection>> {
    sqlx::query_as::<_, PageConnection>(
        r"UPDATE page_connections
          SET access_token_sealed = $2,
              expires_at = $3,
              status = 'connected',
              last_refreshed_at = NOW(),
              last_expiry_bucket = NULL,
              refresh_failures = 0,
              updated_at = NOW()
          WHERE id = $1 AND status <> 'revoked'
          RETURNING *",
    )
    .bind(id)
    .bind(access_token_sealed)
    .bind(expires_at)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("apply_refresh", page_id = %id))
}

/// Count a failed refresh attempt. Leaves status untouched.
pub async fn record_refresh_failure(pool: &PgPool, id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r"UPDATE page_connections
          SET refresh_failures = refresh_failures + 1, updated_at = NOW()
          WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await
    .map_err(db_error!("record_refresh_failure", page_id = %id))?;
    Ok(result.rows_affected())
}

/// Revoke a connection. Returns `None` when the row is missing or already
/// revoked, making repeated revokes indistinguishable from the first at the
/// database level.
pub async fn mark_revoked(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<PageConnection>> {
    sqlx::query_as::<_, PageConnection>(
        r"UPDATE page_connections
          SET status = 'revoked', updated_at = NOW()
          WHERE id = $1 AND status <> 'revoked'
          RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("mark_revoked", page_id = %id))
}

/// Force a connection to `expired` after the provider rejected its token.
///
/// Returns `None` when nothing changed (already expired or revoked), so the
/// caller knows not to publish a transition event.
pub async fn mark_expired(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<PageConnection>> {
    sqlx::query_as::<_, PageConnection>(
        r"UPDATE page_connections
          SET status = 'expired', last_expiry_bucket = 'expired', updated_at = NOW()
          WHERE id = $1 AND status NOT IN ('expired', 'revoked')
          RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("mark_expired", page_id = %id))
}

/// Record a webhook subscription outcome.
pub async fn set_webhook_status(
    pool: &PgPool,
    id: Uuid,
    status: WebhookStatus,
) -> sqlx::Result<Option<PageConnection>> {
    sqlx::query_as::<_, PageConnection>(
        r"UPDATE page_connections
          SET webhook_status = $2, updated_at = NOW()
          WHERE id = $1
          RETURNING *",
    )
    .bind(id)
    .bind(status)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("set_webhook_status", page_id = %id))
}

/// Move a live connection along the expiry ladder and remember the bucket.
///
/// The guard keeps the transition forward-only: rows that were revoked or
/// force-expired between scan snapshot and update are left alone.
pub async fn apply_expiry_transition(
    pool: &PgPool,
    id: Uuid,
    status: ConnectionStatus,
    bucket: &str,
) -> sqlx::Result<Option<PageConnection>> {
    sqlx::query_as::<_, PageConnection>(
        r"UPDATE page_connections
          SET status = $2, last_expiry_bucket = $3, updated_at = NOW()
          WHERE id = $1 AND status IN ('connected', 'expiring')
          RETURNING *",
    )
    .bind(id)
    .bind(status)
    .bind(bucket)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("apply_expiry_transition", page_id = %id, bucket = %bucket))
}
