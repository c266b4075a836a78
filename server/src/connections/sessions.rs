//! Authorization Handshake Sessions
//!
//! Persistence and single-use claiming of handshake state. The state token
//! leaves the server only inside the authorize URL; the database sees its
//! SHA-256 hash. Expired rows are garbage-collected lazily when a callback
//! presents their token.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{debug, error};
use uuid::Uuid;

use crate::db::queries::db_error;
use crate::db::OAuthSession;
use crate::secrets;

use super::error::{ConnectError, ConnectResult, SessionError};

/// Create a handshake session for a user wanting to connect `page_url`.
pub async fn create(
    pool: &PgPool,
    owner_id: Uuid,
    page_url: &str,
    state_hash: &str,
    nonce: &str,
    ttl_secs: i64,
) -> sqlx::Result<OAuthSession> {
    sqlx::query_as::<_, OAuthSession>(
        r"INSERT INTO oauth_sessions (id, state_hash, nonce, requested_page_url, owner_id, expires_at)
          VALUES ($1, $2, $3, $4, $5, $6)
          RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(state_hash)
    .bind(nonce)
    .bind(page_url)
    .bind(owner_id)
    .bind(Utc::now() + Duration::seconds(ttl_secs))
    .fetch_one(pool)
    .await
    .map_err(db_error!("create_oauth_session", owner_id = %owner_id))
}

/// Claim the session matching a presented state token.
///
/// Claiming is single-use: the `consumed` flag is flipped with a conditional
/// update, so of two callbacks racing on the same token exactly one wins and
/// the other sees [`SessionError::AlreadyConsumed`].
pub async fn claim(pool: &PgPool, state_token: &str) -> ConnectResult<OAuthSession> {
    let state_hash = secrets::hash_state_token(state_token);

    let session = sqlx::query_as::<_, OAuthSession>(
        "SELECT * FROM oauth_sessions WHERE state_hash = $1",
    )
    .bind(&state_hash)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("find_oauth_session"))?
    .ok_or(SessionError::InvalidState)?;

    if session.expires_at <= Utc::now() {
        // Lazy GC: the dead row served its last purpose producing this error.
        sqlx::query("DELETE FROM oauth_sessions WHERE id = $1")
            .bind(session.id)
            .execute(pool)
            .await
            .map_err(db_error!("delete_expired_oauth_session", session_id = %session.id))?;
        debug!(session_id = %session.id, "Deleted expired handshake session");
        return Err(SessionError::Expired.into());
    }

    if session.consumed {
        return Err(SessionError::AlreadyConsumed.into());
    }

    let claimed = sqlx::query_as::<_, OAuthSession>(
        r"UPDATE oauth_sessions
          SET consumed = TRUE, consumed_at = NOW()
          WHERE id = $1 AND NOT consumed
          RETURNING *",
    )
    .bind(session.id)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("claim_oauth_session", session_id = %session.id))?;

    claimed.ok_or_else(|| ConnectError::from(SessionError::AlreadyConsumed))
}
