//! Token Expiry Monitor
//!
//! Periodic background scan over live connections. Each pass classifies
//! every connection with status `connected` or `expiring` against the
//! configured warning windows, records transitions, and hands findings
//! to the notification engine. Passes across server instances are
//! serialized by a Redis lease; the instance that loses the race simply
//! skips its turn.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hl_common::DashboardEvent;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::connections::queries;
use crate::db::PageConnection;

mod classify;
mod lease;

pub use classify::{classify, days_remaining, ExpiryClass};

/// Start the periodic expiry scan.
///
/// The first tick is consumed immediately so a scan never competes with
/// the startup request burst. The returned `JoinHandle` belongs with the
/// other background task handles in `main`.
pub fn spawn_monitor_task(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(state.config.monitor_interval_secs));
        interval.tick().await; // consume immediate first tick
        loop {
            interval.tick().await;
            run_scan_pass(&state).await;
        }
    })
}

/// Execute one lease-guarded scan pass.
#[tracing::instrument(skip(state))]
pub async fn run_scan_pass(state: &AppState) {
    let holder = Uuid::now_v7().to_string();
    let key = state.config.monitor_lease_key.as_str();

    match lease::try_acquire(
        &state.redis,
        key,
        &holder,
        state.config.monitor_lease_ttl_secs,
    )
    .await
    {
        Ok(true) => {}
        Ok(false) => {
            debug!("Another instance holds the scan lease, skipping pass");
            return;
        }
        Err(e) => {
            error!(error = %e, "Failed to acquire scan lease");
            return;
        }
    }

    let start = Instant::now();
    let (scanned, transitioned) = scan_connections(state).await;

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        scanned, transitioned, "Expiry scan pass completed"
    );

    lease::release(&state.redis, key, &holder).await;
}

/// Classify every live connection; returns (scanned, transitioned).
async fn scan_connections(state: &AppState) -> (usize, usize) {
    let connections = match queries::list_for_expiry_scan(&state.db).await {
        Ok(connections) => connections,
        Err(e) => {
            error!(error = %e, "Failed to load connections for expiry scan");
            return (0, 0);
        }
    };

    let now = Utc::now();
    let scanned = connections.len();
    let mut transitioned = 0;

    for connection in connections {
        match classify_connection(state, &connection, now).await {
            Ok(true) => transitioned += 1,
            Ok(false) => {}
            Err(e) => {
                // One bad connection never aborts the rest of the batch.
                warn!(page_id = %connection.id, error = %e, "Skipping connection after scan error");
            }
        }
    }

    (scanned, transitioned)
}

/// Classify one connection, recording the transition when its bucket
/// changed. Returns whether a transition was written.
async fn classify_connection(
    state: &AppState,
    connection: &PageConnection,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let days = days_remaining(connection.expires_at, now);
    let class = classify(
        days,
        state.config.expiry_urgent_days,
        state.config.expiry_soon_days,
    );

    let (Some(bucket), Some(status), Some(kind)) = (class.bucket(), class.status(), class.kind())
    else {
        return Ok(false);
    };

    if connection.last_expiry_bucket.as_deref() == Some(bucket) {
        return Ok(false);
    }

    // A refresh or revoke between the load and this update wins the race;
    // the guard then matches no row and the pass moves on.
    let Some(updated) =
        queries::apply_expiry_transition(&state.db, connection.id, status, bucket).await?
    else {
        return Ok(false);
    };

    info!(
        page_id = %updated.id,
        bucket,
        days_remaining = days,
        "Connection moved to expiry bucket"
    );

    state
        .events
        .publish(DashboardEvent::ConnectionUpdated {
            page_id: updated.id,
            status: updated.status,
            expires_at: updated.expires_at,
        })
        .await;

    state.notifications.emit(connection.id, kind, days).await?;

    Ok(true)
}
