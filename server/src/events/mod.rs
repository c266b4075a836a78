//! Dashboard Event Bus
//!
//! Best-effort fan-out of [`DashboardEvent`]s. Events reach local subscribers
//! through a tokio broadcast channel and other server instances through a
//! Redis pub/sub channel. Publishing never fails the operation that emitted
//! the event: delivery problems are logged and swallowed.

mod bridge;

pub use bridge::spawn_event_bridge;

use fred::prelude::*;
use hl_common::DashboardEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// Redis channel that carries cross-instance dashboard events.
pub const EVENTS_CHANNEL: &str = "dashboard:events";

/// Local broadcast capacity. Slow subscribers lag and miss events rather
/// than block publishers.
const BUS_CAPACITY: usize = 256;

/// Wire envelope for events crossing Redis. The origin tag lets the bridge
/// drop this instance's own events instead of re-broadcasting them.
#[derive(Debug, Serialize, Deserialize)]
struct BusEnvelope {
    origin: Uuid,
    event: DashboardEvent,
}

#[derive(Clone)]
pub struct EventBus {
    origin: Uuid,
    tx: broadcast::Sender<DashboardEvent>,
    redis: Option<fred::clients::Client>,
}

impl EventBus {
    /// Create a bus. Without a Redis client events stay in-process, which is
    /// what unit tests want.
    #[must_use]
    pub fn new(redis: Option<fred::clients::Client>) -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            origin: Uuid::now_v7(),
            tx,
            redis,
        }
    }

    /// Identifier of this server instance on the bus.
    #[must_use]
    pub const fn origin(&self) -> Uuid {
        self.origin
    }

    /// Subscribe to events seen by this instance, local and bridged.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to local subscribers and to other instances.
    ///
    /// Fire-and-forget: absence of subscribers is not an error, and a Redis
    /// outage only costs cross-instance delivery.
    pub async fn publish(&self, event: DashboardEvent) {
        self.broadcast_local(event.clone());

        let Some(redis) = &self.redis else {
            return;
        };

        let envelope = BusEnvelope {
            origin: self.origin,
            event,
        };
        match serde_json::to_string(&envelope) {
            Ok(payload) => {
                if let Err(e) = redis.publish::<(), _, _>(EVENTS_CHANNEL, payload).await {
                    warn!(error = %e, "Failed to publish dashboard event to Redis");
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to serialize dashboard event");
            }
        }
    }

    /// Deliver an event to local subscribers only. Used by the bridge for
    /// events that already crossed Redis.
    pub(crate) fn broadcast_local(&self, event: DashboardEvent) {
        // send only errors when there are no receivers
        let _ = self.tx.send(event);
    }
}
