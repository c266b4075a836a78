//! Redis Event Bridge
//!
//! Subscribes to the cross-instance event channel and re-broadcasts foreign
//! events to this instance's local subscribers. Events published by this
//! instance are recognized by their origin tag and dropped.

use fred::prelude::*;
use tracing::{debug, error, warn};

use super::{BusEnvelope, EventBus, EVENTS_CHANNEL};

/// Spawn the bridge task. The task runs until the subscriber connection
/// closes; a Redis outage therefore disables cross-instance delivery until
/// restart, while local delivery keeps working.
pub fn spawn_event_bridge(
    redis: fred::clients::Client,
    bus: EventBus,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_bridge(redis, bus).await {
            error!(error = %e, "Dashboard event bridge stopped");
        }
    })
}

async fn run_bridge(redis: fred::clients::Client, bus: EventBus) -> Result<(), Error> {
    // Dedicated subscriber connection; the shared client stays usable for
    // regular commands.
    let subscriber = redis.clone_new();
    subscriber.connect();
    subscriber.wait_for_connect().await?;

    let mut pubsub_stream = subscriber.message_rx();
    subscriber.subscribe(EVENTS_CHANNEL).await?;
    debug!(channel = EVENTS_CHANNEL, "Dashboard event bridge subscribed");

    loop {
        match pubsub_stream.recv().await {
            Ok(message) => {
                let Some(payload) = message.value.as_str() else {
                    warn!("Dropping non-string payload on the event channel");
                    continue;
                };
                match serde_json::from_str::<BusEnvelope>(&payload) {
                    Ok(envelope) => {
                        if envelope.origin == bus.origin() {
                            continue;
                        }
                        bus.broadcast_local(envelope.event);
                    }
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed dashboard event envelope");
                    }
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event bridge lagged behind Redis pub/sub");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                return Ok(());
            }
        }
    }
}
