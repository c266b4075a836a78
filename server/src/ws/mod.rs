//! WebSocket Handler
//!
//! Real-time dashboard stream. A client connects with its JWT in the
//! query string and receives lifecycle events as they happen; the stream
//! is server-to-client, inbound frames beyond keepalives are ignored.
//! Events carry hints only; clients re-fetch authoritative state over
//! HTTP after anything they care about.

use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use hl_common::DashboardEvent;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{api::AppState, auth::jwt};

/// WebSocket connection query params.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT access token for authentication
    pub token: String,
}

/// WebSocket upgrade handler.
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    // Validate token before upgrade
    let claims = match jwt::validate_access_token(&query.token, &state.config.jwt_secret) {
        Ok(claims) => claims,
        Err(_) => {
            return Response::builder()
                .status(401)
                .body("Invalid token".into())
                .unwrap();
        }
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            return Response::builder()
                .status(401)
                .body("Invalid user ID in token".into())
                .unwrap();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Whether an event should reach this user's stream.
///
/// Unaddressed events are broadcast; addressed ones (notifications) go
/// only to their recipient.
fn event_is_for(event: &DashboardEvent, user_id: Uuid) -> bool {
    match event.recipient() {
        None => true,
        Some(recipient_id) => recipient_id == user_id,
    }
}

/// Forward bus events over one WebSocket connection until either side
/// goes away.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut events = state.events.subscribe();

    info!(user_id = %user_id, "Dashboard stream connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !event_is_for(&event, user_id) {
                        continue;
                    }
                    let payload = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!(error = %e, "Failed to serialize dashboard event");
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    // Client fell behind; it re-fetches state anyway.
                    warn!(user_id = %user_id, missed, "Dashboard stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                // Axum answers pings automatically; inbound payloads are ignored.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(user_id = %user_id, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    info!(user_id = %user_id, "Dashboard stream disconnected");
}
