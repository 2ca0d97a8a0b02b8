//! WebSocket endpoint for live availability.
//!
//! # Connection
//!
//! ```text
//! ws://localhost:8080/api/ws?topic=rooms:hotel:550e8400-...
//! X-Roaman-Role: staff
//! X-Roaman-Hotel-Id: 550e8400-...
//! ```
//!
//! Topics are `rooms:all`, `rooms:hotel:<id>` and `bookings:hotel:<id>`. The
//! topic is authorized before the upgrade, so a bad topic is answered with a
//! plain HTTP error (404 malformed or unknown hotel, 403 out of scope).
//!
//! # Message Format
//!
//! **Server → Client (connection state):**
//! ```json
//! { "type": "state", "state": "connected" }
//! ```
//!
//! **Server → Client (update):**
//! ```json
//! {
//!   "type": "update",
//!   "topic": "rooms:hotel:550e8400-...",
//!   "notification": { "type": "room", "room_id": "...", "status": "reserved", ... }
//! }
//! ```
//!
//! **Server → Client (error):**
//! ```json
//! { "type": "error", "code": "INTERNAL_ERROR", "message": "..." }
//! ```
//!
//! Updates are only trustworthy while the last state message said
//! `connected`. After every reconnect the server replays a snapshot of the
//! topic, so a client converges without polling.
//!
//! # Connection Limits
//!
//! - Max 1000 concurrent WebSocket connections per server instance
//! - Ping keep-alive every 30 seconds

use crate::error::AppError;
use crate::extractors::{Caller, ValidQuery};
use crate::state::AppState;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use roaman_core::availability::{ConnectionState, Notification, Topic};
use roaman_runtime::Subscription;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Active WebSocket connections on this instance.
static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Maximum concurrent WebSocket connections.
pub const MAX_CONNECTIONS: usize = 1000;

/// Ping interval for keep-alive (30 seconds).
const PING_INTERVAL_SECS: u64 = 30;

// ============================================================================
// Message Types
// ============================================================================

/// Query of `GET /api/ws`.
#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    /// Topic string, e.g. `rooms:hotel:<id>`
    pub topic: String,
}

/// WebSocket message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection state of the subscription changed
    State {
        /// New state
        state: ConnectionState,
    },
    /// A room or booking changed
    Update {
        /// Topic the update was delivered on
        topic: Topic,
        /// The change
        notification: Notification,
    },
    /// Reconciliation failed; the server keeps retrying
    Error {
        /// Machine-readable code
        code: String,
        /// Description
        message: String,
    },
}

/// Number of open WebSocket connections.
#[must_use]
pub fn active_connections() -> usize {
    ACTIVE_CONNECTIONS.load(Ordering::Relaxed)
}

/// Decrements the connection counter when the socket task ends.
struct ConnectionGuard;

#[allow(clippy::cast_precision_loss)] // Connection counts are far below 2^52
impl ConnectionGuard {
    fn acquire() -> (Self, usize) {
        let count = ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("websocket_connections_active").set(count as f64);
        (Self, count)
    }
}

#[allow(clippy::cast_precision_loss)] // Connection counts are far below 2^52
impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let previous = ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!("websocket_connections_active").set(previous.saturating_sub(1) as f64);
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Subscribe to a topic over a WebSocket.
///
/// # Errors
///
/// - 404 for a malformed topic or an unknown hotel
/// - 403 when the caller may not see the topic
/// - 400 when the request is not a WebSocket upgrade
/// - 503 when the connection limit is reached
///
/// ```javascript
/// const ws = new WebSocket('ws://localhost:8080/api/ws?topic=rooms:all');
/// ws.onmessage = (event) => {
///   const msg = JSON.parse(event.data);
///   if (msg.type === 'update' && msg.notification.type === 'room') {
///     render(msg.notification.room_id, msg.notification.status);
///   }
/// };
/// ```
pub async fn subscribe(
    State(state): State<AppState>,
    Caller(principal): Caller,
    ValidQuery(query): ValidQuery<SubscribeQuery>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, AppError> {
    let current = active_connections();
    if current >= MAX_CONNECTIONS {
        warn!(current_connections = current, "WebSocket connection limit exceeded");
        return Err(AppError::unavailable(
            "Too many concurrent connections. Please try again later.",
        ));
    }

    let subscription = state
        .engine
        .notifier()
        .connect(&principal, &query.topic)
        .await?;

    let Some(ws) = ws else {
        return Err(AppError::bad_request("WebSocket upgrade required"));
    };

    info!(topic = %subscription.topic(), "WebSocket subscription requested");
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, subscription))
        .into_response())
}

// ============================================================================
// Socket Loop
// ============================================================================

async fn handle_socket(socket: WebSocket, mut subscription: Subscription) {
    let (_guard, count) = ConnectionGuard::acquire();
    let topic = subscription.topic();
    info!(%topic, total_connections = count, "WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let mut states = subscription.state_changes();

    let mut ping = interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping.tick().await;

    let initial = ServerMessage::State {
        state: *states.borrow_and_update(),
    };
    if send(&mut sender, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            item = subscription.next() => {
                let message = match item {
                    Ok(notification) => ServerMessage::Update { topic, notification },
                    Err(e) => {
                        let error = AppError::from(e);
                        ServerMessage::Error {
                            code: error.code().to_string(),
                            message: error.message().to_string(),
                        }
                    }
                };
                if send(&mut sender, &message).await.is_err() {
                    break;
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    debug!(%topic, "Subscription task ended");
                    break;
                }
                let state = *states.borrow_and_update();
                if send(&mut sender, &ServerMessage::State { state }).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => {
                    debug!(%topic, "Client closed connection");
                    break;
                }
                Some(Ok(_)) => {}
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%topic, "WebSocket connection closed");
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    sender.send(Message::Text(json)).await
}
