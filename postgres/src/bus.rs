//! Availability bus over `PostgreSQL` `LISTEN`/`NOTIFY`.
//!
//! Every topic shares the single channel [`NOTIFY_CHANNEL`]. A payload is a JSON
//! envelope:
//!
//! ```json
//! { "topic": "rooms:hotel:<uuid>", "notification": { "type": "room", ... } }
//! ```
//!
//! One background task owns a [`PgListener`] and fans payloads out to
//! per-topic `broadcast` channels. Whenever the listener loses its connection
//! every open stream is ended, so subscribers reconnect and resynchronize from
//! the store instead of trusting a feed with a gap in it.

use async_stream::stream;
use roaman_core::availability::{
    AvailabilityBus, BusError, BusFuture, Notification, NotificationStream, Topic,
};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgListener, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;

/// Name of the `NOTIFY` channel.
pub const NOTIFY_CHANNEL: &str = "roaman_availability";

/// Default per-topic fan-out capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

const RELISTEN_DELAY: Duration = Duration::from_secs(1);

type Channels = Arc<RwLock<HashMap<Topic, broadcast::Sender<Notification>>>>;

#[derive(Serialize, Deserialize)]
struct Envelope {
    topic: Topic,
    notification: Notification,
}

/// `LISTEN`/`NOTIFY` transport.
///
/// Dropping the bus stops its listener task and ends every stream.
pub struct PgNotifyBus {
    pool: PgPool,
    channels: Channels,
    capacity: usize,
    listening: Arc<AtomicBool>,
    listener: JoinHandle<()>,
}

impl PgNotifyBus {
    /// Start listening with the default capacity.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_capacity(pool, DEFAULT_CAPACITY)
    }

    /// Start listening; each topic buffers up to `capacity` notifications
    /// per subscriber before it lags.
    #[must_use]
    pub fn with_capacity(pool: PgPool, capacity: usize) -> Self {
        let channels: Channels = Arc::new(RwLock::new(HashMap::new()));
        let listening = Arc::new(AtomicBool::new(false));
        let listener = tokio::spawn(listen(
            pool.clone(),
            Arc::clone(&channels),
            Arc::clone(&listening),
        ));
        Self {
            pool,
            channels,
            capacity: capacity.max(1),
            listening,
            listener,
        }
    }

    /// Whether the listener currently holds a `LISTEN` connection.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

impl Drop for PgNotifyBus {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl AvailabilityBus for PgNotifyBus {
    fn publish<'a>(
        &'a self,
        topic: &'a Topic,
        notification: &'a Notification,
    ) -> BusFuture<'a, ()> {
        Box::pin(async move {
            let publish_error = |reason: String| BusError::Publish {
                topic: topic.to_string(),
                reason,
            };
            let payload = serde_json::to_string(&Envelope {
                topic: *topic,
                notification: notification.clone(),
            })
            .map_err(|e| publish_error(e.to_string()))?;

            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(NOTIFY_CHANNEL)
                .bind(payload)
                .execute(&self.pool)
                .await
                .map_err(|e| publish_error(e.to_string()))?;
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a Topic) -> BusFuture<'a, NotificationStream> {
        Box::pin(async move {
            if !self.is_listening() {
                return Err(BusError::Connection(
                    "notification listener is not connected".to_string(),
                ));
            }

            let mut receiver = {
                let mut channels = self.channels.write().await;
                channels
                    .entry(*topic)
                    .or_insert_with(|| broadcast::channel(self.capacity).0)
                    .subscribe()
            };

            let stream: NotificationStream = Box::pin(stream! {
                loop {
                    match receiver.recv().await {
                        Ok(notification) => yield Ok(notification),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            yield Err(BusError::Lagged(missed));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            Ok(stream)
        })
    }
}

// ============================================================================
// Listener task
// ============================================================================

async fn listen(pool: PgPool, channels: Channels, listening: Arc<AtomicBool>) {
    loop {
        match connect_listener(&pool).await {
            Ok(mut listener) => {
                listening.store(true, Ordering::SeqCst);
                tracing::info!(channel = NOTIFY_CHANNEL, "Listening for availability changes");
                receive(&mut listener, &channels).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start availability listener");
            }
        }

        listening.store(false, Ordering::SeqCst);
        end_streams(&channels).await;
        metrics::counter!("availability_listener_restarts_total").increment(1);
        tokio::time::sleep(RELISTEN_DELAY).await;
    }
}

async fn connect_listener(pool: &PgPool) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(NOTIFY_CHANNEL).await?;
    Ok(listener)
}

/// Forward payloads until the listener fails.
async fn receive(listener: &mut PgListener, channels: &Channels) {
    loop {
        match listener.try_recv().await {
            Ok(Some(message)) => dispatch(message.payload(), channels).await,
            Ok(None) => {
                // The listener reconnects on the next call, but anything sent
                // in between is gone.
                tracing::warn!("Availability listener reconnected, ending open streams");
                end_streams(channels).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Availability listener failed");
                return;
            }
        }
    }
}

async fn dispatch(payload: &str, channels: &Channels) {
    let envelope: Envelope = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable availability payload");
            metrics::counter!("availability_payload_errors_total").increment(1);
            return;
        }
    };
    if !envelope.topic.accepts(&envelope.notification) {
        tracing::warn!(topic = %envelope.topic, "Dropping notification outside its topic");
        return;
    }

    let unheard = {
        let channels = channels.read().await;
        channels
            .get(&envelope.topic)
            .is_some_and(|sender| sender.send(envelope.notification).is_err())
    };
    if unheard {
        let mut channels = channels.write().await;
        if channels
            .get(&envelope.topic)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(&envelope.topic);
        }
    }
}

async fn end_streams(channels: &Channels) {
    channels.write().await.clear();
}
