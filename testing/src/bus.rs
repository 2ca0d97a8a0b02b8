//! In-memory availability transport.
//!
//! One `tokio::sync::broadcast` channel per topic. A receiver that falls more
//! than `capacity` messages behind observes [`BusError::Lagged`], which lets tests
//! exercise the notifier's resync path.

use async_stream::stream;
use roaman_core::availability::{
    AvailabilityBus, BusError, BusFuture, Notification, NotificationStream, Topic,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, broadcast};

/// Default per-topic channel capacity.
pub const DEFAULT_CAPACITY: usize = 1000;

type Channels = Arc<RwLock<HashMap<Topic, broadcast::Sender<Notification>>>>;

/// Topic-keyed broadcast bus for tests.
///
/// # Example
///
/// ```ignore
/// let bus = InMemoryBus::new();
/// let mut stream = bus.subscribe(&Topic::AllRooms).await?;
/// bus.publish(&Topic::AllRooms, &notification).await?;
/// assert_eq!(stream.next().await, Some(Ok(notification)));
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    channels: Channels,
    capacity: usize,
    offline: Arc<AtomicBool>,
    published: Arc<std::sync::Mutex<Vec<(Topic, Notification)>>>,
}

impl InMemoryBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose per-topic channels hold `capacity` messages.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            offline: Arc::new(AtomicBool::new(false)),
            published: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Simulate a transport outage: publishes and new subscriptions fail, and
    /// every open stream ends.
    pub async fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
        self.disconnect_all().await;
    }

    /// End the outage started by [`go_offline`](Self::go_offline).
    pub fn go_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    /// End every open stream without taking the bus offline.
    pub async fn disconnect_all(&self) {
        self.channels.write().await.clear();
    }

    /// Every successful publish so far, in order.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Test helper: poisoning means a test already panicked
    pub fn published(&self) -> Vec<(Topic, Notification)> {
        self.published.lock().unwrap().clone()
    }

    /// Number of topics with a live channel.
    pub async fn topic_count(&self) -> usize {
        self.channels.read().await.len()
    }

    async fn sender(&self, topic: Topic) -> broadcast::Sender<Notification> {
        let mut channels = self.channels.write().await;
        channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    fn check_online(&self) -> Result<(), BusError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(BusError::Connection("in-memory bus is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailabilityBus for InMemoryBus {
    #[allow(clippy::unwrap_used)] // Test helper: poisoning means a test already panicked
    fn publish<'a>(
        &'a self,
        topic: &'a Topic,
        notification: &'a Notification,
    ) -> BusFuture<'a, ()> {
        Box::pin(async move {
            self.check_online().map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
            let sender = self.sender(*topic).await;
            // No receivers is not an error.
            let _ = sender.send(notification.clone());
            self.published
                .lock()
                .unwrap()
                .push((*topic, notification.clone()));
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a Topic) -> BusFuture<'a, NotificationStream> {
        Box::pin(async move {
            self.check_online()?;
            let mut receiver = self.sender(*topic).await.subscribe();

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
