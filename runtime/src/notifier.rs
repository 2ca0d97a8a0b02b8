//! The availability notifier.
//!
//! [`AvailabilityNotifier`] is the single writer of the availability feed and the
//! factory for [`Subscription`]s. It pairs the push stream from an
//! [`AvailabilityBus`] with pull reconciliation against the [`BookingStore`]:
//!
//! - [`AvailabilityNotifier::publish`] fans a committed change out to its topics
//! - [`AvailabilityNotifier::connect`] authorizes a topic and opens a subscription
//! - [`AvailabilityNotifier::count_by_status`] and
//!   [`AvailabilityNotifier::status_summary`] answer the resync queries
//!
//! # Subscriptions
//!
//! A subscription runs one background task that owns the transport stream. The
//! task reconnects with exponential backoff and, on every (re)connect and after
//! the transport reports lag, enqueues a fresh snapshot of the topic so the
//! consumer converges on committed truth. Pending notifications are coalesced
//! per room (or booking): a slow consumer may skip intermediate states but
//! always receives the newest one.
//!
//! ```text
//!   transport ──▶ task ──filter by topic──▶ coalescing buffer ──▶ Subscription::next
//!                  │  ▲                         ▲
//!        lag/drop  │  │ backoff                 │ snapshot
//!                  ▼  │                         │
//!             Disconnected ──────────────▶ BookingStore
//! ```

use crate::metrics::NotifierMetrics;
use crate::retry::RetryPolicy;
use futures::StreamExt;
use roaman_core::auth::Principal;
use roaman_core::availability::{
    AvailabilityBus, BookingUpdate, BusError, ConnectionState, Notification, NotificationKey,
    NotificationStream, RoomUpdate, Topic,
};
use roaman_core::error::BookingError;
use roaman_core::store::{BookingFilter, BookingStore, RoomFilter, StatusCounts};
use roaman_core::types::{Booking, HotelId, Room, RoomStatus};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

/// Bookings included in a `bookings:hotel:<id>` snapshot.
const BOOKING_SNAPSHOT_LIMIT: u32 = 200;

/// Notifier settings.
#[derive(Clone, Debug, PartialEq)]
pub struct NotifierConfig {
    /// Backoff between reconnect attempts; `max_retries` is ignored
    pub reconnect: RetryPolicy,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            reconnect: RetryPolicy::builder()
                .initial_delay(Duration::from_millis(250))
                .max_delay(Duration::from_secs(10))
                .build(),
        }
    }
}

impl NotifierConfig {
    /// Set the reconnect delay bounds.
    #[must_use]
    pub fn with_reconnect_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect = RetryPolicy::builder()
            .initial_delay(initial)
            .max_delay(max)
            .multiplier(self.reconnect.multiplier)
            .build();
        self
    }
}

/// Publishes committed changes and serves subscriptions.
#[derive(Clone)]
pub struct AvailabilityNotifier {
    bus: Arc<dyn AvailabilityBus>,
    store: Arc<dyn BookingStore>,
    config: NotifierConfig,
}

impl AvailabilityNotifier {
    /// Create a notifier over a transport and the store used for snapshots.
    #[must_use]
    pub fn new(
        bus: Arc<dyn AvailabilityBus>,
        store: Arc<dyn BookingStore>,
        config: NotifierConfig,
    ) -> Self {
        Self { bus, store, config }
    }

    /// Publish a committed change to every topic it belongs to.
    ///
    /// Transport failures are logged and counted, never returned: the change is
    /// already durable and subscribers recover it through reconciliation.
    pub async fn publish(&self, notification: Notification) {
        for topic in notification.topics() {
            match self.bus.publish(&topic, &notification).await {
                Ok(()) => NotifierMetrics::record_publish(),
                Err(err) => {
                    NotifierMetrics::record_publish_error();
                    tracing::warn!(topic = %topic, error = %err, "Failed to publish notification");
                }
            }
        }
    }

    /// Open a subscription to `topic` for `principal`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`]: malformed topic or unknown hotel
    /// - [`BookingError::Authorization`]: principal may not read the topic
    /// - [`BookingError::Internal`]: the hotel lookup failed
    pub async fn connect(
        &self,
        principal: &Principal,
        topic: &str,
    ) -> Result<Subscription, BookingError> {
        let topic: Topic = topic
            .parse()
            .map_err(|_| BookingError::not_found("topic", topic))?;
        topic.authorize(principal)?;

        if let Some(hotel_id) = topic.hotel_id() {
            self.store
                .get_hotel(hotel_id)
                .await?
                .ok_or_else(|| BookingError::not_found("hotel", hotel_id))?;
        }

        tracing::debug!(topic = %topic, role = %principal.role, "Opening subscription");
        Ok(Subscription::spawn(self.clone(), topic))
    }

    /// Current state of every entity a topic covers, as notifications.
    ///
    /// # Errors
    ///
    /// [`BookingError::Internal`] if the store query fails.
    pub async fn snapshot(&self, topic: &Topic) -> Result<Vec<Notification>, BookingError> {
        let notifications = match topic {
            Topic::AllRooms => self
                .store
                .list_rooms(RoomFilter::all())
                .await?
                .iter()
                .map(room_notification)
                .collect(),
            Topic::HotelRooms(hotel_id) => self
                .store
                .list_rooms(RoomFilter::hotel(*hotel_id))
                .await?
                .iter()
                .map(room_notification)
                .collect(),
            Topic::HotelBookings(hotel_id) => {
                let filter = BookingFilter {
                    hotel_id: Some(*hotel_id),
                    status: None,
                    limit: BOOKING_SNAPSHOT_LIMIT,
                };
                self.store
                    .list_bookings(filter)
                    .await?
                    .iter()
                    .map(booking_notification)
                    .collect()
            }
        };
        Ok(notifications)
    }

    /// Number of a hotel's active rooms in `status`.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown hotel.
    pub async fn count_by_status(
        &self,
        hotel_id: HotelId,
        status: RoomStatus,
    ) -> Result<u64, BookingError> {
        let summary = self.status_summary(hotel_id).await?;
        Ok(summary.get(&status).copied().unwrap_or(0))
    }

    /// Count of a hotel's active rooms for every status, zeros included.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown hotel.
    pub async fn status_summary(&self, hotel_id: HotelId) -> Result<StatusCounts, BookingError> {
        self.store
            .get_hotel(hotel_id)
            .await?
            .ok_or_else(|| BookingError::not_found("hotel", hotel_id))?;

        let mut counts = self.store.count_rooms_by_status(hotel_id).await?;
        for status in RoomStatus::ALL {
            counts.entry(*status).or_insert(0);
        }
        Ok(counts)
    }
}

fn room_notification(room: &Room) -> Notification {
    Notification::Room(RoomUpdate {
        room_id: room.id,
        hotel_id: room.hotel_id,
        room_number: room.room_number.clone(),
        status: room.status,
        updated_at: room.updated_at,
    })
}

fn booking_notification(booking: &Booking) -> Notification {
    Notification::Booking(BookingUpdate {
        booking_id: booking.id,
        hotel_id: booking.hotel_id,
        room_id: booking.room_id,
        booking_reference: booking.booking_reference.clone(),
        booking_status: booking.booking_status,
        updated_at: booking.updated_at,
    })
}

// ============================================================================
// Coalescing buffer
// ============================================================================

#[derive(Default)]
struct Pending {
    order: VecDeque<NotificationKey>,
    latest: HashMap<NotificationKey, Notification>,
    /// `updated_at` of the last notification handed out per key
    delivered: HashMap<NotificationKey, DateTime<Utc>>,
    failure: Option<BookingError>,
}

/// Newest pending notification per key, handed out in first-arrival order.
///
/// A notification older than one already handed out for its key is dropped,
/// so a publish that lost a race with a later commit can never overwrite the
/// newer state at the consumer.
#[derive(Default)]
struct Coalescer {
    pending: Mutex<Pending>,
    ready: Notify,
}

impl Coalescer {
    fn push(&self, notification: Notification) {
        let key = notification.key();
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending
                .delivered
                .get(&key)
                .is_some_and(|delivered| notification.updated_at() < *delivered)
            {
                NotifierMetrics::record_stale_dropped();
                return;
            }
            match pending.latest.get(&key) {
                Some(buffered) if buffered.updated_at() > notification.updated_at() => {
                    NotifierMetrics::record_coalesced();
                    return;
                }
                Some(_) => {
                    NotifierMetrics::record_coalesced();
                    pending.latest.insert(key, notification);
                }
                None => {
                    pending.order.push_back(key);
                    pending.latest.insert(key, notification);
                }
            }
        }
        self.ready.notify_one();
    }

    fn fail(&self, error: BookingError) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure = Some(error);
        self.ready.notify_one();
    }

    fn pop(&self) -> Option<Result<Notification, BookingError>> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(error) = pending.failure.take() {
            return Some(Err(error));
        }
        while let Some(key) = pending.order.pop_front() {
            if let Some(notification) = pending.latest.remove(&key) {
                pending.delivered.insert(key, notification.updated_at());
                return Some(Ok(notification));
            }
        }
        None
    }

    fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest
            .len()
    }

    async fn next(&self) -> Result<Notification, BookingError> {
        loop {
            if let Some(item) = self.pop() {
                return item;
            }
            self.ready.notified().await;
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A live subscription to one topic.
///
/// Dropping the subscription stops its background task.
pub struct Subscription {
    topic: Topic,
    state: watch::Receiver<ConnectionState>,
    buffer: Arc<Coalescer>,
    task: JoinHandle<()>,
}

impl Subscription {
    fn spawn(notifier: AvailabilityNotifier, topic: Topic) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let buffer = Arc::new(Coalescer::default());
        let task = tokio::spawn(run_subscription(
            notifier,
            topic,
            state_tx,
            Arc::clone(&buffer),
        ));
        NotifierMetrics::subscription_opened();

        Self {
            topic,
            state: state_rx,
            buffer,
            task,
        }
    }

    /// The subscribed topic.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Current connection state. Pushed events are only trustworthy while
    /// [`ConnectionState::Connected`].
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver for connection state changes.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the subscription is connected and its snapshot is queued.
    pub async fn wait_until_connected(&self) {
        let mut state = self.state.clone();
        if state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .is_err()
        {
            tracing::debug!(topic = %self.topic, "Subscription task ended before connecting");
        }
    }

    /// Take the next pending notification without waiting.
    pub fn try_next(&mut self) -> Option<Result<Notification, BookingError>> {
        self.buffer.pop()
    }

    /// Number of coalesced notifications waiting to be read.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Wait for the next notification.
    ///
    /// # Errors
    ///
    /// [`BookingError::Internal`] when reconciliation against the store failed;
    /// the subscription keeps retrying in the background.
    pub async fn next(&mut self) -> Result<Notification, BookingError> {
        self.buffer.next().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        NotifierMetrics::subscription_closed();
    }
}

async fn run_subscription(
    notifier: AvailabilityNotifier,
    topic: Topic,
    state: watch::Sender<ConnectionState>,
    buffer: Arc<Coalescer>,
) {
    let policy = notifier.config.reconnect.clone();
    let mut backoff = policy.backoff();

    loop {
        state.send_replace(ConnectionState::Connecting);

        match notifier.bus.subscribe(&topic).await {
            Ok(mut stream) => {
                if resync(&notifier, &topic, &buffer).await {
                    state.send_replace(ConnectionState::Connected);
                    backoff.reset();
                    tracing::debug!(topic = %topic, "Subscription connected");
                    pump(&notifier, &topic, &mut stream, &buffer).await;
                }
            }
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "Subscribe failed");
            }
        }

        state.send_replace(ConnectionState::Disconnected);
        let delay = backoff.next_delay();
        NotifierMetrics::record_reconnect();
        tracing::info!(
            topic = %topic,
            attempt = backoff.attempts(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Subscription disconnected, reconnecting"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Forward transport events until the stream ends or errors.
async fn pump(
    notifier: &AvailabilityNotifier,
    topic: &Topic,
    stream: &mut NotificationStream,
    buffer: &Coalescer,
) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(notification) if topic.accepts(&notification) => buffer.push(notification),
            Ok(_) => {}
            Err(BusError::Lagged(missed)) => {
                tracing::warn!(topic = %topic, missed, "Subscriber lagged, resynchronizing");
                if !resync(notifier, topic, buffer).await {
                    return;
                }
            }
            Err(BusError::Decode(reason)) => {
                tracing::warn!(topic = %topic, reason = %reason, "Skipping undecodable notification");
            }
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "Transport error");
                return;
            }
        }
    }
}

/// Enqueue a snapshot of the topic. Returns whether it succeeded.
async fn resync(notifier: &AvailabilityNotifier, topic: &Topic, buffer: &Coalescer) -> bool {
    match notifier.snapshot(topic).await {
        Ok(notifications) => {
            for notification in notifications {
                buffer.push(notification);
            }
            true
        }
        Err(err) => {
            tracing::error!(topic = %topic, error = %err, "Reconciliation failed");
            buffer.fail(BookingError::Internal(format!(
                "reconciliation for {topic} failed: {err}"
            )));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use roaman_core::types::RoomId;

    fn update(room_id: RoomId, status: RoomStatus, offset_secs: i64) -> Notification {
        Notification::Room(RoomUpdate {
            room_id,
            hotel_id: HotelId::new(),
            room_number: "12".to_string(),
            status,
            updated_at: Utc::now() + ChronoDuration::seconds(offset_secs),
        })
    }

    fn status_of(item: Option<Result<Notification, BookingError>>) -> Option<RoomStatus> {
        match item {
            Some(Ok(Notification::Room(update))) => Some(update.status),
            _ => None,
        }
    }

    #[test]
    fn test_coalescer_keeps_newest_per_room() {
        let buffer = Coalescer::default();
        let room = RoomId::new();

        buffer.push(update(room, RoomStatus::Reserved, 0));
        buffer.push(update(room, RoomStatus::Occupied, 10));

        assert_eq!(buffer.len(), 1);
        assert_eq!(status_of(buffer.pop()), Some(RoomStatus::Occupied));
        assert!(buffer.pop().is_none());
    }

    #[test]
    fn test_coalescer_discards_stale_updates() {
        let buffer = Coalescer::default();
        let room = RoomId::new();

        buffer.push(update(room, RoomStatus::Available, 10));
        buffer.push(update(room, RoomStatus::Reserved, 0));

        assert_eq!(status_of(buffer.pop()), Some(RoomStatus::Available));
    }

    #[test]
    fn test_coalescer_drops_updates_older_than_delivered() {
        let buffer = Coalescer::default();
        let room = RoomId::new();
        let hotel_id = HotelId::new();
        let at = Utc::now();
        let room_update = |status, updated_at| {
            Notification::Room(RoomUpdate {
                room_id: room,
                hotel_id,
                room_number: "12".to_string(),
                status,
                updated_at,
            })
        };

        buffer.push(room_update(RoomStatus::Available, at + ChronoDuration::seconds(60)));
        assert_eq!(status_of(buffer.pop()), Some(RoomStatus::Available));

        // Published late by a commit that happened first.
        buffer.push(room_update(RoomStatus::Reserved, at));
        assert!(buffer.pop().is_none());

        // Same instant still goes through: a snapshot of unchanged state.
        buffer.push(room_update(RoomStatus::Available, at + ChronoDuration::seconds(60)));
        assert_eq!(status_of(buffer.pop()), Some(RoomStatus::Available));

        buffer.push(room_update(RoomStatus::Maintenance, at + ChronoDuration::seconds(90)));
        assert_eq!(status_of(buffer.pop()), Some(RoomStatus::Maintenance));
    }

    #[test]
    fn test_coalescer_preserves_first_arrival_order() {
        let buffer = Coalescer::default();
        let first = RoomId::new();
        let second = RoomId::new();

        buffer.push(update(first, RoomStatus::Reserved, 0));
        buffer.push(update(second, RoomStatus::Maintenance, 1));
        buffer.push(update(first, RoomStatus::Occupied, 2));

        assert_eq!(status_of(buffer.pop()), Some(RoomStatus::Occupied));
        assert_eq!(status_of(buffer.pop()), Some(RoomStatus::Maintenance));
    }

    #[test]
    fn test_coalescer_reports_failure_first() {
        let buffer = Coalescer::default();
        buffer.push(update(RoomId::new(), RoomStatus::Reserved, 0));
        buffer.fail(BookingError::Internal("store down".into()));

        assert!(matches!(buffer.pop(), Some(Err(BookingError::Internal(_)))));
        assert!(matches!(buffer.pop(), Some(Ok(_))));
    }
}
