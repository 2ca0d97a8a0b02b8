//! Integration tests for availability subscriptions.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use common::{Harness, request, two_nights};
use roaman_core::auth::Principal;
use roaman_core::availability::{
    AvailabilityBus, BusFuture, ConnectionState, Notification, NotificationStream, RoomUpdate,
    Topic,
};
use roaman_core::error::BookingError;
use roaman_core::types::{BookingStatus, HotelId, RoomId, RoomStatus};
use roaman_runtime::{EngineConfig, Subscription};
use roaman_testing::{InMemoryBus, fixtures};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

/// Drain everything currently buffered into room id -> latest status.
fn drain_rooms(subscription: &mut Subscription) -> HashMap<RoomId, RoomStatus> {
    let mut rooms = HashMap::new();
    while let Some(item) = subscription.try_next() {
        if let Notification::Room(update) = item.unwrap() {
            rooms.insert(update.room_id, update.status);
        }
    }
    rooms
}

/// Wait until the subscription delivers `room_id` in `status`.
async fn wait_for_status(subscription: &mut Subscription, room_id: RoomId, status: RoomStatus) {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Notification::Room(update) = subscription.next().await.unwrap() {
                if update.room_id == room_id && update.status == status {
                    return;
                }
            }
        }
    })
    .await
    .expect("status update not delivered");
}

async fn wait_for_state(subscription: &Subscription, wanted: ConnectionState) {
    let mut changes = subscription.state_changes();
    tokio::time::timeout(WAIT, changes.wait_for(|s| *s == wanted))
        .await
        .expect("state not reached")
        .unwrap();
}

#[tokio::test]
async fn test_connect_delivers_snapshot_then_updates() {
    let h = Harness::new(3);
    let topic = format!("rooms:hotel:{}", h.hotel.hotel.id);
    let mut subscription = h
        .engine
        .notifier()
        .connect(&h.staff(), &topic)
        .await
        .unwrap();

    subscription.wait_until_connected().await;
    assert_eq!(subscription.state(), ConnectionState::Connected);
    let snapshot = drain_rooms(&mut subscription);
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.values().all(|s| *s == RoomStatus::Available));

    let room = h.room(0).clone();
    h.engine.reserve(request(&room, two_nights(), 1)).await.unwrap();
    wait_for_status(&mut subscription, room.id, RoomStatus::Reserved).await;
}

#[tokio::test]
async fn test_hotel_topic_never_sees_other_hotels() {
    let h = Harness::new(1);
    let other = fixtures::seed_hotel(&h.store, "dune-lodge", 1);
    let topic = format!("rooms:hotel:{}", h.hotel.hotel.id);
    let mut subscription = h
        .engine
        .notifier()
        .connect(&h.staff(), &topic)
        .await
        .unwrap();
    subscription.wait_until_connected().await;
    drain_rooms(&mut subscription);

    h.engine
        .reserve(request(&other.rooms[0], two_nights(), 1))
        .await
        .unwrap();
    let own = h.room(0).clone();
    h.engine.reserve(request(&own, two_nights(), 2)).await.unwrap();

    wait_for_status(&mut subscription, own.id, RoomStatus::Reserved).await;
    let rest = drain_rooms(&mut subscription);
    assert!(!rest.contains_key(&other.rooms[0].id));
}

#[tokio::test]
async fn test_foreign_update_on_hotel_channel_is_filtered() {
    let h = Harness::new(1);
    let hotel_id = h.hotel.hotel.id;
    let topic = format!("rooms:hotel:{hotel_id}");
    let mut subscription = h
        .engine
        .notifier()
        .connect(&h.staff(), &topic)
        .await
        .unwrap();
    subscription.wait_until_connected().await;
    drain_rooms(&mut subscription);

    // A misrouted event on this hotel's channel.
    let foreign = Notification::Room(RoomUpdate {
        room_id: RoomId::new(),
        hotel_id: HotelId::new(),
        room_number: "999".to_string(),
        status: RoomStatus::Occupied,
        updated_at: fixtures::at("2025-01-02T00:00:00Z"),
    });
    h.bus
        .publish(&Topic::HotelRooms(hotel_id), &foreign)
        .await
        .unwrap();

    let own = h.room(0).clone();
    h.engine.reserve(request(&own, two_nights(), 1)).await.unwrap();
    wait_for_status(&mut subscription, own.id, RoomStatus::Reserved).await;
    assert!(subscription.try_next().is_none());
}

#[tokio::test]
async fn test_connect_rejects_bad_topics_fast() {
    let h = Harness::new(1);
    let notifier = h.engine.notifier();
    let own = format!("rooms:hotel:{}", h.hotel.hotel.id);
    let unknown = format!("rooms:hotel:{}", HotelId::new());

    assert!(matches!(
        notifier.connect(&h.staff(), "rooms:everything").await,
        Err(BookingError::NotFound { .. })
    ));
    assert!(matches!(
        notifier.connect(&Principal::admin(), &unknown).await,
        Err(BookingError::NotFound { .. })
    ));
    assert!(matches!(
        notifier
            .connect(&Principal::staff(HotelId::new()), &own)
            .await,
        Err(BookingError::Authorization(_))
    ));
    assert!(matches!(
        notifier.connect(&h.staff(), "rooms:all").await,
        Err(BookingError::Authorization(_))
    ));
    assert!(notifier.connect(&Principal::admin(), "rooms:all").await.is_ok());
}

#[tokio::test]
async fn test_slow_subscriber_gets_latest_state_per_room() {
    let h = Harness::new(1);
    let room = h.room(0).clone();
    let staff = h.staff();
    let topic = format!("rooms:hotel:{}", h.hotel.hotel.id);
    let mut subscription = h
        .engine
        .notifier()
        .connect(&staff, &topic)
        .await
        .unwrap();
    subscription.wait_until_connected().await;

    let booking = h.engine.reserve(request(&room, two_nights(), 1)).await.unwrap();
    h.engine.check_in(&staff, booking.id).await.unwrap();
    h.engine.check_out(&staff, booking.id).await.unwrap();
    h.engine
        .set_room_status(&staff, room.id, RoomStatus::Cleaning)
        .await
        .unwrap();

    // Give the task time to forward everything, then read once.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(subscription.pending(), 1);
    let rooms = drain_rooms(&mut subscription);
    assert_eq!(rooms.get(&room.id), Some(&RoomStatus::Cleaning));
}

/// Holds back room publishes carrying `status`, so later commits overtake them.
struct DelayedRoomPublishes {
    inner: InMemoryBus,
    status: RoomStatus,
    delay: Duration,
}

impl AvailabilityBus for DelayedRoomPublishes {
    fn publish<'a>(
        &'a self,
        topic: &'a Topic,
        notification: &'a Notification,
    ) -> BusFuture<'a, ()> {
        Box::pin(async move {
            if matches!(notification, Notification::Room(update) if update.status == self.status) {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.publish(topic, notification).await
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a Topic) -> BusFuture<'a, NotificationStream> {
        self.inner.subscribe(topic)
    }
}

#[tokio::test]
async fn test_overtaken_publish_never_replaces_newer_state() {
    let bus = InMemoryBus::new();
    let transport = Arc::new(DelayedRoomPublishes {
        inner: bus.clone(),
        status: RoomStatus::Reserved,
        delay: Duration::from_millis(300),
    });
    let h = Harness::with_transport(1, bus, transport);
    let room = h.room(0).clone();
    let staff = h.staff();
    let topic = format!("rooms:hotel:{}", h.hotel.hotel.id);
    let mut subscription = h
        .engine
        .notifier()
        .connect(&staff, &topic)
        .await
        .unwrap();
    subscription.wait_until_connected().await;
    drain_rooms(&mut subscription);

    let reserving = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        let room = room.clone();
        async move { engine.reserve(request(&room, two_nights(), 1)).await }
    });

    // Committed, but its `reserved` update is still in flight.
    let booking = tokio::time::timeout(WAIT, async {
        loop {
            if let Some(booking) = h.store.bookings_for_room(room.id).pop() {
                return booking;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reservation not committed");

    h.clock.advance(chrono::Duration::seconds(60));
    h.engine.cancel(&staff, booking.id).await.unwrap();
    wait_for_status(&mut subscription, room.id, RoomStatus::Available).await;

    // Let the held-back update land and reach the subscription task.
    reserving.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.store.room(room.id).unwrap().status, RoomStatus::Available);
    let late = drain_rooms(&mut subscription);
    assert_eq!(late.get(&room.id), None, "stale update delivered: {late:?}");
}

#[tokio::test]
async fn test_lagged_subscriber_resyncs_from_store() {
    let h = Harness::with_config(1, EngineConfig::default(), InMemoryBus::with_capacity(1));
    let room = h.room(0).clone();
    let topic = format!("rooms:hotel:{}", h.hotel.hotel.id);
    let staff = h.staff();
    let mut subscription = h
        .engine
        .notifier()
        .connect(&staff, &topic)
        .await
        .unwrap();
    subscription.wait_until_connected().await;
    drain_rooms(&mut subscription);

    // Three room updates into a one-slot channel before the task runs.
    let booking = h.engine.reserve(request(&room, two_nights(), 1)).await.unwrap();
    h.engine.check_in(&staff, booking.id).await.unwrap();
    h.engine.check_out(&staff, booking.id).await.unwrap();

    wait_for_status(&mut subscription, room.id, RoomStatus::Available).await;
    assert_eq!(h.store.room(room.id).unwrap().status, RoomStatus::Available);
}

#[tokio::test]
async fn test_reconnect_after_outage_recovers_missed_changes() {
    let h = Harness::new(1);
    let room = h.room(0).clone();
    let topic = format!("rooms:hotel:{}", h.hotel.hotel.id);
    let mut subscription = h
        .engine
        .notifier()
        .connect(&h.staff(), &topic)
        .await
        .unwrap();
    subscription.wait_until_connected().await;
    drain_rooms(&mut subscription);

    h.bus.go_offline().await;
    wait_for_state(&subscription, ConnectionState::Disconnected).await;

    // Committed while the transport is down: nothing is pushed.
    h.engine.reserve(request(&room, two_nights(), 1)).await.unwrap();
    assert_eq!(
        h.engine
            .notifier()
            .count_by_status(h.hotel.hotel.id, RoomStatus::Reserved)
            .await
            .unwrap(),
        1
    );

    h.bus.go_online();
    wait_for_state(&subscription, ConnectionState::Connected).await;
    let rooms = drain_rooms(&mut subscription);
    assert_eq!(rooms.get(&room.id), Some(&RoomStatus::Reserved));
}

#[tokio::test]
async fn test_failed_reconciliation_surfaces_internal_error() {
    let h = Harness::new(1);
    h.store.set_unavailable(true);
    let topic = format!("rooms:hotel:{}", h.hotel.hotel.id);

    // The hotel lookup at connect time also fails.
    assert!(matches!(
        h.engine.notifier().connect(&h.staff(), &topic).await,
        Err(BookingError::Internal(_))
    ));

    h.store.set_unavailable(false);
    let mut subscription = h
        .engine
        .notifier()
        .connect(&h.staff(), &topic)
        .await
        .unwrap();
    subscription.wait_until_connected().await;
    drain_rooms(&mut subscription);

    h.store.set_unavailable(true);
    h.bus.disconnect_all().await;
    let err = tokio::time::timeout(WAIT, subscription.next())
        .await
        .expect("reconciliation failure not surfaced")
        .unwrap_err();
    assert!(matches!(err, BookingError::Internal(_)));
    assert_ne!(subscription.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_status_summary_counts_every_status() {
    let h = Harness::new(3);
    let notifier = h.engine.notifier();
    h.engine
        .reserve(request(h.room(0), two_nights(), 1))
        .await
        .unwrap();
    h.engine
        .set_room_status(&h.staff(), h.room(2).id, RoomStatus::Maintenance)
        .await
        .unwrap();

    let summary = notifier.status_summary(h.hotel.hotel.id).await.unwrap();
    assert_eq!(summary.len(), RoomStatus::ALL.len());
    assert_eq!(summary[&RoomStatus::Available], 1);
    assert_eq!(summary[&RoomStatus::Reserved], 1);
    assert_eq!(summary[&RoomStatus::Maintenance], 1);
    assert_eq!(summary[&RoomStatus::Occupied], 0);

    assert!(matches!(
        notifier.status_summary(HotelId::new()).await,
        Err(BookingError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_booking_topic_carries_lifecycle() {
    let h = Harness::new(1);
    let staff = h.staff();
    let topic = format!("bookings:hotel:{}", h.hotel.hotel.id);
    let mut subscription = h.engine.notifier().connect(&staff, &topic).await.unwrap();
    subscription.wait_until_connected().await;

    let booking = h
        .engine
        .reserve(request(h.room(0), two_nights(), 1))
        .await
        .unwrap();
    h.engine.cancel(&staff, booking.id).await.unwrap();

    let seen = tokio::time::timeout(WAIT, async {
        loop {
            if let Notification::Booking(update) = subscription.next().await.unwrap() {
                if update.booking_status == BookingStatus::Cancelled {
                    return update;
                }
            }
        }
    })
    .await
    .expect("cancellation not delivered");
    assert_eq!(seen.booking_id, booking.id);
}
