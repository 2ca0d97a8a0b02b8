//! In-memory [`BookingStore`] with real per-room locking.
//!
//! Each room has its own `tokio::sync::Mutex`; [`ReservationTx::lock_room`]
//! acquires it with the transaction's lock timeout and holds it until commit or
//! rollback. Transactions stage their writes and apply them atomically on
//! commit, so concurrent readers never see a half-finished reservation. That is
//! enough to reproduce the production locking behavior in property and stress
//! tests without a database.
//!
//! Like the `PostgreSQL` schema, the store refuses to commit an overlapping
//! active booking or a duplicate reference even if a caller skipped the checks.

use roaman_core::error::StoreError;
use roaman_core::reference::BookingReference;
use roaman_core::store::{
    BookingFilter, BookingStore, LockedRoom, ReservationTx, RoomFilter, StatusCounts, StoreFuture,
    TxOptions,
};
use roaman_core::types::{
    Booking, BookingId, BookingStatus, Hotel, HotelId, Room, RoomId, RoomStatus, RoomType,
    RoomTypeId, StayWindow,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

type RoomLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
struct Tables {
    hotels: HashMap<HotelId, Hotel>,
    room_types: HashMap<RoomTypeId, RoomType>,
    rooms: HashMap<RoomId, Room>,
    bookings: HashMap<BookingId, Booking>,
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    room_locks: Mutex<HashMap<RoomId, RoomLock>>,
    unavailable: AtomicBool,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn room_lock(&self, room_id: RoomId) -> RoomLock {
        let mut locks = self.room_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(room_id).or_default())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Database("in-memory store is unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Thread-safe in-memory store for tests.
#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    shared: Arc<Shared>,
}

impl InMemoryBookingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a database error, or restore it.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert or replace a hotel.
    pub fn insert_hotel(&self, hotel: Hotel) {
        self.shared.write().hotels.insert(hotel.id, hotel);
    }

    /// Insert or replace a room type.
    pub fn insert_room_type(&self, room_type: RoomType) {
        self.shared.write().room_types.insert(room_type.id, room_type);
    }

    /// Insert or replace a room.
    pub fn insert_room(&self, room: Room) {
        self.shared.write().rooms.insert(room.id, room);
    }

    /// Insert a booking directly, bypassing locks and overlap checks.
    pub fn insert_booking(&self, booking: Booking) {
        self.shared.write().bookings.insert(booking.id, booking);
    }

    /// Committed state of a room.
    #[must_use]
    pub fn room(&self, room_id: RoomId) -> Option<Room> {
        self.shared.read().rooms.get(&room_id).cloned()
    }

    /// Committed state of a booking.
    #[must_use]
    pub fn booking(&self, booking_id: BookingId) -> Option<Booking> {
        self.shared.read().bookings.get(&booking_id).cloned()
    }

    /// Committed bookings of a room, oldest first.
    #[must_use]
    pub fn bookings_for_room(&self, room_id: RoomId) -> Vec<Booking> {
        let mut bookings: Vec<_> = self
            .shared
            .read()
            .bookings
            .values()
            .filter(|b| b.room_id == room_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        bookings
    }

    /// Hold a room's lock from outside any transaction, e.g. to force a
    /// reservation to time out.
    pub async fn hold_room_lock(&self, room_id: RoomId) -> OwnedMutexGuard<()> {
        self.shared.room_lock(room_id).lock_owned().await
    }
}

impl BookingStore for InMemoryBookingStore {
    fn begin(&self, options: TxOptions) -> StoreFuture<'_, Box<dyn ReservationTx>> {
        Box::pin(async move {
            self.shared.check_available()?;
            let tx: Box<dyn ReservationTx> = Box::new(InMemoryTx {
                shared: Arc::clone(&self.shared),
                lock_timeout: options.lock_timeout,
                lock: None,
                staged_rooms: HashMap::new(),
                staged_bookings: HashMap::new(),
            });
            Ok(tx)
        })
    }

    fn get_room(&self, id: RoomId) -> StoreFuture<'_, Option<Room>> {
        Box::pin(async move {
            self.shared.check_available()?;
            Ok(self.room(id))
        })
    }

    fn get_hotel(&self, id: HotelId) -> StoreFuture<'_, Option<Hotel>> {
        Box::pin(async move {
            self.shared.check_available()?;
            Ok(self.shared.read().hotels.get(&id).cloned())
        })
    }

    fn find_hotel_by_slug(&self, slug: String) -> StoreFuture<'_, Option<Hotel>> {
        Box::pin(async move {
            self.shared.check_available()?;
            Ok(self
                .shared
                .read()
                .hotels
                .values()
                .find(|h| h.slug == slug)
                .cloned())
        })
    }

    fn get_booking(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>> {
        Box::pin(async move {
            self.shared.check_available()?;
            Ok(self.booking(id))
        })
    }

    fn find_booking_by_reference(
        &self,
        reference: BookingReference,
    ) -> StoreFuture<'_, Option<Booking>> {
        Box::pin(async move {
            self.shared.check_available()?;
            Ok(self
                .shared
                .read()
                .bookings
                .values()
                .find(|b| b.booking_reference == reference)
                .cloned())
        })
    }

    fn list_room_types(&self, hotel_id: HotelId) -> StoreFuture<'_, Vec<RoomType>> {
        Box::pin(async move {
            self.shared.check_available()?;
            let mut room_types: Vec<RoomType> = self
                .shared
                .read()
                .room_types
                .values()
                .filter(|rt| rt.hotel_id == hotel_id)
                .cloned()
                .collect();
            room_types.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(room_types)
        })
    }

    fn list_rooms(&self, filter: RoomFilter) -> StoreFuture<'_, Vec<Room>> {
        Box::pin(async move {
            self.shared.check_available()?;
            let tables = self.shared.read();
            let mut rooms: Vec<Room> = tables
                .rooms
                .values()
                .filter(|room| filter.matches(room))
                .filter(|room| {
                    !filter.active_only
                        || tables.hotels.get(&room.hotel_id).is_some_and(|h| h.is_active)
                })
                .cloned()
                .collect();
            rooms.sort_by(|a, b| a.room_number.cmp(&b.room_number));
            Ok(rooms)
        })
    }

    fn count_rooms_by_status(&self, hotel_id: HotelId) -> StoreFuture<'_, StatusCounts> {
        Box::pin(async move {
            self.shared.check_available()?;
            let mut counts = StatusCounts::new();
            for room in self.shared.read().rooms.values() {
                if room.hotel_id == hotel_id && room.is_active {
                    *counts.entry(room.status).or_insert(0) += 1;
                }
            }
            Ok(counts)
        })
    }

    fn list_bookings(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            self.shared.check_available()?;
            let mut bookings: Vec<Booking> = self
                .shared
                .read()
                .bookings
                .values()
                .filter(|b| filter.matches(b))
                .cloned()
                .collect();
            bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            bookings.truncate(filter.limit as usize);
            Ok(bookings)
        })
    }

    fn find_stale_bookings(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            self.shared.check_available()?;
            let mut bookings: Vec<Booking> = self
                .shared
                .read()
                .bookings
                .values()
                .filter(|b| {
                    matches!(
                        b.booking_status,
                        BookingStatus::Pending | BookingStatus::Confirmed
                    ) && b.window.check_in < cutoff
                })
                .cloned()
                .collect();
            bookings.sort_by_key(|b| b.window.check_in);
            bookings.truncate(limit as usize);
            Ok(bookings)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.shared.check_available() })
    }
}

// ============================================================================
// Transaction
// ============================================================================

struct InMemoryTx {
    shared: Arc<Shared>,
    lock_timeout: Duration,
    lock: Option<(RoomId, OwnedMutexGuard<()>)>,
    staged_rooms: HashMap<RoomId, Room>,
    staged_bookings: HashMap<BookingId, Booking>,
}

impl InMemoryTx {
    fn locked_room(&self) -> Option<RoomId> {
        self.lock.as_ref().map(|(room_id, _)| *room_id)
    }

    fn require_lock(&self, room_id: RoomId) -> Result<(), StoreError> {
        if self.locked_room() == Some(room_id) {
            Ok(())
        } else {
            Err(StoreError::Database(format!(
                "room {room_id} is not locked by this transaction"
            )))
        }
    }

    fn current_room(&self, room_id: RoomId) -> Option<Room> {
        self.staged_rooms
            .get(&room_id)
            .cloned()
            .or_else(|| self.shared.read().rooms.get(&room_id).cloned())
    }

    fn current_booking(&self, id: BookingId) -> Option<Booking> {
        self.staged_bookings
            .get(&id)
            .cloned()
            .or_else(|| self.shared.read().bookings.get(&id).cloned())
    }

    /// Committed bookings with this transaction's staged writes applied.
    fn bookings_view(&self) -> Vec<Booking> {
        let tables = self.shared.read();
        let mut view: HashMap<BookingId, Booking> = tables
            .bookings
            .iter()
            .map(|(id, b)| (*id, b.clone()))
            .collect();
        for (id, booking) in &self.staged_bookings {
            view.insert(*id, booking.clone());
        }
        view.into_values().collect()
    }

    fn holding(&self, room_id: RoomId) -> impl Iterator<Item = Booking> {
        self.bookings_view()
            .into_iter()
            .filter(move |b| b.room_id == room_id && b.booking_status.holds_room())
    }
}

impl ReservationTx for InMemoryTx {
    fn lock_room(&mut self, room_id: RoomId) -> StoreFuture<'_, Option<LockedRoom>> {
        Box::pin(async move {
            self.shared.check_available()?;
            if let Some(held) = self.locked_room() {
                if held != room_id {
                    return Err(StoreError::Database(
                        "transaction already holds another room lock".to_string(),
                    ));
                }
            } else {
                if !self.shared.read().rooms.contains_key(&room_id) {
                    return Ok(None);
                }
                let lock = self.shared.room_lock(room_id);
                let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
                    .await
                    .map_err(|_| StoreError::LockTimeout(self.lock_timeout))?;
                self.lock = Some((room_id, guard));
            }

            let Some(room) = self.current_room(room_id) else {
                return Ok(None);
            };
            let hotel_active = self
                .shared
                .read()
                .hotels
                .get(&room.hotel_id)
                .is_some_and(|h| h.is_active);
            Ok(Some(LockedRoom { room, hotel_active }))
        })
    }

    fn find_overlapping_bookings(
        &mut self,
        room_id: RoomId,
        window: StayWindow,
    ) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            self.require_lock(room_id)?;
            Ok(self
                .holding(room_id)
                .filter(|b| b.window.overlaps(&window))
                .collect())
        })
    }

    fn insert_booking(&mut self, booking: Booking) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.require_lock(booking.room_id)?;
            let view = self.bookings_view();
            if view
                .iter()
                .any(|b| b.booking_reference == booking.booking_reference)
            {
                return Err(StoreError::DuplicateReference);
            }
            if booking.booking_status.holds_room()
                && view.iter().any(|b| {
                    b.room_id == booking.room_id
                        && b.booking_status.holds_room()
                        && b.window.overlaps(&booking.window)
                })
            {
                return Err(StoreError::Overlap);
            }
            self.staged_bookings.insert(booking.id, booking);
            Ok(())
        })
    }

    fn get_booking(&mut self, id: BookingId) -> StoreFuture<'_, Option<Booking>> {
        Box::pin(async move { Ok(self.current_booking(id)) })
    }

    fn update_booking_status(
        &mut self,
        id: BookingId,
        expected: Vec<BookingStatus>,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let Some(mut booking) = self.current_booking(id) else {
                return Ok(false);
            };
            self.require_lock(booking.room_id)?;
            if !expected.contains(&booking.booking_status) {
                return Ok(false);
            }
            booking.booking_status = to;
            booking.updated_at = at;
            self.staged_bookings.insert(id, booking);
            Ok(true)
        })
    }

    fn update_room_status(
        &mut self,
        room_id: RoomId,
        status: RoomStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Room> {
        Box::pin(async move {
            self.require_lock(room_id)?;
            let mut room = self
                .current_room(room_id)
                .ok_or_else(|| StoreError::NotFound(format!("room {room_id}")))?;
            room.status = status;
            room.updated_at = at;
            self.staged_rooms.insert(room_id, room.clone());
            Ok(room)
        })
    }

    fn active_bookings_for_room(&mut self, room_id: RoomId) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move { Ok(self.holding(room_id).collect()) })
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            let InMemoryTx {
                shared,
                lock,
                staged_rooms,
                staged_bookings,
                ..
            } = *self;
            shared.check_available()?;
            {
                let mut tables = shared.write();
                tables.rooms.extend(staged_rooms);
                tables.bookings.extend(staged_bookings);
            }
            drop(lock);
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            drop(self);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: test fails on unexpected outcome
mod tests {
    use super::*;
    use crate::fixtures::{self, at};

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = InMemoryBookingStore::new();
        let seeded = fixtures::seed_hotel(&store, "harbor-view", 1);
        let room_id = seeded.rooms[0].id;

        let mut tx = store.begin(TxOptions::default()).await.unwrap();
        tx.lock_room(room_id).await.unwrap().unwrap();
        tx.update_room_status(room_id, RoomStatus::Maintenance, at("2025-01-01T10:00:00Z"))
            .await
            .unwrap();
        assert_eq!(store.room(room_id).unwrap().status, RoomStatus::Available);

        tx.rollback().await.unwrap();
        assert_eq!(store.room(room_id).unwrap().status, RoomStatus::Available);
    }

    #[tokio::test]
    async fn test_lock_times_out_while_held() {
        let store = InMemoryBookingStore::new();
        let seeded = fixtures::seed_hotel(&store, "harbor-view", 1);
        let room_id = seeded.rooms[0].id;
        let _held = store.hold_room_lock(room_id).await;

        let mut tx = store
            .begin(TxOptions::with_lock_timeout(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(matches!(
            tx.lock_room(room_id).await,
            Err(StoreError::LockTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_require_room_lock() {
        let store = InMemoryBookingStore::new();
        let seeded = fixtures::seed_hotel(&store, "harbor-view", 1);

        let mut tx = store.begin(TxOptions::default()).await.unwrap();
        let result = tx
            .update_room_status(seeded.rooms[0].id, RoomStatus::Cleaning, Utc::now())
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn test_overlapping_insert_is_rejected() {
        let store = InMemoryBookingStore::new();
        let seeded = fixtures::seed_hotel(&store, "harbor-view", 1);
        let room = &seeded.rooms[0];
        let window = fixtures::window("2025-02-01T14:00:00Z", "2025-02-02T12:00:00Z");
        store.insert_booking(fixtures::booking(room, window, BookingStatus::Confirmed));

        let mut tx = store.begin(TxOptions::default()).await.unwrap();
        tx.lock_room(room.id).await.unwrap();
        let clash = fixtures::booking(room, window, BookingStatus::Confirmed);
        assert!(matches!(
            tx.insert_booking(clash).await,
            Err(StoreError::Overlap)
        ));
    }

    #[tokio::test]
    async fn test_stale_bookings_are_oldest_first() {
        let store = InMemoryBookingStore::new();
        let seeded = fixtures::seed_hotel(&store, "harbor-view", 2);
        let early = fixtures::window("2025-01-01T14:00:00Z", "2025-01-02T12:00:00Z");
        let late = fixtures::window("2025-01-03T14:00:00Z", "2025-01-04T12:00:00Z");
        let first = fixtures::booking(&seeded.rooms[0], early, BookingStatus::Confirmed);
        let second = fixtures::booking(&seeded.rooms[1], late, BookingStatus::Pending);
        let done = fixtures::booking(&seeded.rooms[1], early, BookingStatus::CheckedIn);
        store.insert_booking(second.clone());
        store.insert_booking(first.clone());
        store.insert_booking(done);

        let stale = store
            .find_stale_bookings(at("2025-01-10T00:00:00Z"), 10)
            .await
            .unwrap();
        let ids: Vec<_> = stale.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
