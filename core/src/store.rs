//! Storage contracts for the reservation core.
//!
//! Two traits split the storage surface:
//!
//! - [`BookingStore`]: connection-level reads plus [`BookingStore::begin`]
//! - [`ReservationTx`]: one open transaction holding at most one room lock
//!
//! Every write to a room's `status`, and every booking insert or status change,
//! happens inside a [`ReservationTx`] after [`ReservationTx::lock_room`] has
//! returned for that room. The room row is the single serialization point: two
//! transactions on the same room queue behind each other, transactions on
//! different rooms never do.
//!
//! Both traits are dyn-compatible so the engine can hold `Arc<dyn BookingStore>`
//! and swap the `PostgreSQL` adapter for the in-memory one in tests.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = store.begin(TxOptions::default()).await?;
//! let Some(locked) = tx.lock_room(room_id).await? else {
//!     tx.rollback().await?;
//!     return Err(BookingError::not_found("room", room_id));
//! };
//! if !tx.find_overlapping_bookings(room_id, window).await?.is_empty() {
//!     tx.rollback().await?;
//!     return Err(BookingError::room_unavailable());
//! }
//! tx.insert_booking(booking).await?;
//! tx.update_room_status(room_id, RoomStatus::Reserved, now).await?;
//! tx.commit().await?;
//! ```

use crate::error::StoreError;
use crate::reference::BookingReference;
use crate::types::{
    Booking, BookingId, BookingStatus, Hotel, HotelId, Room, RoomId, RoomStatus, RoomType, RoomTypeId,
    StayWindow,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by storage operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Room counts keyed by status. Statuses with no rooms are absent.
pub type StatusCounts = BTreeMap<RoomStatus, u64>;

/// Options for [`BookingStore::begin`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxOptions {
    /// Upper bound on waiting for a room lock.
    pub lock_timeout: Duration,
}

impl TxOptions {
    /// Options with the given lock timeout.
    #[must_use]
    pub const fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self { lock_timeout }
    }
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(3),
        }
    }
}

/// A room row locked for the rest of the transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockedRoom {
    /// Room as of lock acquisition
    pub room: Room,
    /// Whether the owning hotel is active
    pub hotel_active: bool,
}

/// Filter for [`BookingStore::list_rooms`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomFilter {
    /// Hotel whose rooms to list; `None` lists across hotels
    pub hotel_id: Option<HotelId>,
    /// Restrict to one room type
    pub room_type_id: Option<RoomTypeId>,
    /// Restrict to one status
    pub status: Option<RoomStatus>,
    /// Skip deactivated rooms
    pub active_only: bool,
}

impl RoomFilter {
    /// All rooms of a hotel.
    #[must_use]
    pub const fn hotel(hotel_id: HotelId) -> Self {
        Self {
            hotel_id: Some(hotel_id),
            room_type_id: None,
            status: None,
            active_only: false,
        }
    }

    /// All rooms of every hotel.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            hotel_id: None,
            room_type_id: None,
            status: None,
            active_only: false,
        }
    }

    /// Restrict to one room type.
    #[must_use]
    pub const fn room_type(mut self, room_type_id: Option<RoomTypeId>) -> Self {
        self.room_type_id = room_type_id;
        self
    }

    /// Restrict to one status.
    #[must_use]
    pub const fn status(mut self, status: RoomStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Skip deactivated rooms.
    #[must_use]
    pub const fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    /// Whether `room` passes the filter.
    #[must_use]
    pub fn matches(&self, room: &Room) -> bool {
        self.hotel_id.is_none_or(|h| h == room.hotel_id)
            && self.room_type_id.is_none_or(|t| t == room.room_type_id)
            && self.status.is_none_or(|s| s == room.status)
            && (!self.active_only || room.is_active)
    }
}

/// Filter for [`BookingStore::list_bookings`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingFilter {
    /// Restrict to one hotel; `None` lists across hotels
    pub hotel_id: Option<HotelId>,
    /// Restrict to one status
    pub status: Option<BookingStatus>,
    /// Maximum rows returned
    pub limit: u32,
}

impl Default for BookingFilter {
    fn default() -> Self {
        Self {
            hotel_id: None,
            status: None,
            limit: 100,
        }
    }
}

impl BookingFilter {
    /// Whether `booking` passes the hotel and status restrictions.
    #[must_use]
    pub fn matches(&self, booking: &Booking) -> bool {
        self.hotel_id.is_none_or(|h| h == booking.hotel_id)
            && self.status.is_none_or(|s| s == booking.booking_status)
    }
}

/// Connection-level access to hotels, rooms and bookings.
pub trait BookingStore: Send + Sync {
    /// Open a transaction.
    fn begin(&self, options: TxOptions) -> StoreFuture<'_, Box<dyn ReservationTx>>;

    /// Load a room without locking it.
    fn get_room(&self, id: RoomId) -> StoreFuture<'_, Option<Room>>;

    /// Load a hotel.
    fn get_hotel(&self, id: HotelId) -> StoreFuture<'_, Option<Hotel>>;

    /// Load a hotel by its public slug.
    fn find_hotel_by_slug(&self, slug: String) -> StoreFuture<'_, Option<Hotel>>;

    /// Load a booking without locking it.
    fn get_booking(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>>;

    /// Load a booking by its reference.
    fn find_booking_by_reference(
        &self,
        reference: BookingReference,
    ) -> StoreFuture<'_, Option<Booking>>;

    /// List a hotel's room types ordered by name.
    fn list_room_types(&self, hotel_id: HotelId) -> StoreFuture<'_, Vec<RoomType>>;

    /// List rooms ordered by room number.
    ///
    /// With `active_only`, rooms of inactive hotels are skipped as well.
    fn list_rooms(&self, filter: RoomFilter) -> StoreFuture<'_, Vec<Room>>;

    /// Count a hotel's active rooms per status.
    fn count_rooms_by_status(&self, hotel_id: HotelId) -> StoreFuture<'_, StatusCounts>;

    /// List bookings, newest first.
    fn list_bookings(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<Booking>>;

    /// Pending or confirmed bookings whose `check_in` is before `cutoff`,
    /// oldest first.
    fn find_stale_bookings(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> StoreFuture<'_, Vec<Booking>>;

    /// Cheap connectivity check.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

/// An open storage transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards its
/// writes and releases its lock.
pub trait ReservationTx: Send {
    /// Lock the room row until the transaction ends.
    ///
    /// Returns `None` if the room does not exist. Fails with
    /// [`StoreError::LockTimeout`] if the lock is not acquired within
    /// [`TxOptions::lock_timeout`].
    fn lock_room(&mut self, room_id: RoomId) -> StoreFuture<'_, Option<LockedRoom>>;

    /// Bookings on the room that hold it and intersect `window`.
    fn find_overlapping_bookings(
        &mut self,
        room_id: RoomId,
        window: StayWindow,
    ) -> StoreFuture<'_, Vec<Booking>>;

    /// Insert a new booking.
    ///
    /// A reference already in use fails with
    /// [`StoreError::DuplicateReference`](crate::error::StoreError::DuplicateReference)
    /// and leaves the transaction usable, so the caller can retry with another.
    fn insert_booking(&mut self, booking: Booking) -> StoreFuture<'_, ()>;

    /// Read a booking as seen by this transaction.
    fn get_booking(&mut self, id: BookingId) -> StoreFuture<'_, Option<Booking>>;

    /// Move a booking to `to` if its current status is one of `expected`.
    ///
    /// Returns whether a row was updated.
    fn update_booking_status(
        &mut self,
        id: BookingId,
        expected: Vec<BookingStatus>,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, bool>;

    /// Set a room's status, returning the updated row.
    fn update_room_status(
        &mut self,
        room_id: RoomId,
        status: RoomStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Room>;

    /// Bookings on the room that still hold it.
    fn active_bookings_for_room(&mut self, room_id: RoomId) -> StoreFuture<'_, Vec<Booking>>;

    /// Make the transaction's writes durable and release the lock.
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;

    /// Discard the transaction's writes and release the lock.
    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()>;
}
