//! Builders for hotels, rooms and bookings used across test suites.

#![allow(clippy::expect_used)] // Fixture inputs are literals; bad ones should fail the test loudly

use crate::store::InMemoryBookingStore;
use chrono::{DateTime, Utc};
use roaman_core::reference::BookingReference;
use roaman_core::types::{
    Booking, BookingId, BookingStatus, GuestDetails, Hotel, HotelId, PaymentStatus, Room, RoomId,
    RoomStatus, RoomType, RoomTypeId, StayType, StayWindow,
};

/// Timestamp every fixture is created at (matches [`crate::test_clock`]).
pub const FIXTURE_EPOCH: &str = "2025-01-01T00:00:00Z";

/// Parse an RFC 3339 timestamp.
///
/// # Panics
///
/// If `rfc3339` is not a valid timestamp.
#[must_use]
pub fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("fixture timestamp must be RFC 3339")
        .with_timezone(&Utc)
}

/// Build a stay window from two RFC 3339 timestamps.
///
/// # Panics
///
/// If either timestamp is invalid or `check_in >= check_out`.
#[must_use]
pub fn window(check_in: &str, check_out: &str) -> StayWindow {
    StayWindow::new(at(check_in), at(check_out)).expect("fixture window must be ordered")
}

/// An active hotel.
#[must_use]
pub fn hotel(slug: &str) -> Hotel {
    Hotel {
        id: HotelId::new(),
        slug: slug.to_string(),
        name: format!("Hotel {slug}"),
        address: "1 Harbour Road".to_string(),
        city: "Lagos".to_string(),
        state: Some("Lagos".to_string()),
        country: "NG".to_string(),
        latitude: None,
        longitude: None,
        amenities: vec!["wifi".to_string()],
        images: Vec::new(),
        is_active: true,
        created_at: at(FIXTURE_EPOCH),
        updated_at: at(FIXTURE_EPOCH),
    }
}

/// A standard room type for `hotel_id`.
#[must_use]
pub fn room_type(hotel_id: HotelId) -> RoomType {
    RoomType {
        id: RoomTypeId::new(),
        hotel_id,
        name: "Standard".to_string(),
        description: None,
        base_price: 25_000,
        max_occupancy: 2,
        amenities: Vec::new(),
    }
}

/// An available, active room.
#[must_use]
pub fn room(room_type: &RoomType, room_number: &str) -> Room {
    Room {
        id: RoomId::new(),
        hotel_id: room_type.hotel_id,
        room_type_id: room_type.id,
        room_number: room_number.to_string(),
        floor: Some(1),
        status: RoomStatus::Available,
        is_active: true,
        created_at: at(FIXTURE_EPOCH),
        updated_at: at(FIXTURE_EPOCH),
    }
}

/// Guest number `n`.
#[must_use]
pub fn guest(n: usize) -> GuestDetails {
    GuestDetails {
        name: format!("Guest {n}"),
        email: format!("guest{n}@example.com"),
        phone: format!("+23480000{n:05}"),
    }
}

/// A booking of `room` for `window`, with a random reference.
#[must_use]
pub fn booking(room: &Room, window: StayWindow, status: BookingStatus) -> Booking {
    Booking {
        id: BookingId::new(),
        booking_reference: BookingReference::generate(&mut rand::thread_rng()),
        hotel_id: room.hotel_id,
        room_id: room.id,
        room_type_id: room.room_type_id,
        guest: guest(0),
        window,
        stay_type: StayType::Nightly,
        total_amount: 25_000,
        payment_status: PaymentStatus::Pending,
        booking_status: status,
        special_requests: None,
        created_at: at(FIXTURE_EPOCH),
        updated_at: at(FIXTURE_EPOCH),
    }
}

/// A hotel with one room type and its rooms, as inserted by [`seed_hotel`].
#[derive(Clone, Debug)]
pub struct SeededHotel {
    /// The hotel
    pub hotel: Hotel,
    /// Its only room type
    pub room_type: RoomType,
    /// Rooms numbered `101`, `102`, ...
    pub rooms: Vec<Room>,
}

/// Insert an active hotel with `room_count` available rooms.
pub fn seed_hotel(store: &InMemoryBookingStore, slug: &str, room_count: usize) -> SeededHotel {
    let hotel = hotel(slug);
    let room_type = room_type(hotel.id);
    let rooms: Vec<Room> = (0..room_count)
        .map(|i| room(&room_type, &format!("{}", 101 + i)))
        .collect();

    store.insert_hotel(hotel.clone());
    store.insert_room_type(room_type.clone());
    for room in &rooms {
        store.insert_room(room.clone());
    }

    SeededHotel {
        hotel,
        room_type,
        rooms,
    }
}
