//! Row types and their conversion into domain types.
//!
//! Status enums are stored as `TEXT` with `CHECK` constraints; a value the
//! domain does not know becomes [`StoreError::Decode`].

use chrono::{DateTime, Utc};
use roaman_core::error::StoreError;
use roaman_core::reference::BookingReference;
use roaman_core::store::LockedRoom;
use roaman_core::types::{
    Booking, BookingId, GuestDetails, Hotel, HotelId, Room, RoomId, RoomType, RoomTypeId,
    StayWindow,
};
use std::str::FromStr;
use uuid::Uuid;

/// Columns selected for a room, qualified with alias `r`.
pub(crate) const ROOM_COLUMNS: &str = "r.id, r.hotel_id, r.room_type_id, r.room_number, r.floor, \
     r.status, r.is_active, r.created_at, r.updated_at";

/// Columns selected for a booking.
pub(crate) const BOOKING_COLUMNS: &str = "id, booking_reference, hotel_id, room_id, room_type_id, \
     guest_name, guest_email, guest_phone, check_in, check_out, stay_type, total_amount, \
     payment_status, booking_status, special_requests, created_at, updated_at";

/// Columns selected for a room type.
pub(crate) const ROOM_TYPE_COLUMNS: &str =
    "id, hotel_id, name, description, base_price, max_occupancy, amenities";

/// Columns selected for a hotel.
pub(crate) const HOTEL_COLUMNS: &str = "id, slug, name, address, city, state, country, latitude, \
     longitude, amenities, images, is_active, created_at, updated_at";

fn decode<T: FromStr>(column: &str, value: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StoreError::Decode(format!("{column}: {e}")))
}

#[derive(sqlx::FromRow)]
pub(crate) struct HotelRow {
    id: Uuid,
    slug: String,
    name: String,
    address: String,
    city: String,
    state: Option<String>,
    country: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    amenities: Vec<String>,
    images: Vec<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<HotelRow> for Hotel {
    fn from(row: HotelRow) -> Self {
        Self {
            id: HotelId::from_uuid(row.id),
            slug: row.slug,
            name: row.name,
            address: row.address,
            city: row.city,
            state: row.state,
            country: row.country,
            latitude: row.latitude,
            longitude: row.longitude,
            amenities: row.amenities,
            images: row.images,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RoomTypeRow {
    id: Uuid,
    hotel_id: Uuid,
    name: String,
    description: Option<String>,
    base_price: i64,
    max_occupancy: i32,
    amenities: Vec<String>,
}

impl From<RoomTypeRow> for RoomType {
    fn from(row: RoomTypeRow) -> Self {
        Self {
            id: RoomTypeId::from_uuid(row.id),
            hotel_id: HotelId::from_uuid(row.hotel_id),
            name: row.name,
            description: row.description,
            base_price: row.base_price,
            max_occupancy: row.max_occupancy,
            amenities: row.amenities,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RoomRow {
    id: Uuid,
    hotel_id: Uuid,
    room_type_id: Uuid,
    room_number: String,
    floor: Option<i32>,
    status: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RoomRow> for Room {
    type Error = StoreError;

    fn try_from(row: RoomRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: RoomId::from_uuid(row.id),
            hotel_id: HotelId::from_uuid(row.hotel_id),
            room_type_id: RoomTypeId::from_uuid(row.room_type_id),
            room_number: row.room_number,
            floor: row.floor,
            status: decode("rooms.status", &row.status)?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A room row joined with its hotel's `is_active` flag.
#[derive(sqlx::FromRow)]
pub(crate) struct LockedRoomRow {
    #[sqlx(flatten)]
    room: RoomRow,
    hotel_active: bool,
}

impl TryFrom<LockedRoomRow> for LockedRoom {
    type Error = StoreError;

    fn try_from(row: LockedRoomRow) -> Result<Self, Self::Error> {
        Ok(Self {
            room: row.room.try_into()?,
            hotel_active: row.hotel_active,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookingRow {
    id: Uuid,
    booking_reference: String,
    hotel_id: Uuid,
    room_id: Uuid,
    room_type_id: Uuid,
    guest_name: String,
    guest_email: String,
    guest_phone: String,
    check_in: DateTime<Utc>,
    check_out: DateTime<Utc>,
    stay_type: String,
    total_amount: i64,
    payment_status: String,
    booking_status: String,
    special_requests: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let window = StayWindow::new(row.check_in, row.check_out).ok_or_else(|| {
            StoreError::Decode(format!("booking {} has an empty stay window", row.id))
        })?;
        let booking_reference = BookingReference::try_from(row.booking_reference)
            .map_err(|e| StoreError::Decode(format!("bookings.booking_reference: {e}")))?;

        Ok(Self {
            id: BookingId::from_uuid(row.id),
            booking_reference,
            hotel_id: HotelId::from_uuid(row.hotel_id),
            room_id: RoomId::from_uuid(row.room_id),
            room_type_id: RoomTypeId::from_uuid(row.room_type_id),
            guest: GuestDetails {
                name: row.guest_name,
                email: row.guest_email,
                phone: row.guest_phone,
            },
            window,
            stay_type: decode("bookings.stay_type", &row.stay_type)?,
            total_amount: row.total_amount,
            payment_status: decode("bookings.payment_status", &row.payment_status)?,
            booking_status: decode("bookings.booking_status", &row.booking_status)?,
            special_requests: row.special_requests,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Convert every row, failing on the first undecodable one.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}
