//! Domain types for the hotel booking marketplace.
//!
//! This module contains the identifiers, entities and status enums shared by the
//! reservation engine, the availability notifier and the storage adapters.
//!
//! # Entities
//!
//! - [`Hotel`]: a property, soft-deactivated through `is_active`
//! - [`RoomType`]: pricing/occupancy template belonging to one hotel
//! - [`Room`]: the bookable unit, carrying the concurrency-sensitive [`RoomStatus`]
//! - [`Booking`]: a reservation of one room for a [`StayWindow`]
//!
//! The invariant the rest of the workspace protects: for a given room, the bookings
//! whose [`BookingStatus::holds_room`] is true have pairwise disjoint
//! `[check_in, check_out)` windows.

use crate::reference::BookingReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a hotel
    HotelId
);
uuid_id!(
    /// Unique identifier for a room type
    RoomTypeId
);
uuid_id!(
    /// Unique identifier for a room
    RoomId
);
uuid_id!(
    /// Unique identifier for a booking
    BookingId
);

// ============================================================================
// Status enums
// ============================================================================

/// Error returned when a status string does not name a known variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    /// Which enum was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Database/wire representation.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseStatusError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum!(
    /// Operational status of a room.
    RoomStatus, "room status" {
        /// Free to be sold
        Available => "available",
        /// A guest is checked in
        Occupied => "occupied",
        /// Held by a confirmed booking
        Reserved => "reserved",
        /// Out of service; new reservations are refused
        Maintenance => "maintenance",
        /// Being prepared after a check-out
        Cleaning => "cleaning",
    }
);

string_enum!(
    /// Lifecycle status of a booking.
    BookingStatus, "booking status" {
        /// Created but not yet confirmed
        Pending => "pending",
        /// Confirmed, waiting for the guest
        Confirmed => "confirmed",
        /// Guest is in the room
        CheckedIn => "checked_in",
        /// Stay finished
        CheckedOut => "checked_out",
        /// Cancelled by staff or by the auto-release sweep
        Cancelled => "cancelled",
        /// Guest never arrived
        NoShow => "no_show",
    }
);

impl BookingStatus {
    /// Statuses whose window still counts toward the overlap check.
    pub const HOLDING: &'static [Self] = &[Self::Pending, Self::Confirmed, Self::CheckedIn];

    /// Whether a booking in this status still holds its room window.
    #[must_use]
    pub const fn holds_room(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::CheckedIn)
    }

    /// Whether no further lifecycle transition is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::CheckedOut | Self::Cancelled | Self::NoShow)
    }
}

string_enum!(
    /// Payment state of a booking.
    PaymentStatus, "payment status" {
        /// Not yet paid
        Pending => "pending",
        /// Settled
        Paid => "paid",
        /// Returned to the guest
        Refunded => "refunded",
        /// Payment attempt failed
        Failed => "failed",
    }
);

string_enum!(
    /// How the stay is priced.
    StayType, "stay type" {
        /// Short stay billed by the hour
        Hourly => "hourly",
        /// Billed per night
        Nightly => "nightly",
        /// Weekly or longer
        Extended => "extended",
    }
);

// ============================================================================
// Value objects
// ============================================================================

/// A half-open `[check_in, check_out)` stay window.
///
/// Construction through [`StayWindow::new`] guarantees `check_in < check_out`,
/// and deserialization enforces the same rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawStayWindow")]
pub struct StayWindow {
    /// Start of the stay (inclusive)
    pub check_in: DateTime<Utc>,
    /// End of the stay (exclusive)
    pub check_out: DateTime<Utc>,
}

impl StayWindow {
    /// Create a window, returning `None` unless `check_in < check_out`.
    #[must_use]
    pub fn new(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> Option<Self> {
        (check_in < check_out).then_some(Self {
            check_in,
            check_out,
        })
    }

    /// Whether the two windows share any instant.
    ///
    /// Back-to-back windows (`a.check_out == b.check_in`) do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

/// Error for a window whose `check_out` is not after its `check_in`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("check_out {check_out} must be after check_in {check_in}")]
pub struct EmptyStayWindow {
    /// Rejected start
    pub check_in: DateTime<Utc>,
    /// Rejected end
    pub check_out: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawStayWindow {
    check_in: DateTime<Utc>,
    check_out: DateTime<Utc>,
}

impl TryFrom<RawStayWindow> for StayWindow {
    type Error = EmptyStayWindow;

    fn try_from(raw: RawStayWindow) -> Result<Self, Self::Error> {
        Self::new(raw.check_in, raw.check_out).ok_or(EmptyStayWindow {
            check_in: raw.check_in,
            check_out: raw.check_out,
        })
    }
}

/// Guest contact details captured on the booking form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestDetails {
    /// Full name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: String,
}

// ============================================================================
// Entities
// ============================================================================

/// A hotel listed on the marketplace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    /// Hotel ID
    pub id: HotelId,
    /// URL slug used by the public site
    pub slug: String,
    /// Display name
    pub name: String,
    /// Street address
    pub address: String,
    /// City
    pub city: String,
    /// State or region
    pub state: Option<String>,
    /// Country
    pub country: String,
    /// Latitude (degrees)
    pub latitude: Option<f64>,
    /// Longitude (degrees)
    pub longitude: Option<f64>,
    /// Amenity labels
    pub amenities: Vec<String>,
    /// Image URLs
    pub images: Vec<String>,
    /// Publicly visible; hotels are never hard-deleted
    pub is_active: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// A category of rooms within a hotel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomType {
    /// Room type ID
    pub id: RoomTypeId,
    /// Owning hotel
    pub hotel_id: HotelId,
    /// Display name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Base price in minor currency units
    pub base_price: i64,
    /// Maximum number of guests
    pub max_occupancy: i32,
    /// Amenity labels
    pub amenities: Vec<String>,
}

/// A bookable room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Room ID
    pub id: RoomId,
    /// Owning hotel
    pub hotel_id: HotelId,
    /// Room type
    pub room_type_id: RoomTypeId,
    /// Number shown to guests and staff
    pub room_number: String,
    /// Floor, if known
    pub floor: Option<i32>,
    /// Current operational status
    pub status: RoomStatus,
    /// Whether the room can be sold
    pub is_active: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// A reservation of a room for a stay window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking ID
    pub id: BookingId,
    /// Human-shareable reference (`ROM-XXXXXXXX`)
    pub booking_reference: BookingReference,
    /// Hotel (denormalized from the room)
    pub hotel_id: HotelId,
    /// Booked room
    pub room_id: RoomId,
    /// Room type (denormalized from the room)
    pub room_type_id: RoomTypeId,
    /// Guest contact details
    pub guest: GuestDetails,
    /// Stay window
    pub window: StayWindow,
    /// Pricing mode
    pub stay_type: StayType,
    /// Total in minor currency units
    pub total_amount: i64,
    /// Payment state
    pub payment_status: PaymentStatus,
    /// Lifecycle state
    pub booking_status: BookingStatus,
    /// Free-text requests from the guest
    pub special_requests: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}
