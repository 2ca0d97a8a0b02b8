//! Availability feed payloads, topics and the transport contract.
//!
//! Committed room status changes are published as [`RoomUpdate`]s on two topics:
//! `rooms:hotel:<hotel_id>` for one hotel and `rooms:all` for the public browse
//! view. Booking lifecycle changes go to the staff-only `bookings:hotel:<hotel_id>`
//! topic as [`BookingUpdate`]s.
//!
//! # Delivery model
//!
//! Transports implementing [`AvailabilityBus`] deliver at-least-once, in commit
//! order per room, with no ordering across rooms. A subscriber that falls behind
//! may lose intermediate events; the transport reports that as
//! [`BusError::Lagged`] and the subscriber resynchronizes from a snapshot.
//!
//! ```text
//!  ReservationEngine ──commit──▶ AvailabilityBus ──▶ Subscription ──▶ UI
//!                                    │                   ▲
//!                                    │   lag/reconnect   │
//!                                    └── snapshot query ─┘
//! ```

use crate::auth::{Principal, Role};
use crate::error::BookingError;
use crate::reference::BookingReference;
use crate::types::{BookingId, BookingStatus, HotelId, RoomId, RoomStatus};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Payloads
// ============================================================================

/// A committed room status change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUpdate {
    /// Room that changed
    pub room_id: RoomId,
    /// Owning hotel
    pub hotel_id: HotelId,
    /// Room number for display
    pub room_number: String,
    /// New status
    pub status: RoomStatus,
    /// Commit time of the change
    pub updated_at: DateTime<Utc>,
}

/// A committed booking lifecycle change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingUpdate {
    /// Booking that changed
    pub booking_id: BookingId,
    /// Owning hotel
    pub hotel_id: HotelId,
    /// Booked room
    pub room_id: RoomId,
    /// Guest-facing reference
    pub booking_reference: BookingReference,
    /// New status
    pub booking_status: BookingStatus,
    /// Commit time of the change
    pub updated_at: DateTime<Utc>,
}

/// Anything published on the availability feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Room status change
    Room(RoomUpdate),
    /// Booking status change
    Booking(BookingUpdate),
}

/// Coalescing key: one slot per room or booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKey {
    /// Room slot
    Room(RoomId),
    /// Booking slot
    Booking(BookingId),
}

impl Notification {
    /// Hotel the notification belongs to.
    #[must_use]
    pub const fn hotel_id(&self) -> HotelId {
        match self {
            Self::Room(update) => update.hotel_id,
            Self::Booking(update) => update.hotel_id,
        }
    }

    /// Commit time carried by the payload.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::Room(update) => update.updated_at,
            Self::Booking(update) => update.updated_at,
        }
    }

    /// Slot this notification supersedes.
    #[must_use]
    pub const fn key(&self) -> NotificationKey {
        match self {
            Self::Room(update) => NotificationKey::Room(update.room_id),
            Self::Booking(update) => NotificationKey::Booking(update.booking_id),
        }
    }

    /// Topics this notification is published to.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        match self {
            Self::Room(update) => vec![Topic::HotelRooms(update.hotel_id), Topic::AllRooms],
            Self::Booking(update) => vec![Topic::HotelBookings(update.hotel_id)],
        }
    }
}

impl From<RoomUpdate> for Notification {
    fn from(update: RoomUpdate) -> Self {
        Self::Room(update)
    }
}

impl From<BookingUpdate> for Notification {
    fn from(update: BookingUpdate) -> Self {
        Self::Booking(update)
    }
}

// ============================================================================
// Topics
// ============================================================================

/// Error for a topic string that names no known topic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed topic: {0}")]
pub struct MalformedTopic(pub String);

/// A subscription topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `rooms:all`: room changes across every hotel
    AllRooms,
    /// `rooms:hotel:<id>`: room changes for one hotel
    HotelRooms(HotelId),
    /// `bookings:hotel:<id>`: booking changes for one hotel, staff only
    HotelBookings(HotelId),
}

impl Topic {
    /// Hotel the topic is scoped to.
    #[must_use]
    pub const fn hotel_id(&self) -> Option<HotelId> {
        match self {
            Self::AllRooms => None,
            Self::HotelRooms(id) | Self::HotelBookings(id) => Some(*id),
        }
    }

    /// Whether a subscriber of this topic should see `notification`.
    ///
    /// Transports may share one physical channel between topics; this is the
    /// filter that keeps one hotel's events away from another hotel's subscribers.
    #[must_use]
    pub fn accepts(&self, notification: &Notification) -> bool {
        match (self, notification) {
            (Self::AllRooms, Notification::Room(_)) => true,
            (Self::HotelRooms(id), Notification::Room(update)) => update.hotel_id == *id,
            (Self::HotelBookings(id), Notification::Booking(update)) => update.hotel_id == *id,
            _ => false,
        }
    }

    /// Check that `principal` may subscribe.
    ///
    /// Existence of the hotel is checked separately by the notifier.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Authorization`] when the principal lacks scope.
    pub fn authorize(&self, principal: &Principal) -> Result<(), BookingError> {
        match (self, principal.role) {
            (Self::AllRooms, Role::Staff) => Err(BookingError::Authorization(
                "staff may only subscribe to their own hotel".to_string(),
            )),
            (Self::AllRooms, _) => Ok(()),
            (Self::HotelRooms(id), Role::Staff) => principal.authorize_hotel(*id),
            (Self::HotelRooms(_), _) => Ok(()),
            (Self::HotelBookings(id), _) => principal.authorize_hotel(*id),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllRooms => f.write_str("rooms:all"),
            Self::HotelRooms(id) => write!(f, "rooms:hotel:{id}"),
            Self::HotelBookings(id) => write!(f, "bookings:hotel:{id}"),
        }
    }
}

impl FromStr for Topic {
    type Err = MalformedTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedTopic(s.to_string());
        if s == "rooms:all" {
            return Ok(Self::AllRooms);
        }
        if let Some(rest) = s.strip_prefix("rooms:hotel:") {
            return rest.parse().map(Self::HotelRooms).map_err(|_| malformed());
        }
        if let Some(rest) = s.strip_prefix("bookings:hotel:") {
            return rest.parse().map(Self::HotelBookings).map_err(|_| malformed());
        }
        Err(malformed())
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Connection state
// ============================================================================

/// Lifecycle of a subscription's transport connection.
///
/// Only [`ConnectionState::Connected`] means pushed events are trustworthy;
/// otherwise the snapshot query is the source of truth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Establishing the transport subscription
    Connecting,
    /// Subscribed and resynchronized
    Connected,
    /// Transport lost; a reconnect is scheduled
    Disconnected,
}

// ============================================================================
// Transport
// ============================================================================

/// Errors reported by an [`AvailabilityBus`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Could not reach the transport
    #[error("connection failed: {0}")]
    Connection(String),

    /// Publishing to a topic failed
    #[error("publish to '{topic}' failed: {reason}")]
    Publish {
        /// Topic that failed
        topic: String,
        /// Failure reason
        reason: String,
    },

    /// A payload on the wire could not be decoded
    #[error("decode failed: {0}")]
    Decode(String),

    /// The subscriber fell behind and `0` messages were dropped
    #[error("subscriber lagged, {0} messages dropped")]
    Lagged(u64),
}

/// Stream of notifications from one subscription.
///
/// The stream ending means the transport connection was lost.
pub type NotificationStream =
    Pin<Box<dyn Stream<Item = Result<Notification, BusError>> + Send>>;

/// Boxed future returned by transport operations.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BusError>> + Send + 'a>>;

/// Publish/subscribe transport keyed by [`Topic`].
///
/// Implementations must preserve publish order per topic and must only yield
/// notifications the topic [`accepts`](Topic::accepts).
pub trait AvailabilityBus: Send + Sync {
    /// Publish one notification to one topic.
    fn publish<'a>(&'a self, topic: &'a Topic, notification: &'a Notification)
    -> BusFuture<'a, ()>;

    /// Open a stream of notifications for a topic.
    fn subscribe<'a>(&'a self, topic: &'a Topic) -> BusFuture<'a, NotificationStream>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: test fails on malformed fixtures
mod tests {
    use super::*;

    fn room_update(hotel_id: HotelId) -> Notification {
        Notification::Room(RoomUpdate {
            room_id: RoomId::new(),
            hotel_id,
            room_number: "101".to_string(),
            status: RoomStatus::Reserved,
            updated_at: Utc::now(),
        })
    }

    #[test]
    fn test_topic_string_forms() {
        let hotel = HotelId::new();
        for topic in [
            Topic::AllRooms,
            Topic::HotelRooms(hotel),
            Topic::HotelBookings(hotel),
        ] {
            assert_eq!(topic.to_string().parse::<Topic>(), Ok(topic));
        }
        assert!("rooms:hotel:not-a-uuid".parse::<Topic>().is_err());
        assert!("bookings:all".parse::<Topic>().is_err());
    }

    #[test]
    fn test_hotel_topic_filters_other_hotels() {
        let mine = HotelId::new();
        let theirs = HotelId::new();
        let topic = Topic::HotelRooms(mine);

        assert!(topic.accepts(&room_update(mine)));
        assert!(!topic.accepts(&room_update(theirs)));
        assert!(Topic::AllRooms.accepts(&room_update(theirs)));
        assert!(!Topic::HotelBookings(mine).accepts(&room_update(mine)));
    }

    #[test]
    fn test_topic_authorization() {
        let mine = HotelId::new();
        let theirs = HotelId::new();
        let staff = Principal::staff(mine);

        assert!(Topic::HotelRooms(mine).authorize(&staff).is_ok());
        assert!(Topic::HotelRooms(theirs).authorize(&staff).is_err());
        assert!(Topic::AllRooms.authorize(&staff).is_err());
        assert!(Topic::AllRooms.authorize(&Principal::guest()).is_ok());
        assert!(Topic::HotelRooms(theirs).authorize(&Principal::guest()).is_ok());
        assert!(Topic::HotelBookings(mine).authorize(&Principal::guest()).is_err());
        assert!(Topic::HotelBookings(mine).authorize(&staff).is_ok());
    }

    #[test]
    fn test_room_update_is_published_to_both_room_topics() {
        let hotel = HotelId::new();
        let topics = room_update(hotel).topics();
        assert_eq!(topics, vec![Topic::HotelRooms(hotel), Topic::AllRooms]);
    }

    #[test]
    fn test_notification_json_is_tagged() {
        let json = serde_json::to_value(room_update(HotelId::new())).unwrap();
        assert_eq!(json["type"], "room");
        assert_eq!(json["status"], "reserved");
    }
}
