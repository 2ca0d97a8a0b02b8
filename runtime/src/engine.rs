//! The reservation engine.
//!
//! [`ReservationEngine`] owns every write to bookings and room status. Each
//! operation runs inside one storage transaction that first locks the affected
//! room row, so conflicting writes on a room are strictly serialized while
//! operations on different rooms proceed in parallel.
//!
//! ```text
//! reserve ──validate──▶ begin ──lock room──▶ overlap check ──▶ insert + room status ──▶ commit ──▶ publish
//!              │                   │               │
//!        Validation            Timeout          Conflict        (rollback on any error)
//! ```
//!
//! Notifications are published only after commit, so subscribers never observe
//! a change that was rolled back.

use crate::metrics::ReservationMetrics;
use crate::notifier::AvailabilityNotifier;
use chrono::{DateTime, Utc};
use roaman_core::auth::Principal;
use roaman_core::availability::{BookingUpdate, RoomUpdate};
use roaman_core::environment::{Clock, RandomReferences, ReferenceSource};
use roaman_core::error::{BookingError, FieldError, StoreError};
use roaman_core::reference::BookingReference;
use roaman_core::store::{
    BookingFilter, BookingStore, LockedRoom, ReservationTx, RoomFilter, TxOptions,
};
use roaman_core::types::{
    Booking, BookingId, BookingStatus, GuestDetails, Hotel, HotelId, PaymentStatus, Room, RoomId,
    RoomStatus, RoomType, RoomTypeId, StayType, StayWindow,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest accepted special-requests text, in characters.
pub const MAX_SPECIAL_REQUESTS: usize = 2000;

/// Upper bound on rows returned by [`ReservationEngine::list_bookings`].
pub const MAX_BOOKING_PAGE: u32 = 500;

// ============================================================================
// Configuration
// ============================================================================

/// Reservation engine settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bound on waiting for a room lock
    pub lock_timeout: Duration,
    /// Reference draws before giving up with an internal error
    pub reference_attempts: usize,
    /// Send rooms to `cleaning` instead of `available` on check-out
    pub checkout_to_cleaning: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(3),
            reference_attempts: 5,
            checkout_to_cleaning: false,
        }
    }
}

impl EngineConfig {
    /// Set the lock timeout.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Set the number of reference draws.
    #[must_use]
    pub const fn with_reference_attempts(mut self, attempts: usize) -> Self {
        self.reference_attempts = attempts;
        self
    }

    /// Enable or disable the cleaning step after check-out.
    #[must_use]
    pub const fn with_checkout_to_cleaning(mut self, enabled: bool) -> Self {
        self.checkout_to_cleaning = enabled;
        self
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Input to [`ReservationEngine::reserve`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    /// Room to book
    pub room_id: RoomId,
    /// Stay start
    pub check_in: DateTime<Utc>,
    /// Stay end (exclusive)
    pub check_out: DateTime<Utc>,
    /// Guest contact details
    pub guest: GuestDetails,
    /// Pricing mode
    pub stay_type: StayType,
    /// Total in minor currency units, computed by the pricing collaborator
    pub total_amount: i64,
    /// Free-text requests
    pub special_requests: Option<String>,
}

struct ValidRequest {
    room_id: RoomId,
    window: StayWindow,
    guest: GuestDetails,
    stay_type: StayType,
    total_amount: i64,
    special_requests: Option<String>,
}

fn validate(request: ReservationRequest) -> Result<ValidRequest, BookingError> {
    let mut errors = Vec::new();

    let window = StayWindow::new(request.check_in, request.check_out);
    if window.is_none() {
        errors.push(FieldError::new("check_out", "must be after check_in"));
    }

    let name = request.guest.name.trim().to_string();
    let email = request.guest.email.trim().to_string();
    let phone = request.guest.phone.trim().to_string();
    if name.is_empty() {
        errors.push(FieldError::new("guest_name", "must not be empty"));
    }
    if email.is_empty() {
        errors.push(FieldError::new("guest_email", "must not be empty"));
    } else if !email.contains('@') {
        errors.push(FieldError::new("guest_email", "must be an email address"));
    }
    if phone.is_empty() {
        errors.push(FieldError::new("guest_phone", "must not be empty"));
    }

    if request.total_amount < 0 {
        errors.push(FieldError::new("total_amount", "must not be negative"));
    }

    let special_requests = request
        .special_requests
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if special_requests
        .as_ref()
        .is_some_and(|s| s.chars().count() > MAX_SPECIAL_REQUESTS)
    {
        errors.push(FieldError::new(
            "special_requests",
            format!("must be at most {MAX_SPECIAL_REQUESTS} characters"),
        ));
    }

    match window {
        Some(window) if errors.is_empty() => Ok(ValidRequest {
            room_id: request.room_id,
            window,
            guest: GuestDetails { name, email, phone },
            stay_type: request.stay_type,
            total_amount: request.total_amount,
            special_requests,
        }),
        _ => Err(BookingError::Validation(errors)),
    }
}

/// Public view of an active hotel with its room types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HotelDetails {
    /// The hotel
    pub hotel: Hotel,
    /// Room types, ordered by name
    pub room_types: Vec<RoomType>,
}

// ============================================================================
// Lifecycle transitions
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transition {
    CheckIn,
    CheckOut,
    Cancel,
}

impl Transition {
    const fn action(self) -> &'static str {
        match self {
            Self::CheckIn => "check_in",
            Self::CheckOut => "check_out",
            Self::Cancel => "cancel",
        }
    }

    const fn from(self) -> &'static [BookingStatus] {
        match self {
            Self::CheckIn => &[BookingStatus::Confirmed],
            Self::CheckOut => &[BookingStatus::CheckedIn],
            Self::Cancel => &[BookingStatus::Pending, BookingStatus::Confirmed],
        }
    }

    const fn to(self) -> BookingStatus {
        match self {
            Self::CheckIn => BookingStatus::CheckedIn,
            Self::CheckOut => BookingStatus::CheckedOut,
            Self::Cancel => BookingStatus::Cancelled,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Creates bookings and drives their lifecycle without violating the
/// per-room non-overlap invariant.
pub struct ReservationEngine {
    store: Arc<dyn BookingStore>,
    notifier: AvailabilityNotifier,
    clock: Arc<dyn Clock>,
    references: Arc<dyn ReferenceSource>,
    config: EngineConfig,
}

impl ReservationEngine {
    /// Create an engine over the given store, notifier and clock, drawing
    /// random booking references.
    #[must_use]
    pub fn new(
        store: Arc<dyn BookingStore>,
        notifier: AvailabilityNotifier,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            references: Arc::new(RandomReferences),
            config,
        }
    }

    /// Replace the booking reference source.
    #[must_use]
    pub fn with_references(mut self, references: Arc<dyn ReferenceSource>) -> Self {
        self.references = references;
        self
    }

    /// Engine settings.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The notifier committed changes are published through.
    #[must_use]
    pub const fn notifier(&self) -> &AvailabilityNotifier {
        &self.notifier
    }

    pub(crate) fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ------------------------------------------------------------------------
    // reserve
    // ------------------------------------------------------------------------

    /// Atomically create a confirmed booking and mark the room reserved.
    ///
    /// The overlap check and the insert run under the room's row lock, so of
    /// any set of concurrent calls with overlapping windows on one room exactly
    /// one succeeds.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`]: bad input, or an inactive room/hotel
    /// - [`BookingError::NotFound`]: unknown room
    /// - [`BookingError::Conflict`]: window overlaps an active booking, or the
    ///   room is under maintenance
    /// - [`BookingError::Timeout`]: room lock not acquired in time (retryable)
    /// - [`BookingError::Internal`]: reference exhaustion or storage failure
    pub async fn reserve(&self, request: ReservationRequest) -> Result<Booking, BookingError> {
        let started = Instant::now();
        let room_id = request.room_id;
        let result = self.reserve_inner(request).await;

        let outcome = match &result {
            Ok(_) => "confirmed",
            Err(BookingError::Conflict { .. }) => "conflict",
            Err(BookingError::Timeout(_)) => "timeout",
            Err(BookingError::Validation(_)) => "invalid",
            Err(_) => "error",
        };
        ReservationMetrics::record_reserve(outcome, started.elapsed());

        match &result {
            Ok(booking) => tracing::info!(
                room_id = %room_id,
                booking_id = %booking.id,
                booking_reference = %booking.booking_reference,
                "Reservation confirmed"
            ),
            Err(BookingError::Conflict { reason }) => {
                tracing::warn!(room_id = %room_id, reason = %reason, "Reservation conflict");
            }
            Err(BookingError::Timeout(msg)) => {
                tracing::warn!(room_id = %room_id, error = %msg, "Reservation timed out");
            }
            Err(BookingError::Internal(msg)) => {
                tracing::error!(room_id = %room_id, error = %msg, "Reservation failed");
            }
            Err(err) => tracing::debug!(room_id = %room_id, error = %err, "Reservation rejected"),
        }

        result
    }

    async fn reserve_inner(&self, request: ReservationRequest) -> Result<Booking, BookingError> {
        let request = validate(request)?;

        let mut tx = self.begin().await?;
        let outcome = self.reserve_in_tx(tx.as_mut(), request).await;
        let (booking, room) = finish(tx, outcome).await?;

        if let Some(room) = &room {
            ReservationMetrics::record_room_status(room.status);
            self.publish_room(room).await;
        }
        self.publish_booking(&booking).await;

        Ok(booking)
    }

    async fn reserve_in_tx(
        &self,
        tx: &mut dyn ReservationTx,
        request: ValidRequest,
    ) -> Result<(Booking, Option<Room>), BookingError> {
        let LockedRoom { room, hotel_active } = self.lock_room(tx, request.room_id).await?;

        if !room.is_active || !hotel_active {
            return Err(BookingError::invalid(
                "room_id",
                "room is not available for booking",
            ));
        }
        if room.status == RoomStatus::Maintenance {
            return Err(BookingError::Conflict {
                reason: "room is under maintenance".to_string(),
            });
        }

        let overlapping = tx
            .find_overlapping_bookings(room.id, request.window)
            .await?;
        if !overlapping.is_empty() {
            return Err(BookingError::room_unavailable());
        }

        let now = self.clock.now();
        let draft = Booking {
            id: BookingId::new(),
            booking_reference: self.references.next_reference(),
            hotel_id: room.hotel_id,
            room_id: room.id,
            room_type_id: room.room_type_id,
            guest: request.guest,
            window: request.window,
            stay_type: request.stay_type,
            total_amount: request.total_amount,
            payment_status: PaymentStatus::Pending,
            booking_status: BookingStatus::Confirmed,
            special_requests: request.special_requests,
            created_at: now,
            updated_at: now,
        };
        let booking = self.insert_with_unique_reference(tx, draft).await?;

        // An in-house guest keeps the room occupied.
        let room = if room.status == RoomStatus::Occupied || room.status == RoomStatus::Reserved {
            None
        } else {
            Some(tx.update_room_status(room.id, RoomStatus::Reserved, now).await?)
        };

        Ok((booking, room))
    }

    /// Insert `booking`, drawing a new reference each time the store reports
    /// the current one taken, up to [`EngineConfig::reference_attempts`] draws.
    async fn insert_with_unique_reference(
        &self,
        tx: &mut dyn ReservationTx,
        mut booking: Booking,
    ) -> Result<Booking, BookingError> {
        let attempts = self.config.reference_attempts.max(1);
        let mut attempt = 1;
        loop {
            match tx.insert_booking(booking.clone()).await {
                Ok(()) => return Ok(booking),
                Err(StoreError::DuplicateReference) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        reference = %booking.booking_reference,
                        "Booking reference collision"
                    );
                    attempt += 1;
                    booking.booking_reference = self.references.next_reference();
                }
                Err(StoreError::DuplicateReference) => {
                    return Err(BookingError::Internal(format!(
                        "no unique booking reference after {attempts} attempts"
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Move a `confirmed` booking to `checked_in`; the room becomes `occupied`.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidState`] unless the booking is `confirmed`, plus
    /// the authorization, lookup and storage errors of every transition.
    pub async fn check_in(
        &self,
        principal: &Principal,
        booking_id: BookingId,
    ) -> Result<Booking, BookingError> {
        self.transition(principal, booking_id, Transition::CheckIn)
            .await
    }

    /// Move a `checked_in` booking to `checked_out` and release the room.
    ///
    /// The room becomes `available`, or `cleaning` when
    /// [`EngineConfig::checkout_to_cleaning`] is set, unless other bookings
    /// still hold it.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidState`] unless the booking is `checked_in`.
    pub async fn check_out(
        &self,
        principal: &Principal,
        booking_id: BookingId,
    ) -> Result<Booking, BookingError> {
        self.transition(principal, booking_id, Transition::CheckOut)
            .await
    }

    /// Cancel a `pending` or `confirmed` booking, freeing its window.
    ///
    /// Rooms in `maintenance` or `cleaning` keep their status.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidState`] unless the booking is `pending` or
    /// `confirmed`.
    pub async fn cancel(
        &self,
        principal: &Principal,
        booking_id: BookingId,
    ) -> Result<Booking, BookingError> {
        self.transition(principal, booking_id, Transition::Cancel)
            .await
    }

    async fn transition(
        &self,
        principal: &Principal,
        booking_id: BookingId,
        transition: Transition,
    ) -> Result<Booking, BookingError> {
        let existing = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        principal.authorize_hotel(existing.hotel_id)?;

        let mut tx = self.begin().await?;
        let outcome = self
            .transition_in_tx(tx.as_mut(), &existing, transition)
            .await;
        let (booking, room) = finish(tx, outcome).await.inspect_err(|err| {
            tracing::debug!(
                booking_id = %booking_id,
                action = transition.action(),
                error = %err,
                "Booking transition rejected"
            );
        })?;

        ReservationMetrics::record_transition(booking.booking_status);
        tracing::info!(
            booking_id = %booking.id,
            booking_reference = %booking.booking_reference,
            action = transition.action(),
            role = %principal.role,
            "Booking transition committed"
        );

        if let Some(room) = &room {
            ReservationMetrics::record_room_status(room.status);
            self.publish_room(room).await;
        }
        self.publish_booking(&booking).await;

        Ok(booking)
    }

    async fn transition_in_tx(
        &self,
        tx: &mut dyn ReservationTx,
        existing: &Booking,
        transition: Transition,
    ) -> Result<(Booking, Option<Room>), BookingError> {
        let LockedRoom { room, .. } = self.lock_room(tx, existing.room_id).await?;

        let mut booking = tx
            .get_booking(existing.id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", existing.id))?;
        let invalid = |current| BookingError::InvalidState {
            action: transition.action(),
            current,
        };
        if !transition.from().contains(&booking.booking_status) {
            return Err(invalid(booking.booking_status));
        }

        let now = self.clock.now();
        let updated = tx
            .update_booking_status(booking.id, transition.from().to_vec(), transition.to(), now)
            .await?;
        if !updated {
            return Err(invalid(booking.booking_status));
        }
        booking.booking_status = transition.to();
        booking.updated_at = now;

        let target = match transition {
            Transition::CheckIn => Some(RoomStatus::Occupied),
            Transition::CheckOut | Transition::Cancel => {
                self.released_status(tx, &room, transition).await?
            }
        };
        let room = match target {
            Some(status) if status != room.status => {
                Some(tx.update_room_status(room.id, status, now).await?)
            }
            _ => None,
        };

        Ok((booking, room))
    }

    /// Room status after a booking stops holding the room.
    async fn released_status(
        &self,
        tx: &mut dyn ReservationTx,
        room: &Room,
        transition: Transition,
    ) -> Result<Option<RoomStatus>, BookingError> {
        if transition == Transition::Cancel
            && matches!(room.status, RoomStatus::Maintenance | RoomStatus::Cleaning)
        {
            return Ok(None);
        }

        let remaining = tx.active_bookings_for_room(room.id).await?;
        let status = if remaining
            .iter()
            .any(|b| b.booking_status == BookingStatus::CheckedIn)
        {
            RoomStatus::Occupied
        } else if !remaining.is_empty() {
            RoomStatus::Reserved
        } else if transition == Transition::CheckOut && self.config.checkout_to_cleaning {
            RoomStatus::Cleaning
        } else {
            RoomStatus::Available
        };
        Ok(Some(status))
    }

    // ------------------------------------------------------------------------
    // Direct room status edits
    // ------------------------------------------------------------------------

    /// Set a room's status directly (e.g. `maintenance`), under the room lock.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`]: unknown room
    /// - [`BookingError::Authorization`]: principal not scoped to the room's hotel
    /// - [`BookingError::Timeout`]: room lock not acquired in time
    pub async fn set_room_status(
        &self,
        principal: &Principal,
        room_id: RoomId,
        status: RoomStatus,
    ) -> Result<Room, BookingError> {
        let room = self
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| BookingError::not_found("room", room_id))?;
        principal.authorize_hotel(room.hotel_id)?;

        let mut tx = self.begin().await?;
        let outcome = self.set_status_in_tx(tx.as_mut(), room_id, status).await;
        let (room, changed) = finish(tx, outcome).await?;

        if changed {
            tracing::info!(
                room_id = %room.id,
                status = %room.status,
                role = %principal.role,
                "Room status set"
            );
            ReservationMetrics::record_room_status(room.status);
            self.publish_room(&room).await;
        }
        Ok(room)
    }

    async fn set_status_in_tx(
        &self,
        tx: &mut dyn ReservationTx,
        room_id: RoomId,
        status: RoomStatus,
    ) -> Result<(Room, bool), BookingError> {
        let LockedRoom { room, .. } = self.lock_room(tx, room_id).await?;
        if room.status == status {
            return Ok((room, false));
        }
        let room = tx
            .update_room_status(room_id, status, self.clock.now())
            .await?;
        Ok((room, true))
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Look a booking up by its guest-facing reference, case-insensitively.
    ///
    /// # Errors
    ///
    /// [`BookingError::Validation`] for a malformed reference,
    /// [`BookingError::NotFound`] if no booking uses it.
    pub async fn lookup(&self, reference: &str) -> Result<Booking, BookingError> {
        let reference = BookingReference::parse(reference).map_err(|_| {
            BookingError::invalid("booking_reference", "must look like ROM-XXXXXXXX")
        })?;
        self.store
            .find_booking_by_reference(reference.clone())
            .await?
            .ok_or_else(|| BookingError::not_found("booking", reference))
    }

    /// Load one booking for staff.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] or [`BookingError::Authorization`].
    pub async fn get_booking(
        &self,
        principal: &Principal,
        booking_id: BookingId,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        principal.authorize_hotel(booking.hotel_id)?;
        Ok(booking)
    }

    /// List bookings newest first.
    ///
    /// Staff always see only their own hotel; platform roles may pass any
    /// hotel or none.
    ///
    /// # Errors
    ///
    /// [`BookingError::Authorization`] for guests or for staff asking about
    /// another hotel.
    pub async fn list_bookings(
        &self,
        principal: &Principal,
        hotel_id: Option<HotelId>,
        status: Option<BookingStatus>,
        limit: u32,
    ) -> Result<Vec<Booking>, BookingError> {
        let hotel_id = match (principal.staff_scope()?, hotel_id) {
            (Some(own), Some(requested)) if own != requested => {
                principal.authorize_hotel(requested)?;
                Some(requested)
            }
            (Some(own), _) => Some(own),
            (None, requested) => requested,
        };

        let filter = BookingFilter {
            hotel_id,
            status,
            limit: limit.clamp(1, MAX_BOOKING_PAGE),
        };
        Ok(self.store.list_bookings(filter).await?)
    }

    /// An active hotel and its room types, by slug.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown or inactive hotel.
    pub async fn hotel_details(&self, hotel_slug: &str) -> Result<HotelDetails, BookingError> {
        let hotel = self.active_hotel(hotel_slug).await?;
        let room_types = self.store.list_room_types(hotel.id).await?;
        Ok(HotelDetails { hotel, room_types })
    }

    /// Active rooms with status `available` at an active hotel, by slug.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown or inactive hotel.
    pub async fn available_rooms(
        &self,
        hotel_slug: &str,
        room_type_id: Option<RoomTypeId>,
    ) -> Result<Vec<Room>, BookingError> {
        let hotel = self.active_hotel(hotel_slug).await?;

        let filter = RoomFilter::hotel(hotel.id)
            .room_type(room_type_id)
            .status(RoomStatus::Available)
            .active_only();
        Ok(self.store.list_rooms(filter).await?)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn active_hotel(&self, hotel_slug: &str) -> Result<Hotel, BookingError> {
        self.store
            .find_hotel_by_slug(hotel_slug.to_string())
            .await?
            .filter(|h| h.is_active)
            .ok_or_else(|| BookingError::not_found("hotel", hotel_slug))
    }

    async fn begin(&self) -> Result<Box<dyn ReservationTx>, BookingError> {
        Ok(self
            .store
            .begin(TxOptions::with_lock_timeout(self.config.lock_timeout))
            .await?)
    }

    async fn lock_room(
        &self,
        tx: &mut dyn ReservationTx,
        room_id: RoomId,
    ) -> Result<LockedRoom, BookingError> {
        let started = Instant::now();
        let locked = tokio::time::timeout(self.config.lock_timeout, tx.lock_room(room_id))
            .await
            .map_err(|_| {
                BookingError::Timeout(format!(
                    "room {room_id} lock not acquired within {:?}",
                    self.config.lock_timeout
                ))
            })??;
        ReservationMetrics::record_lock_wait(started.elapsed());

        locked.ok_or_else(|| BookingError::not_found("room", room_id))
    }

    async fn publish_room(&self, room: &Room) {
        let update = RoomUpdate {
            room_id: room.id,
            hotel_id: room.hotel_id,
            room_number: room.room_number.clone(),
            status: room.status,
            updated_at: room.updated_at,
        };
        self.notifier.publish(update.into()).await;
    }

    async fn publish_booking(&self, booking: &Booking) {
        let update = BookingUpdate {
            booking_id: booking.id,
            hotel_id: booking.hotel_id,
            room_id: booking.room_id,
            booking_reference: booking.booking_reference.clone(),
            booking_status: booking.booking_status,
            updated_at: booking.updated_at,
        };
        self.notifier.publish(update.into()).await;
    }
}

/// Commit on success, roll back on failure.
async fn finish<T>(
    tx: Box<dyn ReservationTx>,
    outcome: Result<T, BookingError>,
) -> Result<T, BookingError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
