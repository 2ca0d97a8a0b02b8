//! Booking endpoints.
//!
//! - `POST /api/bookings`: reserve a room (public)
//! - `GET /api/bookings/:reference`: look a booking up by reference (public)
//! - `GET /api/hotel/bookings`: list bookings (staff)
//! - `GET /api/hotel/bookings/:id`: one booking (staff)
//! - `POST /api/hotel/bookings/:id/check-in|check-out|cancel`: lifecycle (staff)

use crate::error::AppError;
use crate::extractors::{Caller, ValidJson, ValidPath, ValidQuery};
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use roaman_core::types::{Booking, BookingId, BookingStatus, GuestDetails, HotelId, RoomId, StayType};
use roaman_runtime::ReservationRequest;
use serde::Deserialize;

/// Default page size for booking lists.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

// ============================================================================
// Request Types
// ============================================================================

/// Body of `POST /api/bookings`.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    /// Room to book
    pub room_id: RoomId,
    /// Stay start (RFC 3339)
    pub check_in: DateTime<Utc>,
    /// Stay end, exclusive (RFC 3339)
    pub check_out: DateTime<Utc>,
    /// Guest full name
    pub guest_name: String,
    /// Guest email
    pub guest_email: String,
    /// Guest phone
    pub guest_phone: String,
    /// Pricing mode; nightly when omitted
    #[serde(default = "default_stay_type")]
    pub stay_type: StayType,
    /// Total in minor currency units
    pub total_amount: i64,
    /// Free-text requests
    #[serde(default)]
    pub special_requests: Option<String>,
}

const fn default_stay_type() -> StayType {
    StayType::Nightly
}

impl From<CreateBookingRequest> for ReservationRequest {
    fn from(body: CreateBookingRequest) -> Self {
        Self {
            room_id: body.room_id,
            check_in: body.check_in,
            check_out: body.check_out,
            guest: GuestDetails {
                name: body.guest_name,
                email: body.guest_email,
                phone: body.guest_phone,
            },
            stay_type: body.stay_type,
            total_amount: body.total_amount,
            special_requests: body.special_requests,
        }
    }
}

/// Query of `GET /api/hotel/bookings`.
#[derive(Debug, Default, Deserialize)]
pub struct ListBookingsQuery {
    /// Hotel to list; staff default to their own
    pub hotel_id: Option<HotelId>,
    /// Only bookings in this status
    pub status: Option<BookingStatus>,
    /// Page size, capped at [`roaman_runtime::engine::MAX_BOOKING_PAGE`]
    pub limit: Option<u32>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Reserve a room.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/bookings \
///   -H 'content-type: application/json' \
///   -d '{"room_id":"...","check_in":"2025-02-01T14:00:00Z","check_out":"2025-02-03T12:00:00Z",
///        "guest_name":"Ada","guest_email":"ada@example.com","guest_phone":"+2348000000000",
///        "total_amount":50000}'
/// ```
///
/// Returns 201 with the confirmed booking, 409 if the window is taken, 422 on bad
/// input and 408 if the room stayed locked too long.
pub async fn create_booking(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.engine.reserve(body.into()).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// Look a booking up by its `ROM-XXXXXXXX` reference, case-insensitively.
pub async fn get_by_reference(
    State(state): State<AppState>,
    ValidPath(reference): ValidPath<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.engine.lookup(&reference).await?))
}

/// List bookings, newest first.
pub async fn list_bookings(
    State(state): State<AppState>,
    Caller(principal): Caller,
    ValidQuery(query): ValidQuery<ListBookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let bookings = state
        .engine
        .list_bookings(&principal, query.hotel_id, query.status, limit)
        .await?;
    Ok(Json(bookings))
}

/// One booking, for staff of its hotel.
pub async fn get_booking(
    State(state): State<AppState>,
    Caller(principal): Caller,
    ValidPath(booking_id): ValidPath<BookingId>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.engine.get_booking(&principal, booking_id).await?))
}

/// `confirmed` → `checked_in`; the room becomes `occupied`.
pub async fn check_in(
    State(state): State<AppState>,
    Caller(principal): Caller,
    ValidPath(booking_id): ValidPath<BookingId>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.engine.check_in(&principal, booking_id).await?))
}

/// `checked_in` → `checked_out`; the room is released.
pub async fn check_out(
    State(state): State<AppState>,
    Caller(principal): Caller,
    ValidPath(booking_id): ValidPath<BookingId>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.engine.check_out(&principal, booking_id).await?))
}

/// `pending`/`confirmed` → `cancelled`; the room is released.
pub async fn cancel(
    State(state): State<AppState>,
    Caller(principal): Caller,
    ValidPath(booking_id): ValidPath<BookingId>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.engine.cancel(&principal, booking_id).await?))
}
