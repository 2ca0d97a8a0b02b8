//! Room and availability endpoints.

use crate::error::AppError;
use crate::extractors::{Caller, ValidJson, ValidPath, ValidQuery};
use crate::state::AppState;
use axum::{Json, extract::State};
use roaman_core::availability::{Notification, RoomUpdate, Topic};
use roaman_core::store::StatusCounts;
use roaman_core::types::{HotelId, Room, RoomId, RoomStatus, RoomTypeId};
use roaman_runtime::HotelDetails;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request / Response Types
// ============================================================================

/// Body of `PUT /api/hotel/rooms/:id/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateRoomStatusRequest {
    /// New status
    pub status: RoomStatus,
}

/// Query of `GET /api/hotels/:slug/rooms`.
#[derive(Debug, Default, Deserialize)]
pub struct AvailableRoomsQuery {
    /// Restrict to one room type
    pub room_type_id: Option<RoomTypeId>,
}

/// Query of `GET /api/hotels/:id/availability`.
#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityQuery {
    /// Status to count; `available` when omitted
    pub status: Option<RoomStatus>,
}

/// Rooms of a hotel in one status.
#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    /// Hotel
    pub hotel_id: HotelId,
    /// Status counted
    pub status: RoomStatus,
    /// Active rooms in `status`
    pub count: u64,
    /// Those rooms, as the live feed would describe them
    pub rooms: Vec<RoomUpdate>,
}

/// Room counts for a hotel dashboard.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusSummaryResponse {
    /// Hotel
    pub hotel_id: HotelId,
    /// Count per status, zeros included
    pub counts: StatusCounts,
    /// Active rooms in total
    pub total: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Set a room's status directly (maintenance, cleaning, ...). Staff only.
pub async fn update_room_status(
    State(state): State<AppState>,
    Caller(principal): Caller,
    ValidPath(room_id): ValidPath<RoomId>,
    ValidJson(body): ValidJson<UpdateRoomStatusRequest>,
) -> Result<Json<Room>, AppError> {
    let room = state
        .engine
        .set_room_status(&principal, room_id, body.status)
        .await?;
    Ok(Json(room))
}

/// An active hotel and its room types, by slug. Public.
pub async fn hotel_details(
    State(state): State<AppState>,
    ValidPath(slug): ValidPath<String>,
) -> Result<Json<HotelDetails>, AppError> {
    Ok(Json(state.engine.hotel_details(&slug).await?))
}

/// Active rooms currently `available` in an active hotel, by slug. Public.
pub async fn available_rooms(
    State(state): State<AppState>,
    ValidPath(slug): ValidPath<String>,
    ValidQuery(query): ValidQuery<AvailableRoomsQuery>,
) -> Result<Json<Vec<Room>>, AppError> {
    let rooms = state
        .engine
        .available_rooms(&slug, query.room_type_id)
        .await?;
    Ok(Json(rooms))
}

/// Count and list a hotel's rooms in one status.
///
/// Readable by anyone who could subscribe to `rooms:hotel:<id>`.
pub async fn hotel_availability(
    State(state): State<AppState>,
    Caller(principal): Caller,
    ValidPath(hotel_id): ValidPath<HotelId>,
    ValidQuery(query): ValidQuery<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let topic = Topic::HotelRooms(hotel_id);
    topic.authorize(&principal)?;
    let status = query.status.unwrap_or(RoomStatus::Available);

    let notifier = state.engine.notifier();
    let count = notifier.count_by_status(hotel_id, status).await?;
    let rooms = notifier
        .snapshot(&topic)
        .await?
        .into_iter()
        .filter_map(|notification| match notification {
            Notification::Room(update) if update.status == status => Some(update),
            _ => None,
        })
        .collect();

    Ok(Json(AvailabilityResponse {
        hotel_id,
        status,
        count,
        rooms,
    }))
}

/// Room counts for every status.
pub async fn status_summary(
    State(state): State<AppState>,
    Caller(principal): Caller,
    ValidPath(hotel_id): ValidPath<HotelId>,
) -> Result<Json<StatusSummaryResponse>, AppError> {
    Topic::HotelRooms(hotel_id).authorize(&principal)?;
    let counts = state.engine.notifier().status_summary(hotel_id).await?;
    let total = counts.values().sum();
    Ok(Json(StatusSummaryResponse {
        hotel_id,
        counts,
        total,
    }))
}
