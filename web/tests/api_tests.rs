//! HTTP API tests over the in-memory store and bus.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use roaman_core::types::{Booking, BookingStatus, HotelId, Room, RoomStatus};
use roaman_runtime::{
    AvailabilityNotifier, EngineConfig, HotelDetails, NotifierConfig, ReservationEngine,
};
use roaman_testing::fixtures::{self, SeededHotel};
use roaman_testing::{InMemoryBookingStore, InMemoryBus, test_clock};
use roaman_web::{AppState, router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

struct Api {
    server: TestServer,
    store: InMemoryBookingStore,
    hotel: SeededHotel,
}

impl Api {
    fn new(rooms: usize) -> Self {
        Self::with_config(rooms, EngineConfig::default())
    }

    fn with_config(rooms: usize, config: EngineConfig) -> Self {
        let store = InMemoryBookingStore::new();
        let hotel = fixtures::seed_hotel(&store, "harbor-view", rooms);
        let notifier = AvailabilityNotifier::new(
            Arc::new(InMemoryBus::new()),
            Arc::new(store.clone()),
            NotifierConfig::default()
                .with_reconnect_delays(Duration::from_millis(10), Duration::from_millis(50)),
        );
        let engine = ReservationEngine::new(
            Arc::new(store.clone()),
            notifier,
            Arc::new(test_clock()),
            config,
        );
        let state = AppState::new(Arc::new(engine), Arc::new(store.clone()));
        let server = TestServer::new(router(state)).unwrap();

        Self {
            server,
            store,
            hotel,
        }
    }

    fn hotel_id(&self) -> HotelId {
        self.hotel.hotel.id
    }

    fn room(&self, index: usize) -> &Room {
        &self.hotel.rooms[index]
    }

    async fn reserve(&self, room: &Room) -> Booking {
        let response = self
            .server
            .post("/api/bookings")
            .json(&booking_body(room))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        response.json::<Booking>()
    }
}

fn booking_body(room: &Room) -> Value {
    json!({
        "room_id": room.id,
        "check_in": "2025-02-01T14:00:00Z",
        "check_out": "2025-02-03T12:00:00Z",
        "guest_name": "Ada Obi",
        "guest_email": "ada@example.com",
        "guest_phone": "+2348000000000",
        "total_amount": 50_000,
    })
}

fn role(value: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-roaman-role"),
        HeaderValue::from_static(value),
    )
}

fn hotel_claim(hotel_id: HotelId) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-roaman-hotel-id"),
        HeaderValue::from_str(&hotel_id.to_string()).unwrap(),
    )
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_liveness() {
    let api = Api::new(1);
    let response = api.server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_readiness_follows_store() {
    let api = Api::new(1);
    assert_eq!(
        api.server.get("/health/ready").await.status_code(),
        StatusCode::OK
    );

    api.store.set_unavailable(true);
    assert_eq!(
        api.server.get("/health/ready").await.status_code(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_metrics_without_recorder_is_unavailable() {
    let api = Api::new(1);
    let response = api.server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let api = Api::new(1);
    let response = api.server.get("/health").await;
    let id = response.header("x-correlation-id");
    assert!(uuid::Uuid::parse_str(id.to_str().unwrap()).is_ok());
}

// ============================================================================
// Reservations
// ============================================================================

#[tokio::test]
async fn test_reserve_then_lookup_by_reference() {
    let api = Api::new(2);
    let booking = api.reserve(api.room(0)).await;

    assert_eq!(booking.booking_status, BookingStatus::Confirmed);
    assert!(booking.booking_reference.as_str().starts_with("ROM-"));
    assert_eq!(
        api.store.room(api.room(0).id).unwrap().status,
        RoomStatus::Reserved
    );

    let reference = booking.booking_reference.as_str().to_lowercase();
    let response = api.server.get(&format!("/api/bookings/{reference}")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Booking>().id, booking.id);
}

#[tokio::test]
async fn test_overlapping_reservation_is_conflict() {
    let api = Api::new(1);
    api.reserve(api.room(0)).await;

    let response = api
        .server
        .post("/api/bookings")
        .json(&booking_body(api.room(0)))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "CONFLICT");
}

#[tokio::test]
async fn test_invalid_input_lists_fields() {
    let api = Api::new(1);
    let mut body = booking_body(api.room(0));
    body["guest_email"] = json!("not-an-email");
    body["check_out"] = json!("2025-02-01T10:00:00Z");

    let response = api.server.post("/api/bookings").json(&body).await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let error = response.json::<Value>();
    assert_eq!(error["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = error["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"guest_email"));
    assert!(fields.contains(&"check_out"));
    assert!(api.store.bookings_for_room(api.room(0).id).is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_a_json_validation_error() {
    let api = Api::new(1);
    let mut body = booking_body(api.room(0));
    body.as_object_mut().unwrap().remove("guest_phone");

    let response = api.server.post("/api/bookings").json(&body).await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let error = response.json::<Value>();
    assert_eq!(error["code"], "VALIDATION_ERROR");
    assert_eq!(error["fields"][0]["field"], "guest_phone");
    assert!(
        error["fields"][0]["message"]
            .as_str()
            .unwrap()
            .contains("guest_phone")
    );

    let garbled = api
        .server
        .post("/api/bookings")
        .bytes("{\"room_id\":".into())
        .content_type("application/json")
        .await;
    assert_eq!(garbled.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(garbled.json::<Value>()["code"], "VALIDATION_ERROR");
    assert!(api.store.bookings_for_room(api.room(0).id).is_empty());
}

#[tokio::test]
async fn test_malformed_path_and_query_are_json_errors() {
    let api = Api::new(1);
    let (role_name, role_value) = role("staff");
    let (hotel_name, hotel_value) = hotel_claim(api.hotel_id());

    let path = api
        .server
        .put("/api/hotel/rooms/not-a-uuid/status")
        .add_header(role_name, role_value)
        .add_header(hotel_name, hotel_value)
        .json(&json!({ "status": "maintenance" }))
        .await;
    assert_eq!(path.json::<Value>()["code"], "VALIDATION_ERROR");
    assert_eq!(path.json::<Value>()["fields"][0]["field"], "path");

    let query = api.server.get("/api/ws").await;
    assert_eq!(query.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(query.json::<Value>()["code"], "VALIDATION_ERROR");
    assert_eq!(query.json::<Value>()["fields"][0]["field"], "topic");
}

#[tokio::test]
async fn test_lock_timeout_is_retryable() {
    let api = Api::with_config(
        1,
        EngineConfig::default().with_lock_timeout(Duration::from_millis(50)),
    );
    let held = api.store.hold_room_lock(api.room(0).id).await;

    let response = api
        .server
        .post("/api/bookings")
        .json(&booking_body(api.room(0)))
        .await;

    assert_eq!(response.status_code(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(response.json::<Value>()["retryable"], true);
    drop(held);
}

#[tokio::test]
async fn test_unknown_reference_is_not_found() {
    let api = Api::new(1);
    let response = api.server.get("/api/bookings/ROM-AAAAAAAA").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Staff lifecycle
// ============================================================================

#[tokio::test]
async fn test_staff_check_in_and_out() {
    let api = Api::new(1);
    let booking = api.reserve(api.room(0)).await;
    let (role_name, role_value) = role("staff");
    let (hotel_name, hotel_value) = hotel_claim(api.hotel_id());

    let response = api
        .server
        .post(&format!("/api/hotel/bookings/{}/check-in", booking.id))
        .add_header(role_name.clone(), role_value.clone())
        .add_header(hotel_name.clone(), hotel_value.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.json::<Booking>().booking_status,
        BookingStatus::CheckedIn
    );
    assert_eq!(
        api.store.room(api.room(0).id).unwrap().status,
        RoomStatus::Occupied
    );

    let response = api
        .server
        .post(&format!("/api/hotel/bookings/{}/check-out", booking.id))
        .add_header(role_name, role_value)
        .add_header(hotel_name, hotel_value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        api.store.room(api.room(0).id).unwrap().status,
        RoomStatus::Available
    );
}

#[tokio::test]
async fn test_check_out_before_check_in_is_invalid_state() {
    let api = Api::new(1);
    let booking = api.reserve(api.room(0)).await;
    let (role_name, role_value) = role("admin");

    let response = api
        .server
        .post(&format!("/api/hotel/bookings/{}/check-out", booking.id))
        .add_header(role_name, role_value)
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_guest_and_foreign_staff_are_forbidden() {
    let api = Api::new(1);
    let booking = api.reserve(api.room(0)).await;
    let path = format!("/api/hotel/bookings/{}/cancel", booking.id);

    let guest = api.server.post(&path).await;
    assert_eq!(guest.status_code(), StatusCode::FORBIDDEN);

    let (role_name, role_value) = role("staff");
    let (hotel_name, hotel_value) = hotel_claim(HotelId::new());
    let foreign = api
        .server
        .post(&path)
        .add_header(role_name, role_value)
        .add_header(hotel_name, hotel_value)
        .await;
    assert_eq!(foreign.status_code(), StatusCode::FORBIDDEN);

    assert_eq!(
        api.store.booking(booking.id).unwrap().booking_status,
        BookingStatus::Confirmed
    );
}

#[tokio::test]
async fn test_cancel_releases_room() {
    let api = Api::new(1);
    let booking = api.reserve(api.room(0)).await;
    let (role_name, role_value) = role("admin");

    let response = api
        .server
        .post(&format!("/api/hotel/bookings/{}/cancel", booking.id))
        .add_header(role_name, role_value)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.json::<Booking>().booking_status,
        BookingStatus::Cancelled
    );
    assert_eq!(
        api.store.room(api.room(0).id).unwrap().status,
        RoomStatus::Available
    );
}

#[tokio::test]
async fn test_staff_lists_own_bookings() {
    let api = Api::new(2);
    api.reserve(api.room(0)).await;
    api.reserve(api.room(1)).await;
    let (role_name, role_value) = role("staff");
    let (hotel_name, hotel_value) = hotel_claim(api.hotel_id());

    let response = api
        .server
        .get("/api/hotel/bookings")
        .add_query_param("status", "confirmed")
        .add_header(role_name, role_value)
        .add_header(hotel_name, hotel_value)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let bookings = response.json::<Vec<Booking>>();
    assert_eq!(bookings.len(), 2);
    assert!(bookings.iter().all(|b| b.hotel_id == api.hotel_id()));
}

// ============================================================================
// Rooms and availability
// ============================================================================

#[tokio::test]
async fn test_room_status_and_availability() {
    let api = Api::new(3);
    api.reserve(api.room(0)).await;
    let (role_name, role_value) = role("staff");
    let (hotel_name, hotel_value) = hotel_claim(api.hotel_id());

    let response = api
        .server
        .put(&format!("/api/hotel/rooms/{}/status", api.room(1).id))
        .add_header(role_name, role_value)
        .add_header(hotel_name, hotel_value)
        .json(&json!({ "status": "maintenance" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Room>().status, RoomStatus::Maintenance);

    let response = api
        .server
        .get(&format!("/api/hotels/{}/availability", api.hotel_id()))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let availability = response.json::<Value>();
    assert_eq!(availability["status"], "available");
    assert_eq!(availability["count"], 1);
    assert_eq!(availability["rooms"].as_array().unwrap().len(), 1);
    assert_eq!(
        availability["rooms"][0]["room_id"],
        json!(api.room(2).id)
    );

    let rooms = api
        .server
        .get("/api/hotels/harbor-view/rooms")
        .await
        .json::<Vec<Room>>();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].id, api.room(2).id);
}

#[tokio::test]
async fn test_hotel_details_by_slug() {
    let api = Api::new(2);

    let response = api.server.get("/api/hotels/harbor-view").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let details = response.json::<HotelDetails>();
    assert_eq!(details.hotel.slug, "harbor-view");
    assert_eq!(details.room_types.len(), 1);
    assert_eq!(details.room_types[0].id, api.hotel.room_type.id);

    let mut hotel = api.hotel.hotel.clone();
    hotel.is_active = false;
    api.store.insert_hotel(hotel);
    let hidden = api.server.get("/api/hotels/harbor-view").await;
    assert_eq!(hidden.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(hidden.json::<Value>()["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_status_summary_counts_every_status() {
    let api = Api::new(2);
    api.reserve(api.room(0)).await;

    let response = api
        .server
        .get(&format!("/api/hotels/{}/status-summary", api.hotel_id()))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let summary = response.json::<Value>();
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["counts"]["available"], 1);
    assert_eq!(summary["counts"]["reserved"], 1);
    assert_eq!(summary["counts"]["maintenance"], 0);
}

#[tokio::test]
async fn test_unknown_hotel_is_not_found() {
    let api = Api::new(1);

    let availability = api
        .server
        .get(&format!("/api/hotels/{}/availability", HotelId::new()))
        .await;
    assert_eq!(availability.status_code(), StatusCode::NOT_FOUND);

    let rooms = api.server.get("/api/hotels/nowhere/rooms").await;
    assert_eq!(rooms.status_code(), StatusCode::NOT_FOUND);

    let details = api.server.get("/api/hotels/nowhere").await;
    assert_eq!(details.status_code(), StatusCode::NOT_FOUND);
}

// ============================================================================
// WebSocket handshake
// ============================================================================

#[tokio::test]
async fn test_subscribe_rejects_bad_topics_before_upgrade() {
    let api = Api::new(1);

    let malformed = api
        .server
        .get("/api/ws")
        .add_query_param("topic", "rooms:everywhere")
        .await;
    assert_eq!(malformed.status_code(), StatusCode::NOT_FOUND);

    let bookings = api
        .server
        .get("/api/ws")
        .add_query_param("topic", format!("bookings:hotel:{}", api.hotel_id()))
        .await;
    assert_eq!(bookings.status_code(), StatusCode::FORBIDDEN);

    let plain = api
        .server
        .get("/api/ws")
        .add_query_param("topic", "rooms:all")
        .await;
    assert_eq!(plain.status_code(), StatusCode::BAD_REQUEST);
}
