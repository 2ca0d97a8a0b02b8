//! HTTP and WebSocket surface for the Roaman reservation service.
//!
//! Handlers are thin: they extract the caller and the request, call the
//! [`roaman_runtime::ReservationEngine`] or its notifier, and map
//! [`roaman_core::error::BookingError`] onto HTTP through [`AppError`].
//!
//! # Request Flow
//!
//! 1. **Correlation id** assigned by [`middleware::correlation_id_layer`]
//! 2. **Caller** derived from the role headers by [`extractors::Caller`]
//! 3. **Engine call** inside one store transaction
//! 4. **Notification** published after commit
//! 5. **Response** serialized, errors as [`error::ErrorResponse`]
//!
//! # Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/health` | liveness |
//! | GET | `/health/ready` | readiness (store ping) |
//! | GET | `/metrics` | Prometheus text |
//! | POST | `/api/bookings` | reserve |
//! | GET | `/api/bookings/:reference` | lookup |
//! | GET | `/api/hotels/:hotel` | hotel and room types by slug |
//! | GET | `/api/hotels/:hotel/rooms` | available rooms by slug |
//! | GET | `/api/hotels/:hotel/availability` | count and list by status |
//! | GET | `/api/hotels/:hotel/status-summary` | counts for every status |
//! | GET | `/api/hotel/bookings` | list bookings (staff) |
//! | GET | `/api/hotel/bookings/:id` | one booking (staff) |
//! | POST | `/api/hotel/bookings/:id/check-in` | check in (staff) |
//! | POST | `/api/hotel/bookings/:id/check-out` | check out (staff) |
//! | POST | `/api/hotel/bookings/:id/cancel` | cancel (staff) |
//! | PUT | `/api/hotel/rooms/:id/status` | set room status (staff) |
//! | GET | `/api/ws?topic=` | live availability |
//!
//! # Example
//!
//! ```ignore
//! use roaman_web::{AppState, router};
//!
//! let state = AppState::new(engine, store).with_metrics(metrics.handle().cloned());
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router(state)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post, put},
};
use handlers::{bookings, health, metrics, rooms, websocket};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use extractors::{
    Caller, CorrelationId, HOTEL_HEADER, ROLE_HEADER, ValidJson, ValidPath, ValidQuery,
};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use state::{AppState, ReadinessConfig};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the application router with every route and layer.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/:reference", get(bookings::get_by_reference))
        .route("/hotels/:hotel", get(rooms::hotel_details))
        .route("/hotels/:hotel/rooms", get(rooms::available_rooms))
        .route("/hotels/:hotel/availability", get(rooms::hotel_availability))
        .route("/hotels/:hotel/status-summary", get(rooms::status_summary))
        .route("/hotel/bookings", get(bookings::list_bookings))
        .route("/hotel/bookings/:id", get(bookings::get_booking))
        .route("/hotel/bookings/:id/check-in", post(bookings::check_in))
        .route("/hotel/bookings/:id/check-out", post(bookings::check_out))
        .route("/hotel/bookings/:id/cancel", post(bookings::cancel))
        .route("/hotel/rooms/:id/status", put(rooms::update_room_status))
        .route("/ws", get(websocket::subscribe));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/metrics", get(metrics::render))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
