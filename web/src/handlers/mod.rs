//! HTTP request handlers, one module per resource.

pub mod bookings;
pub mod health;
pub mod metrics;
pub mod rooms;
pub mod websocket;

pub use health::{health_check, readiness_check};
