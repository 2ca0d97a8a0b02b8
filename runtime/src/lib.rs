//! # Roaman Runtime
//!
//! The reservation and notification core of the Roaman marketplace.
//!
//! ## Core Components
//!
//! - **[`ReservationEngine`]**: atomic `reserve` plus the check-in, check-out,
//!   cancel and direct room-status transitions, all serialized per room
//! - **[`AvailabilityNotifier`]**: publishes committed room and booking changes
//!   and serves reconnecting, coalescing [`Subscription`]s
//! - **[`AutoReleaseSweeper`]**: optional periodic cancellation of no-shows
//!
//! Storage and transport are injected as trait objects from `roaman-core`, so the
//! same engine runs against `PostgreSQL` in production and in-memory fakes in
//! tests.
//!
//! ## Example
//!
//! ```ignore
//! use roaman_runtime::{AvailabilityNotifier, EngineConfig, NotifierConfig, ReservationEngine};
//!
//! let notifier = AvailabilityNotifier::new(bus, store.clone(), NotifierConfig::default());
//! let engine = ReservationEngine::new(store, notifier, clock, EngineConfig::default());
//!
//! let booking = engine.reserve(request).await?;
//! println!("booked {}", booking.booking_reference);
//! ```

/// Reservation engine: reserve and lifecycle transitions
pub mod engine;

/// Health checks for readiness
pub mod health;

/// Prometheus metrics for observability
pub mod metrics;

/// Availability notifier and subscriptions
pub mod notifier;

/// Retry logic with exponential backoff
pub mod retry;

/// Auto-release sweep for no-show bookings
pub mod sweeper;

pub use engine::{EngineConfig, HotelDetails, ReservationEngine, ReservationRequest};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use notifier::{AvailabilityNotifier, NotifierConfig, Subscription};
pub use retry::RetryPolicy;
pub use sweeper::{AutoReleaseSweeper, SweepReport, SweeperConfig};
