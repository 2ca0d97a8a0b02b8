//! # Roaman Core
//!
//! Domain types and contracts for the Roaman hotel booking marketplace.
//!
//! This crate contains no I/O. It defines what the reservation engine and the
//! availability notifier operate on, and the traits storage and transport
//! adapters implement.
//!
//! ## Modules
//!
//! - [`types`]: identifiers, entities and status enums
//! - [`reference`]: `ROM-XXXXXXXX` booking references
//! - [`error`]: the [`BookingError`](error::BookingError) taxonomy
//! - [`auth`]: pre-authenticated [`Principal`](auth::Principal)s
//! - [`store`]: [`BookingStore`](store::BookingStore) and
//!   [`ReservationTx`](store::ReservationTx)
//! - [`availability`]: feed payloads, topics and
//!   [`AvailabilityBus`](availability::AvailabilityBus)
//! - [`environment`]: injected [`Clock`](environment::Clock) and
//!   [`ReferenceSource`](environment::ReferenceSource)
//!
//! ## The invariant
//!
//! For any room, bookings in `pending`, `confirmed` or `checked_in` have pairwise
//! disjoint `[check_in, check_out)` windows, including under concurrent
//! reservation attempts. The storage contract makes the room row the single
//! serialization point for that guarantee.
//!
//! ## Example
//!
//! ```ignore
//! use roaman_core::types::StayWindow;
//!
//! let a = StayWindow::new(day1_14h, day2_14h).unwrap();
//! let b = StayWindow::new(day2_14h, day3_14h).unwrap();
//! assert!(!a.overlaps(&b)); // back-to-back stays share no instant
//! ```

pub use chrono::{DateTime, Utc};

pub mod auth;
pub mod availability;
pub mod error;
pub mod reference;
pub mod store;
pub mod types;

/// Environment module - dependencies injected into the runtime
///
/// Time and reference generation are abstracted so that lifecycle timestamps,
/// the auto-release cutoff and reference collisions are deterministic in tests.
pub mod environment {
    use crate::reference::BookingReference;
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production
    /// let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    ///
    /// // Test - see roaman_testing::FixedClock
    /// let clock: Arc<dyn Clock> = Arc::new(test_clock());
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of candidate booking references.
    ///
    /// Candidates need not be unique; the engine draws again when the store
    /// reports a collision.
    pub trait ReferenceSource: Send + Sync {
        /// Draw the next candidate.
        fn next_reference(&self) -> BookingReference;
    }

    /// Uniformly random references from the thread-local RNG.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct RandomReferences;

    impl ReferenceSource for RandomReferences {
        fn next_reference(&self) -> BookingReference {
            BookingReference::generate(&mut rand::thread_rng())
        }
    }
}

pub use auth::{Principal, Role};
pub use availability::{
    AvailabilityBus, BookingUpdate, BusError, ConnectionState, Notification, NotificationStream,
    RoomUpdate, Topic,
};
pub use error::{BookingError, FieldError, StoreError};
pub use reference::BookingReference;
pub use store::{BookingStore, ReservationTx, TxOptions};
