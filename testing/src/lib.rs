//! # Roaman Testing
//!
//! Test doubles for the Roaman reservation core.
//!
//! This crate provides:
//! - [`InMemoryBookingStore`]: a store with real per-room locks and
//!   transactional staging
//! - [`InMemoryBus`]: a broadcast availability transport that can lag and drop
//! - [`FixedClock`]: deterministic, adjustable time
//! - [`ScriptedReferences`]: booking references that collide on demand
//! - [`fixtures`]: hotel, room and booking builders
//! - [`strategies`]: proptest generators for stay windows
//!
//! ## Example
//!
//! ```ignore
//! use roaman_testing::{fixtures, test_clock, InMemoryBookingStore, InMemoryBus};
//!
//! #[tokio::test]
//! async fn test_reserve() {
//!     let store = InMemoryBookingStore::new();
//!     let seeded = fixtures::seed_hotel(&store, "harbor-view", 3);
//!     let engine = build_engine(store, InMemoryBus::new(), test_clock());
//!
//!     let booking = engine.reserve(request_for(&seeded.rooms[0])).await.unwrap();
//!     assert_eq!(booking.booking_status, BookingStatus::Confirmed);
//! }
//! ```

use chrono::{DateTime, Utc};
use roaman_core::environment::Clock;

/// In-memory availability transport
pub mod bus;

/// Fixture builders
pub mod fixtures;

/// In-memory booking store
pub mod store;

/// Proptest strategies for stay windows
pub mod strategies;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use roaman_core::environment::{RandomReferences, ReferenceSource};
    use roaman_core::reference::BookingReference;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, PoisonError, RwLock};

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and advance
    /// the clock the engine sees.
    ///
    /// # Example
    ///
    /// ```
    /// use roaman_testing::mocks::FixedClock;
    /// use roaman_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let before = clock.now();
    /// assert_eq!(before, clock.now());
    ///
    /// clock.advance(Duration::hours(3));
    /// assert_eq!(clock.now() - before, Duration::hours(3));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a clock stopped at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move forward by `by`.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Reference source that hands out a fixed script.
    ///
    /// The last reference repeats once the script runs out, so a one-element
    /// script collides forever. An empty script draws random references.
    ///
    /// # Example
    ///
    /// ```
    /// use roaman_testing::mocks::ScriptedReferences;
    /// use roaman_core::environment::ReferenceSource;
    /// use roaman_core::reference::BookingReference;
    ///
    /// let a = BookingReference::parse("ROM-AAAA0001").unwrap();
    /// let b = BookingReference::parse("ROM-BBBB0002").unwrap();
    /// let references = ScriptedReferences::new([a.clone(), b.clone()]);
    ///
    /// assert_eq!(references.next_reference(), a);
    /// assert_eq!(references.next_reference(), b);
    /// assert_eq!(references.next_reference(), b);
    /// assert_eq!(references.drawn(), 3);
    /// ```
    #[derive(Debug, Clone)]
    pub struct ScriptedReferences {
        script: Arc<Mutex<Script>>,
    }

    #[derive(Debug)]
    struct Script {
        queue: VecDeque<BookingReference>,
        last: Option<BookingReference>,
        drawn: usize,
    }

    impl ScriptedReferences {
        /// Script the given references in order.
        #[must_use]
        pub fn new(script: impl IntoIterator<Item = BookingReference>) -> Self {
            let queue: VecDeque<_> = script.into_iter().collect();
            let last = queue.back().cloned();
            Self {
                script: Arc::new(Mutex::new(Script {
                    queue,
                    last,
                    drawn: 0,
                })),
            }
        }

        /// Number of references handed out so far.
        #[must_use]
        pub fn drawn(&self) -> usize {
            self.script.lock().unwrap_or_else(PoisonError::into_inner).drawn
        }
    }

    impl ReferenceSource for ScriptedReferences {
        fn next_reference(&self) -> BookingReference {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            script.drawn += 1;
            match script.queue.pop_front() {
                Some(reference) => reference,
                None => script
                    .last
                    .clone()
                    .unwrap_or_else(|| RandomReferences.next_reference()),
            }
        }
    }

    /// A [`FixedClock`] at 2025-01-01T00:00:00Z, the fixture epoch.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(crate::fixtures::at(crate::fixtures::FIXTURE_EPOCH))
    }
}

// Re-export commonly used items
pub use bus::InMemoryBus;
pub use mocks::{FixedClock, ScriptedReferences, test_clock};
pub use store::InMemoryBookingStore;
