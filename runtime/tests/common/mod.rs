//! Shared harness for runtime integration tests.

#![allow(dead_code)] // Each test binary uses a different subset

use roaman_core::auth::Principal;
use roaman_core::availability::AvailabilityBus;
use roaman_core::environment::ReferenceSource;
use roaman_core::types::{Room, StayType, StayWindow};
use roaman_runtime::{
    AvailabilityNotifier, EngineConfig, NotifierConfig, ReservationEngine, ReservationRequest,
};
use roaman_testing::fixtures::{self, SeededHotel};
use roaman_testing::{FixedClock, InMemoryBookingStore, InMemoryBus, ScriptedReferences, test_clock};
use std::sync::Arc;
use std::time::Duration;

/// One hotel with rooms `101..`, wired to in-memory store and bus.
pub struct Harness {
    pub store: InMemoryBookingStore,
    pub bus: InMemoryBus,
    pub clock: FixedClock,
    pub engine: Arc<ReservationEngine>,
    pub hotel: SeededHotel,
}

impl Harness {
    pub fn new(rooms: usize) -> Self {
        Self::with_config(rooms, EngineConfig::default(), InMemoryBus::new())
    }

    pub fn with_config(rooms: usize, config: EngineConfig, bus: InMemoryBus) -> Self {
        let transport: Arc<dyn AvailabilityBus> = Arc::new(bus.clone());
        Self::build(rooms, config, bus, transport, None)
    }

    /// Engine drawing booking references from `references`.
    pub fn with_references(rooms: usize, references: ScriptedReferences) -> Self {
        let bus = InMemoryBus::new();
        let transport: Arc<dyn AvailabilityBus> = Arc::new(bus.clone());
        Self::build(
            rooms,
            EngineConfig::default(),
            bus,
            transport,
            Some(Arc::new(references)),
        )
    }

    /// Engine publishing through `transport`, which wraps `bus`.
    pub fn with_transport(rooms: usize, bus: InMemoryBus, transport: Arc<dyn AvailabilityBus>) -> Self {
        Self::build(rooms, EngineConfig::default(), bus, transport, None)
    }

    fn build(
        rooms: usize,
        config: EngineConfig,
        bus: InMemoryBus,
        transport: Arc<dyn AvailabilityBus>,
        references: Option<Arc<dyn ReferenceSource>>,
    ) -> Self {
        let store = InMemoryBookingStore::new();
        let hotel = fixtures::seed_hotel(&store, "harbor-view", rooms);
        let clock = test_clock();

        let notifier = AvailabilityNotifier::new(
            transport,
            Arc::new(store.clone()),
            NotifierConfig::default()
                .with_reconnect_delays(Duration::from_millis(10), Duration::from_millis(50)),
        );
        let mut engine = ReservationEngine::new(
            Arc::new(store.clone()),
            notifier,
            Arc::new(clock.clone()),
            config,
        );
        if let Some(references) = references {
            engine = engine.with_references(references);
        }

        Self {
            store,
            bus,
            clock,
            engine: Arc::new(engine),
            hotel,
        }
    }

    pub fn room(&self, index: usize) -> &Room {
        &self.hotel.rooms[index]
    }

    pub fn staff(&self) -> Principal {
        Principal::staff(self.hotel.hotel.id)
    }
}

/// A valid request for `room` over `window` from guest `n`.
pub fn request(room: &Room, window: StayWindow, n: usize) -> ReservationRequest {
    ReservationRequest {
        room_id: room.id,
        check_in: window.check_in,
        check_out: window.check_out,
        guest: fixtures::guest(n),
        stay_type: StayType::Nightly,
        total_amount: 25_000,
        special_requests: None,
    }
}

/// 2025-02-01 14:00 to 2025-02-03 12:00.
pub fn two_nights() -> StayWindow {
    fixtures::window("2025-02-01T14:00:00Z", "2025-02-03T12:00:00Z")
}
