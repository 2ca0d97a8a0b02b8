//! Property tests for the per-room non-overlap invariant.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use common::{Harness, request};
use proptest::prelude::*;
use roaman_core::error::BookingError;
use roaman_core::types::{Booking, StayWindow};
use roaman_testing::strategies;

#[derive(Clone, Debug)]
enum Op {
    Reserve(usize, StayWindow),
    Cancel(usize),
    Stay(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..3_usize, strategies::stay_window()).prop_map(|(r, w)| Op::Reserve(r, w)),
        1 => any::<usize>().prop_map(Op::Cancel),
        1 => any::<usize>().prop_map(Op::Stay),
    ]
}

fn assert_disjoint(bookings: &[Booking]) {
    let active: Vec<_> = bookings
        .iter()
        .filter(|b| b.booking_status.holds_room())
        .collect();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            assert!(
                !a.window.overlaps(&b.window),
                "{} and {} overlap",
                a.booking_reference,
                b.booking_reference
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_active_bookings_never_overlap(ops in prop::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let h = Harness::new(3);
            let staff = h.staff();
            let mut made: Vec<Booking> = Vec::new();

            for op in ops {
                match op {
                    Op::Reserve(room, window) => {
                        match h.engine.reserve(request(h.room(room), window, made.len())).await {
                            Ok(booking) => made.push(booking),
                            Err(BookingError::Conflict { .. }) => {}
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                    // Cancel or run a full stay on some earlier booking; illegal
                    // transitions are expected and ignored.
                    Op::Cancel(pick) if !made.is_empty() => {
                        let id = made[pick % made.len()].id;
                        let _ = h.engine.cancel(&staff, id).await;
                    }
                    Op::Stay(pick) if !made.is_empty() => {
                        let id = made[pick % made.len()].id;
                        let _ = h.engine.check_in(&staff, id).await;
                        let _ = h.engine.check_out(&staff, id).await;
                    }
                    Op::Cancel(_) | Op::Stay(_) => {}
                }
            }

            for room in &h.hotel.rooms {
                assert_disjoint(&h.store.bookings_for_room(room.id));
            }
        });
    }

    #[test]
    fn prop_reserve_succeeds_iff_window_is_free(
        requests in strategies::requests(2, 25),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let h = Harness::new(2);
            let mut accepted: Vec<(usize, StayWindow)> = Vec::new();

            for (n, (room, window)) in requests.into_iter().enumerate() {
                let free = !accepted
                    .iter()
                    .any(|(r, w)| *r == room && w.overlaps(&window));
                let result = h.engine.reserve(request(h.room(room), window, n)).await;
                assert_eq!(result.is_ok(), free, "room {room} window {window:?}");
                if free {
                    accepted.push((room, window));
                }
            }
        });
    }
}
