//! Property-based testing strategies.
//!
//! Windows are generated on an hourly grid inside a small horizon so that
//! random requests collide often enough to exercise the overlap rules.

use crate::fixtures::{FIXTURE_EPOCH, at};
use chrono::Duration;
use proptest::prelude::*;
use roaman_core::types::StayWindow;

/// Hours covered by generated windows, starting at the fixture epoch.
pub const HORIZON_HOURS: i64 = 96;

/// A valid stay window of 1 to 48 hours starting within the horizon.
pub fn stay_window() -> impl Strategy<Value = StayWindow> {
    (0..HORIZON_HOURS, 1..=48_i64).prop_filter_map("window must be ordered", |(start, len)| {
        let check_in = at(FIXTURE_EPOCH) + Duration::hours(start);
        StayWindow::new(check_in, check_in + Duration::hours(len))
    })
}

/// A sequence of `(room index, window)` requests over `rooms` rooms.
pub fn requests(
    rooms: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<(usize, StayWindow)>> {
    prop::collection::vec((0..rooms.max(1), stay_window()), 1..=max_len)
}
