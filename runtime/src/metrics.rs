//! Prometheus metrics for reservations, lifecycle transitions and the
//! availability feed.
//!
//! Recording goes through the `metrics` facade, so it is a no-op until
//! [`MetricsServer::start`] installs the Prometheus recorder. The web layer
//! renders the installed handle at `GET /metrics`.
//!
//! # Example
//!
//! ```rust,ignore
//! use roaman_runtime::metrics::MetricsServer;
//!
//! let mut metrics = MetricsServer::new("0.0.0.0:9090".parse()?);
//! metrics.start()?;
//! let handle = metrics.handle().cloned();
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use roaman_core::types::{BookingStatus, RoomStatus};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create an uninstalled metrics server for `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should be bound to.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe all metrics and install the global Prometheus recorder.
    ///
    /// A second installation in the same process (common in tests) logs a
    /// warning and leaves [`handle`](Self::handle) empty.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .and_then(|b| {
                b.set_buckets_for_metric(
                    Matcher::Full("reservation_lock_wait_seconds".to_string()),
                    &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 3.0, 5.0],
                )
            })
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Handle used to render the scrape payload.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "reservations_total",
        "Reservation attempts by outcome (confirmed, conflict, timeout, invalid, error)"
    );
    describe_histogram!(
        "reservation_duration_seconds",
        "End-to-end duration of reserve calls"
    );
    describe_histogram!(
        "reservation_lock_wait_seconds",
        "Time spent waiting for the room row lock"
    );
    describe_counter!(
        "booking_transitions_total",
        "Committed booking lifecycle transitions"
    );
    describe_counter!(
        "room_status_changes_total",
        "Committed room status changes by new status"
    );

    describe_counter!(
        "notifier_published_total",
        "Notifications handed to the transport"
    );
    describe_counter!(
        "notifier_publish_errors_total",
        "Notifications the transport rejected"
    );
    describe_counter!(
        "notifier_reconnects_total",
        "Subscription reconnect attempts"
    );
    describe_counter!(
        "notifier_coalesced_total",
        "Buffered notifications superseded before delivery"
    );
    describe_counter!(
        "notifier_stale_dropped_total",
        "Notifications older than the state already delivered"
    );
    describe_gauge!(
        "notifier_active_subscriptions",
        "Open availability subscriptions"
    );

    describe_counter!(
        "auto_release_cancelled_total",
        "Bookings cancelled by the auto-release sweep"
    );
}

/// Reservation engine metrics recorder.
pub struct ReservationMetrics;

impl ReservationMetrics {
    /// Record a finished reserve call.
    pub fn record_reserve(outcome: &'static str, duration: Duration) {
        counter!("reservations_total", "outcome" => outcome).increment(1);
        histogram!("reservation_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record time spent acquiring a room lock.
    pub fn record_lock_wait(duration: Duration) {
        histogram!("reservation_lock_wait_seconds").record(duration.as_secs_f64());
    }

    /// Record a committed booking transition.
    pub fn record_transition(to: BookingStatus) {
        counter!("booking_transitions_total", "transition" => to.as_str()).increment(1);
    }

    /// Record a committed room status change.
    pub fn record_room_status(status: RoomStatus) {
        counter!("room_status_changes_total", "status" => status.as_str()).increment(1);
    }
}

/// Availability notifier metrics recorder.
pub struct NotifierMetrics;

impl NotifierMetrics {
    /// Record a successful publish.
    pub fn record_publish() {
        counter!("notifier_published_total").increment(1);
    }

    /// Record a failed publish.
    pub fn record_publish_error() {
        counter!("notifier_publish_errors_total").increment(1);
    }

    /// Record a reconnect attempt.
    pub fn record_reconnect() {
        counter!("notifier_reconnects_total").increment(1);
    }

    /// Record a buffered notification replaced by a newer one.
    pub fn record_coalesced() {
        counter!("notifier_coalesced_total").increment(1);
    }

    /// Record a notification dropped as older than one already delivered.
    pub fn record_stale_dropped() {
        counter!("notifier_stale_dropped_total").increment(1);
    }

    /// Record a subscription opening.
    pub fn subscription_opened() {
        gauge!("notifier_active_subscriptions").increment(1.0);
    }

    /// Record a subscription closing.
    pub fn subscription_closed() {
        gauge!("notifier_active_subscriptions").decrement(1.0);
    }
}

/// Auto-release sweep metrics recorder.
pub struct SweeperMetrics;

impl SweeperMetrics {
    /// Record bookings released by one sweep.
    pub fn record_cancelled(count: u64) {
        counter!("auto_release_cancelled_total").increment(count);
    }
}
