//! Application state shared by every handler.

use metrics_exporter_prometheus::PrometheusHandle;
use roaman_core::store::BookingStore;
use roaman_runtime::ReservationEngine;
use std::sync::Arc;
use std::time::Duration;

/// Readiness check thresholds.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessConfig {
    /// A store ping slower than this fails the check
    pub timeout: Duration,
    /// A store ping slower than this reports `degraded`
    pub degraded_after: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            degraded_after: Duration::from_millis(500),
        }
    }
}

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Reservation engine; its notifier serves the availability endpoints
    pub engine: Arc<ReservationEngine>,
    /// Store pinged by the readiness check
    pub store: Arc<dyn BookingStore>,
    /// Prometheus handle rendered at `/metrics`, if a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Readiness check thresholds
    pub readiness: ReadinessConfig,
}

impl AppState {
    /// Create a state without a metrics handle.
    #[must_use]
    pub fn new(engine: Arc<ReservationEngine>, store: Arc<dyn BookingStore>) -> Self {
        Self {
            engine,
            store,
            metrics: None,
            readiness: ReadinessConfig::default(),
        }
    }

    /// Serve `handle` at `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// Override the readiness thresholds.
    #[must_use]
    pub fn with_readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.readiness = readiness;
        self
    }
}
