//! Health check endpoints.
//!
//! Used by load balancers and orchestrators to decide whether the instance is
//! alive and whether it should receive traffic.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use roaman_runtime::health::check_store;
use roaman_runtime::{HealthReport, HealthStatus};
use serde::Serialize;

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    /// Always `ok`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// Liveness check. Does not touch dependencies.
///
/// ```text
/// GET /health
/// {"status":"ok","version":"0.1.0"}
/// ```
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn health_check() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check: pings the booking store.
///
/// # Status Codes
///
/// - 200 OK: healthy or degraded
/// - 503 Service Unavailable: the store did not answer in time
///
/// ```text
/// GET /health/ready
/// {"status":"healthy","checks":[{"component":"database","status":"healthy","latency_ms":1}],"timestamp":"..."}
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let database = check_store(
        state.store.as_ref(),
        state.readiness.timeout,
        state.readiness.degraded_after,
    )
    .await;
    let report = HealthReport::new(vec![database]);

    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}
