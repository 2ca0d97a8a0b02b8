//! Health checks for readiness.

use roaman_core::store::BookingStore;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Health check status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but slow
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

/// Health check result for one component
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Check latency in milliseconds
    pub latency_ms: u64,
}

impl HealthCheck {
    fn new(component: &str, status: HealthStatus, message: Option<String>, latency: Duration) -> Self {
        Self {
            component: component.to_string(),
            status,
            message,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Aggregated health report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall status (worst of all checks)
    pub status: HealthStatus,

    /// Individual component checks
    pub checks: Vec<HealthCheck>,

    /// Timestamp when the report was generated
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// Combine checks into a report.
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Check if overall system is healthy
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

/// Ping the store; slower than `degraded_after` is degraded, errors or
/// exceeding `timeout` are unhealthy.
pub async fn check_store(
    store: &dyn BookingStore,
    timeout: Duration,
    degraded_after: Duration,
) -> HealthCheck {
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, store.ping()).await;
    let latency = started.elapsed();

    match outcome {
        Ok(Ok(())) if latency > degraded_after => HealthCheck::new(
            "database",
            HealthStatus::Degraded,
            Some(format!("ping took {}ms", latency.as_millis())),
            latency,
        ),
        Ok(Ok(())) => HealthCheck::new("database", HealthStatus::Healthy, None, latency),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "Database health check failed");
            HealthCheck::new("database", HealthStatus::Unhealthy, Some(err.to_string()), latency)
        }
        Err(_) => HealthCheck::new(
            "database",
            HealthStatus::Unhealthy,
            Some(format!("no response within {}ms", timeout.as_millis())),
            latency,
        ),
    }
}
