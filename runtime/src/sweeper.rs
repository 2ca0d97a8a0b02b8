//! Auto-release of no-show bookings.
//!
//! A `pending` or `confirmed` booking whose guest has not checked in within a
//! grace period after `check_in` is cancelled, freeing the room for new
//! reservations. The sweep goes through [`ReservationEngine::cancel`] with the
//! system principal, so it takes the same room lock as every other write and
//! publishes the same notifications.

use crate::engine::ReservationEngine;
use crate::metrics::SweeperMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use roaman_core::auth::Principal;
use roaman_core::error::BookingError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Sweeper settings.
#[derive(Clone, Debug, PartialEq)]
pub struct SweeperConfig {
    /// Time after `check_in` before an un-arrived booking is released
    pub grace: Duration,
    /// Pause between sweeps
    pub interval: Duration,
    /// Maximum bookings released per sweep
    pub batch_size: u32,
    /// Retry policy for cancellations that hit a lock timeout
    pub retry: RetryPolicy,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(2 * 60 * 60),
            interval: Duration::from_secs(300),
            batch_size: 100,
            retry: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(200))
                .build(),
        }
    }
}

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale bookings found
    pub examined: usize,
    /// Bookings cancelled
    pub released: usize,
    /// Bookings that changed status concurrently (e.g. checked in)
    pub skipped: usize,
    /// Bookings whose cancellation failed
    pub failed: usize,
}

/// Periodically cancels bookings whose guests never arrived.
pub struct AutoReleaseSweeper {
    engine: Arc<ReservationEngine>,
    config: SweeperConfig,
    principal: Principal,
}

impl AutoReleaseSweeper {
    /// Create a sweeper acting through `engine`.
    #[must_use]
    pub const fn new(engine: Arc<ReservationEngine>, config: SweeperConfig) -> Self {
        Self {
            engine,
            config,
            principal: Principal::system(),
        }
    }

    /// Run one sweep.
    ///
    /// Individual cancellation failures are counted in the report, not returned.
    ///
    /// # Errors
    ///
    /// [`BookingError::Internal`] if the stale-booking query fails.
    pub async fn sweep_once(&self) -> Result<SweepReport, BookingError> {
        let grace = chrono::Duration::from_std(self.config.grace)
            .map_err(|e| BookingError::Internal(format!("invalid grace period: {e}")))?;
        let cutoff = self.engine.clock().now() - grace;

        let stale = self
            .engine
            .store()
            .find_stale_bookings(cutoff, self.config.batch_size)
            .await?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };

        for booking in stale {
            let result = retry_with_predicate(
                self.config.retry.clone(),
                || self.engine.cancel(&self.principal, booking.id),
                BookingError::is_retryable,
            )
            .await;

            match result {
                Ok(_) => {
                    report.released += 1;
                    tracing::info!(
                        booking_id = %booking.id,
                        booking_reference = %booking.booking_reference,
                        check_in = %booking.window.check_in,
                        "Auto-released booking"
                    );
                }
                Err(BookingError::InvalidState { current, .. }) => {
                    report.skipped += 1;
                    tracing::debug!(
                        booking_id = %booking.id,
                        current = %current,
                        "Booking changed before release"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(booking_id = %booking.id, error = %err, "Auto-release failed");
                }
            }
        }

        SweeperMetrics::record_cancelled(report.released as u64);
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` resolves.
    pub async fn run<S>(self, shutdown: S)
    where
        S: Future<Output = ()> + Send,
    {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            grace_secs = self.config.grace.as_secs(),
            "Auto-release sweeper started"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => match self.sweep_once().await {
                    Ok(report) if report.examined > 0 => {
                        tracing::info!(
                            examined = report.examined,
                            released = report.released,
                            skipped = report.skipped,
                            failed = report.failed,
                            "Auto-release sweep finished"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = %err, "Auto-release sweep failed"),
                },
            }
        }

        tracing::info!("Auto-release sweeper stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn<S>(self, shutdown: S) -> JoinHandle<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(shutdown))
    }
}
