use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{parse_or, ConfigError};
use crate::database::error::DatabaseError;
use crate::database::models::{BookingStatus, Settlement, SettleOutcome};
use crate::database::repository::ReservationStore;
use crate::payments::error::PaymentError;
use crate::payments::provider::PaymentGateway;
use crate::payments::types::PaymentState;
use crate::services::settlement::{apply_settlement, SettlementSource};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures seen while reconciling. The poll loop logs these and keeps going
/// until a budget runs out; they never escape a job.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("payment gateway unreachable: {message}")]
    GatewayUnreachable { message: String },

    #[error("gateway error: {0}")]
    Gateway(PaymentError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<PaymentError> for MonitorError {
    fn from(err: PaymentError) -> Self {
        if err.is_retryable() {
            MonitorError::GatewayUnreachable {
                message: err.to_string(),
            }
        } else {
            MonitorError::Gateway(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    /// Wait before each status query.
    pub poll_interval: Duration,
    /// Status queries per booking before it is abandoned.
    pub max_attempts: u32,
    /// Consecutive failed queries tolerated before the booking is abandoned.
    pub max_network_retries: u32,
    pub max_backoff: Duration,
    /// Pending bookings re-scheduled at startup.
    pub resume_batch_size: i64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            max_attempts: 20,
            max_network_retries: 5,
            max_backoff: Duration::from_secs(600),
            resume_batch_size: 500,
        }
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            enabled: std::env::var("RECONCILE_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(defaults.enabled),
            poll_interval: Duration::from_secs(parse_or(
                "RECONCILE_POLL_INTERVAL_SECONDS",
                defaults.poll_interval.as_secs(),
            )?),
            max_attempts: parse_or("RECONCILE_MAX_ATTEMPTS", defaults.max_attempts)?,
            max_network_retries: parse_or(
                "RECONCILE_MAX_NETWORK_RETRIES",
                defaults.max_network_retries,
            )?,
            max_backoff: Duration::from_secs(parse_or(
                "RECONCILE_MAX_BACKOFF_SECONDS",
                defaults.max_backoff.as_secs(),
            )?),
            resume_batch_size: parse_or("RECONCILE_RESUME_BATCH_SIZE", defaults.resume_batch_size)?,
        })
    }
}

/// Delay before the next query after `failures` consecutive failed ones:
/// the poll interval doubled per failure, capped at `cap`.
pub fn backoff_delay(interval: Duration, failures: u32, cap: Duration) -> Duration {
    if failures == 0 {
        return interval;
    }
    let factor = 1_u32 << failures.saturating_sub(1).min(16);
    interval.saturating_mul(factor).min(cap.max(interval))
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollJob {
    pub booking_id: Uuid,
    pub transaction_reference: String,
}

/// How a poll job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// This job applied the terminal status.
    Settled(BookingStatus),
    /// Another path (usually the callback) settled first.
    AlreadySettled(BookingStatus),
    /// Late success could not re-claim the seats.
    SeatsUnavailable,
    BookingMissing,
    /// Storage refused the final write; the startup resume picks it up again.
    StorageFailed,
    Cancelled,
}

/// Drives one background status-polling job per pending booking.
#[derive(Clone)]
pub struct ReconciliationPoller {
    store: Arc<dyn ReservationStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: ReconciliationConfig,
    shutdown_rx: watch::Receiver<bool>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl ReconciliationPoller {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: ReconciliationConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
            shutdown_rx,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    pub fn is_polling(&self, booking_id: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&booking_id)
    }

    /// Spawn a poll job unless one is already running for this booking.
    pub fn schedule(&self, job: PollJob) -> Option<JoinHandle<PollOutcome>> {
        if !self.config.enabled {
            debug!(booking_id = %job.booking_id, "reconciliation disabled, not polling");
            return None;
        }

        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.booking_id);
        if !inserted {
            debug!(booking_id = %job.booking_id, "poll job already running");
            return None;
        }

        let poller = self.clone();
        Some(tokio::spawn(async move {
            let booking_id = job.booking_id;
            let outcome = poller.run_job(job).await;
            poller
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&booking_id);
            outcome
        }))
    }

    /// Re-schedule polling for bookings left pending by a previous process.
    ///
    /// A booking without a link is only picked up once it is older than one
    /// poll interval; a younger one may still be mid-initiation in the request
    /// that created it.
    pub async fn resume_pending(&self) -> Result<usize, MonitorError> {
        let grace = chrono::Duration::from_std(self.config.poll_interval)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let pending = self
            .store
            .list_resumable_pending(self.config.resume_batch_size, chrono::Utc::now() - grace)
            .await?;

        let mut scheduled = 0;
        for booking in pending {
            let job = PollJob {
                booking_id: booking.id,
                transaction_reference: booking.app_trans_id(),
            };
            if self.schedule(job).is_some() {
                scheduled += 1;
            }
        }

        info!(scheduled, "resumed reconciliation for pending bookings");
        Ok(scheduled)
    }

    /// Poll until the booking is terminal, a budget runs out, or shutdown.
    pub async fn run_job(&self, job: PollJob) -> PollOutcome {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut attempts: u32 = 0;
        let mut failures: u32 = 0;
        let mut delay = self.config.poll_interval;

        info!(
            booking_id = %job.booking_id,
            app_trans_id = %job.transaction_reference,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            max_attempts = self.config.max_attempts,
            "reconciliation job started"
        );

        loop {
            if wait_or_shutdown(delay, &mut shutdown_rx).await {
                info!(booking_id = %job.booking_id, "reconciliation job cancelled by shutdown");
                return PollOutcome::Cancelled;
            }

            match self.store.find_booking(job.booking_id).await {
                Ok(None) => return PollOutcome::BookingMissing,
                Ok(Some(booking)) if booking.status.is_terminal() => {
                    debug!(
                        booking_id = %job.booking_id,
                        status = %booking.status,
                        "booking already settled, stopping"
                    );
                    return PollOutcome::AlreadySettled(booking.status);
                }
                Ok(Some(_)) => {}
                Err(e) => warn!(booking_id = %job.booking_id, error = %e, "booking lookup failed"),
            }

            attempts += 1;
            match self.gateway.get_payment_status(&job.transaction_reference).await {
                Ok(status) => {
                    failures = 0;
                    delay = self.config.poll_interval;
                    match status.status {
                        PaymentState::Success => {
                            return self.finish(job.booking_id, Settlement::Paid).await
                        }
                        PaymentState::Failed => {
                            info!(
                                booking_id = %job.booking_id,
                                return_code = status.return_code,
                                return_message = %status.return_message,
                                "gateway reports payment failed"
                            );
                            return self.finish(job.booking_id, Settlement::Failed).await;
                        }
                        PaymentState::Pending => debug!(
                            booking_id = %job.booking_id,
                            attempt = attempts,
                            "payment still processing"
                        ),
                    }
                }
                Err(e) => {
                    let err = MonitorError::from(e);
                    failures += 1;
                    warn!(
                        booking_id = %job.booking_id,
                        attempt = attempts,
                        consecutive_failures = failures,
                        error = %err,
                        "status query failed"
                    );
                    if failures > self.config.max_network_retries {
                        warn!(booking_id = %job.booking_id, "status query retries exhausted");
                        return self.finish(job.booking_id, Settlement::Abandoned).await;
                    }
                    delay = backoff_delay(self.config.poll_interval, failures, self.config.max_backoff);
                }
            }

            if attempts >= self.config.max_attempts {
                warn!(
                    booking_id = %job.booking_id,
                    attempts,
                    "no terminal payment status within attempt budget, abandoning"
                );
                return self.finish(job.booking_id, Settlement::Abandoned).await;
            }
        }
    }

    async fn finish(&self, booking_id: Uuid, settlement: Settlement) -> PollOutcome {
        match apply_settlement(
            self.store.as_ref(),
            booking_id,
            settlement,
            SettlementSource::Poller,
        )
        .await
        {
            Ok(SettleOutcome::Applied(booking)) => PollOutcome::Settled(booking.status),
            Ok(SettleOutcome::AlreadySettled(status)) => PollOutcome::AlreadySettled(status),
            Ok(SettleOutcome::SeatsUnavailable(_)) => PollOutcome::SeatsUnavailable,
            Ok(SettleOutcome::NotFound) => PollOutcome::BookingMissing,
            Err(e) => {
                error!(booking_id = %booking_id, error = %e, "failed to settle booking");
                PollOutcome::StorageFailed
            }
        }
    }
}

/// Returns `true` if shutdown was signalled before `delay` elapsed.
async fn wait_or_shutdown(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
    }
}
