use crate::config::ReconciliationConfig;
use crate::payments::types::{PaymentRecord, PaymentStatus};
use crate::services::payment_lifecycle::{LifecycleError, PaymentLifecycleService};
use crate::services::reconciliation::{PollOutcome, ReconciliationService};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ReconciliationWorkerConfig {
    /// How often the worker wakes up to poll the gateway.
    pub poll_interval: Duration,
    /// Maximum number of open orders polled per cycle, oldest first.
    pub batch_size: usize,
}

impl Default for ReconciliationWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 50,
        }
    }
}

impl From<&ReconciliationConfig> for ReconciliationWorkerConfig {
    fn from(config: &ReconciliationConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.interval_seconds.max(1)),
            batch_size: config.batch_size.max(1),
        }
    }
}

/// Counts for one polling cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub polled: usize,
    pub applied: usize,
    pub unchanged: usize,
    pub pending: usize,
    pub abandoned: usize,
    pub failed: usize,
}

/// Periodically asks the gateway about orders nobody has settled yet, so a
/// lost webhook does not leave a paid donation waiting forever.
pub struct ReconciliationWorker {
    lifecycle: Arc<PaymentLifecycleService>,
    reconciliation: Arc<ReconciliationService>,
    config: ReconciliationWorkerConfig,
}

impl ReconciliationWorker {
    pub fn new(
        lifecycle: Arc<PaymentLifecycleService>,
        reconciliation: Arc<ReconciliationService>,
        config: ReconciliationWorkerConfig,
    ) -> Self {
        Self {
            lifecycle,
            reconciliation,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "gateway reconciliation worker started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("gateway reconciliation worker stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(summary) if summary.polled > 0 => {
                            info!(
                                polled = summary.polled,
                                applied = summary.applied,
                                pending = summary.pending,
                                abandoned = summary.abandoned,
                                failed = summary.failed,
                                "reconciliation cycle finished"
                            );
                        }
                        Ok(_) => debug!("reconciliation cycle found nothing to poll"),
                        Err(e) => warn!(error = %e, "reconciliation cycle failed"),
                    }
                }
            }
        }

        info!("gateway reconciliation worker stopped");
    }

    /// Open orders worth asking about: not settled and, if still waiting for
    /// the donor, not past their window.
    async fn candidates(&self) -> Result<Vec<PaymentRecord>, LifecycleError> {
        let now = Utc::now();
        let mut open = self.lifecycle.list(Some(PaymentStatus::Created)).await?;
        open.extend(
            self.lifecycle
                .list(Some(PaymentStatus::AwaitingReview))
                .await?,
        );
        open.retain(|r| !r.is_expired_at(now));
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        open.truncate(self.config.batch_size);
        Ok(open)
    }

    pub async fn run_cycle(&self) -> Result<CycleSummary, LifecycleError> {
        let mut summary = CycleSummary::default();
        if !self.reconciliation.has_gateway() {
            return Ok(summary);
        }

        for record in self.candidates().await? {
            summary.polled += 1;
            // One bad order must not stop the rest of the batch.
            match self.reconciliation.poll(&record.order_id).await {
                Ok(PollOutcome::Applied { record }) => {
                    info!(
                        order_id = %record.order_id,
                        status = %record.status,
                        "reconciled from gateway status"
                    );
                    summary.applied += 1;
                }
                Ok(PollOutcome::Unchanged { .. }) => summary.unchanged += 1,
                Ok(PollOutcome::Pending { .. }) => summary.pending += 1,
                Ok(PollOutcome::Abandoned { .. }) => summary.abandoned += 1,
                Err(e) => {
                    warn!(order_id = %record.order_id, error = %e, "gateway status poll failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}
