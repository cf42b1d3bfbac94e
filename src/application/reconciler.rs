use crate::config::EngineConfig;
use crate::domain::gateway::GatewayOutcome;
use crate::domain::ports::{GatewayAdapterRef, LedgerStoreRef, ReconciliationQueueRef};
use crate::domain::reconciliation::{ReconciliationEntry, RequiredAction};
use crate::domain::transaction::{Settlement, TransactionId, TransactionStatus};
use crate::error::{PaymentError, Result};
use chrono::{TimeDelta, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ledger rows re-queued by the sweep.
    pub recovered: usize,
    pub resolved: usize,
    pub retried: usize,
    pub remaining: usize,
}

/// Background worker that settles transactions the synchronous path could not.
///
/// For each queued entry it determines the terminal outcome (from the entry
/// itself for compensation and recorded acceptances, from the gateway
/// otherwise) and retries `LedgerStore::finalize` until it sticks, then
/// removes the entry. Each pass first sweeps the ledger for stale unresolved
/// rows that never made it onto the queue.
pub struct Reconciler {
    ledger: LedgerStoreRef,
    gateway: GatewayAdapterRef,
    queue: ReconciliationQueueRef,
    batch: usize,
    interval: Duration,
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(
        ledger: LedgerStoreRef,
        gateway: GatewayAdapterRef,
        queue: ReconciliationQueueRef,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ledger,
            gateway,
            queue,
            batch: config.reconcile_batch,
            interval: config.reconcile_interval,
            stale_after: config.stale_after,
        }
    }

    /// Sweeps the ledger, then processes up to one batch of queued entries.
    ///
    /// Per-entry queue failures are logged and left for the next pass.
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport {
            recovered: self.sweep().await?,
            ..ReconcileReport::default()
        };

        for entry in self.queue.pending(self.batch).await? {
            let id = entry.transaction_id;
            match self.reconcile(&entry).await {
                Ok(status) => {
                    if let Err(e) = self.queue.remove(id).await {
                        error!(
                            transaction_id = %id,
                            error = %e,
                            "Reconciled but could not remove queue entry"
                        );
                        continue;
                    }
                    report.resolved += 1;
                    info!(
                        transaction_id = %id,
                        action = %entry.action,
                        status = %status,
                        attempts = entry.attempts + 1,
                        "Reconciled transaction"
                    );
                }
                Err(PaymentError::TransactionNotFound(_)) => {
                    error!(
                        transaction_id = %id,
                        action = %entry.action,
                        "Dropping reconciliation entry for unknown transaction"
                    );
                    if let Err(e) = self.queue.remove(id).await {
                        error!(transaction_id = %id, error = %e, "Could not drop queue entry");
                    }
                }
                Err(e) => {
                    report.retried += 1;
                    warn!(
                        transaction_id = %id,
                        action = %entry.action,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Reconciliation attempt failed, will retry"
                    );
                    if let Err(record_err) = self.queue.record_attempt(id, &e.to_string()).await {
                        error!(
                            transaction_id = %id,
                            error = %record_err,
                            "Could not record reconciliation attempt"
                        );
                    }
                }
            }
        }

        report.remaining = self.queue.pending(usize::MAX).await?.len();
        Ok(report)
    }

    /// Runs passes until the queue is empty or `max_passes` is reached.
    pub async fn drain(&self, max_passes: usize) -> Result<ReconcileReport> {
        let mut total = ReconcileReport::default();
        for _ in 0..max_passes {
            let report = self.run_once().await?;
            total.recovered += report.recovered;
            total.resolved += report.resolved;
            total.retried += report.retried;
            total.remaining = report.remaining;
            if report.remaining == 0 {
                break;
            }
        }
        Ok(total)
    }

    /// Loops on the configured interval until `shutdown` flips to `true` or
    /// its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(interval = ?self.interval, batch = self.batch, "Reconciler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) if report.resolved + report.retried + report.recovered > 0 => {
                            info!(
                                recovered = report.recovered,
                                resolved = report.resolved,
                                retried = report.retried,
                                remaining = report.remaining,
                                "Reconciliation pass complete"
                            );
                        }
                        Ok(_) => debug!("Reconciliation queue empty"),
                        Err(e) => error!(error = %e, "Reconciliation pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reconciler stopped");
    }

    /// Queues stale PENDING and RECONCILING rows that have no entry, which
    /// happens when the orchestrator's hand-off write failed.
    async fn sweep(&self) -> Result<usize> {
        let Some(cutoff) = TimeDelta::from_std(self.stale_after)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };

        let stale = self.ledger.unresolved(cutoff, self.batch).await?;
        if stale.is_empty() {
            return Ok(0);
        }
        let queued: HashSet<TransactionId> = self
            .queue
            .pending(usize::MAX)
            .await?
            .into_iter()
            .map(|entry| entry.transaction_id)
            .collect();

        let mut recovered = 0;
        for tx in stale.into_iter().filter(|tx| !queued.contains(&tx.id)) {
            let entry = match tx.status {
                TransactionStatus::Reconciling => ReconciliationEntry::new(
                    tx.id,
                    RequiredAction::Compensate,
                    "credit-back owed after gateway rejection",
                ),
                _ => ReconciliationEntry::new(
                    tx.id,
                    RequiredAction::QueryGateway,
                    "stale pending transaction",
                ),
            };
            warn!(
                transaction_id = %tx.id,
                user_id = tx.user_id,
                status = %tx.status,
                action = %entry.action,
                "Recovered unresolved transaction missing from the queue"
            );
            self.queue.enqueue(entry).await?;
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn reconcile(&self, entry: &ReconciliationEntry) -> Result<TransactionStatus> {
        let id = entry.transaction_id;
        let settlement = match (entry.action, &entry.provider_reference) {
            (RequiredAction::Compensate, _) => Settlement::Failed {
                reason: entry.reason.clone(),
            },
            (RequiredAction::ConfirmSettlement, Some(provider_reference)) => {
                Settlement::Succeeded {
                    provider_reference: provider_reference.clone(),
                }
            }
            (RequiredAction::ConfirmSettlement, None) => match self.gateway.query(id).await {
                GatewayOutcome::Accepted { provider_reference } => {
                    Settlement::Succeeded { provider_reference }
                }
                // The charge was accepted once; never reverse it on a later answer.
                GatewayOutcome::Rejected { reason } | GatewayOutcome::Indeterminate { reason } => {
                    return Err(PaymentError::GatewayIndeterminate {
                        transaction_id: id,
                        reason,
                    });
                }
            },
            (RequiredAction::QueryGateway, _) => match self.gateway.query(id).await {
                GatewayOutcome::Accepted { provider_reference } => {
                    Settlement::Succeeded { provider_reference }
                }
                GatewayOutcome::Rejected { reason } => Settlement::Failed { reason },
                GatewayOutcome::Indeterminate { reason } => {
                    return Err(PaymentError::GatewayIndeterminate {
                        transaction_id: id,
                        reason,
                    });
                }
            },
        };

        match self.ledger.finalize(id, settlement).await {
            Ok(tx) => Ok(tx.status),
            // Someone else finished it; the credit-back was applied at most once.
            Err(PaymentError::AlreadyFinalized { status, .. }) => Ok(status),
            Err(e) => Err(e),
        }
    }
}
