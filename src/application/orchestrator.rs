use crate::config::EngineConfig;
use crate::domain::gateway::{GatewayOutcome, GatewayRequest};
use crate::domain::ports::{GatewayAdapterRef, LedgerStoreRef, ReconciliationQueueRef, Reservation};
use crate::domain::reconciliation::{ReconciliationEntry, RequiredAction};
use crate::domain::transaction::{
    PaymentCommand, PublicStatus, Settlement, Transaction, TransactionId, TransactionStatus,
};
use crate::error::{PaymentError, Result};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What a caller gets back for a settled payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub transaction_id: TransactionId,
    pub status: PublicStatus,
    pub provider_reference: Option<String>,
}

/// Drives a payment from reservation to a terminal or reconciling state.
///
/// `PaymentOrchestrator` holds no mutable state of its own: balance checks and
/// status changes go through the ledger store's atomic primitives, so any
/// number of orchestrators may share one store.
pub struct PaymentOrchestrator {
    flow: SettlementFlow,
}

impl PaymentOrchestrator {
    /// Creates a new `PaymentOrchestrator` instance.
    ///
    /// # Arguments
    ///
    /// * `ledger` - The store holding wallets and transactions.
    /// * `gateway` - The settlement provider capability.
    /// * `reconciliation` - Where deferred work is handed off.
    /// * `config` - Supplies the gateway timeout.
    pub fn new(
        ledger: LedgerStoreRef,
        gateway: GatewayAdapterRef,
        reconciliation: ReconciliationQueueRef,
        config: &EngineConfig,
    ) -> Self {
        Self {
            flow: SettlementFlow {
                ledger,
                gateway,
                reconciliation,
                gateway_timeout: config.gateway_timeout,
            },
        }
    }

    /// Submits a payment.
    ///
    /// Returns a receipt only when the payment settled. Business rejections
    /// (`InsufficientFunds`, `GatewayRejected`) are final; `GatewayIndeterminate`
    /// and `FinalizationFailed` mean the reconciliation path now owns the
    /// transaction and the caller should check back rather than resubmit.
    ///
    /// Once the reservation exists the rest of the flow runs on its own task,
    /// so dropping the returned future does not abandon the reserved funds.
    pub async fn submit_payment(&self, command: PaymentCommand) -> Result<PaymentReceipt> {
        let reservation = self.flow.ledger.reserve_and_create(&command).await?;

        let tx = match reservation {
            Reservation::Existing(tx) => {
                info!(
                    transaction_id = %tx.id,
                    user_id = tx.user_id,
                    idempotency_key = %command.idempotency_key,
                    status = %tx.status,
                    "Idempotent replay, returning existing transaction"
                );
                return replay(tx);
            }
            Reservation::Created(tx) => tx,
        };

        info!(
            transaction_id = %tx.id,
            user_id = tx.user_id,
            amount = %tx.amount,
            method = %tx.method,
            "Funds reserved"
        );

        let flow = self.flow.clone();
        let transaction_id = tx.id;
        tokio::spawn(async move { flow.settle(tx).await })
            .await
            .map_err(|e| {
                error!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Settlement task aborted with a reservation outstanding"
                );
                PaymentError::InternalError(Box::new(e))
            })?
    }
}

#[derive(Clone)]
struct SettlementFlow {
    ledger: LedgerStoreRef,
    gateway: GatewayAdapterRef,
    reconciliation: ReconciliationQueueRef,
    gateway_timeout: Duration,
}

impl SettlementFlow {
    /// RESERVED -> SUBMITTED -> {SETTLED, COMPENSATED, RECONCILING}
    async fn settle(&self, tx: Transaction) -> Result<PaymentReceipt> {
        let request = GatewayRequest::from(&tx);
        let outcome = match tokio::time::timeout(self.gateway_timeout, self.gateway.submit(&request))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => GatewayOutcome::Indeterminate {
                reason: format!("gateway timed out after {:?}", self.gateway_timeout),
            },
        };
        debug!(transaction_id = %tx.id, outcome = ?outcome, "Gateway responded");

        match outcome {
            GatewayOutcome::Accepted { provider_reference } => {
                self.settle_accepted(&tx, provider_reference).await
            }
            GatewayOutcome::Rejected { reason } => self.compensate(&tx, reason).await,
            GatewayOutcome::Indeterminate { reason } => {
                warn!(
                    transaction_id = %tx.id,
                    reason = %reason,
                    "Gateway outcome indeterminate, deferring to reconciliation"
                );
                self.hand_off(ReconciliationEntry::new(
                    tx.id,
                    RequiredAction::QueryGateway,
                    reason.clone(),
                ))
                .await;
                Err(PaymentError::GatewayIndeterminate {
                    transaction_id: tx.id,
                    reason,
                })
            }
        }
    }

    async fn settle_accepted(
        &self,
        tx: &Transaction,
        provider_reference: String,
    ) -> Result<PaymentReceipt> {
        let settlement = Settlement::Succeeded {
            provider_reference: provider_reference.clone(),
        };
        match self.ledger.finalize(tx.id, settlement).await {
            Ok(_)
            | Err(PaymentError::AlreadyFinalized {
                status: TransactionStatus::Success,
                ..
            }) => {
                info!(
                    transaction_id = %tx.id,
                    provider_reference = %provider_reference,
                    "Payment settled"
                );
                Ok(PaymentReceipt {
                    transaction_id: tx.id,
                    status: PublicStatus::Success,
                    provider_reference: Some(provider_reference),
                })
            }
            Err(e) => {
                // Funds stay reserved; never resubmit, confirm with the gateway later.
                error!(
                    transaction_id = %tx.id,
                    error = %e,
                    "Gateway accepted but settlement could not be recorded"
                );
                self.hand_off(
                    ReconciliationEntry::new(
                        tx.id,
                        RequiredAction::ConfirmSettlement,
                        e.to_string(),
                    )
                    .with_provider_reference(provider_reference),
                )
                .await;
                Err(PaymentError::FinalizationFailed {
                    transaction_id: tx.id,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn compensate(&self, tx: &Transaction, reason: String) -> Result<PaymentReceipt> {
        let settlement = Settlement::Failed {
            reason: reason.clone(),
        };
        match self.ledger.finalize(tx.id, settlement).await {
            Ok(_) => {
                info!(
                    transaction_id = %tx.id,
                    reason = %reason,
                    "Payment rejected, reservation credited back"
                );
            }
            Err(e) => {
                warn!(
                    transaction_id = %tx.id,
                    error = %e,
                    "Credit-back failed, handing off to reconciliation"
                );
                self.hand_off(ReconciliationEntry::new(
                    tx.id,
                    RequiredAction::Compensate,
                    reason.clone(),
                ))
                .await;
                if let Err(mark_err) = self.ledger.mark_reconciling(tx.id).await {
                    error!(
                        transaction_id = %tx.id,
                        error = %mark_err,
                        "Could not mark transaction as reconciling"
                    );
                }
            }
        }
        Err(PaymentError::GatewayRejected {
            transaction_id: tx.id,
            reason,
        })
    }

    /// A failed enqueue is only logged: the reconciler's ledger sweep picks the
    /// row up once it goes stale.
    async fn hand_off(&self, entry: ReconciliationEntry) {
        let transaction_id = entry.transaction_id;
        let action = entry.action;
        if let Err(e) = self.reconciliation.enqueue(entry).await {
            error!(
                transaction_id = %transaction_id,
                action = %action,
                error = %e,
                "Failed to enqueue reconciliation entry"
            );
        }
    }
}

/// Answers a retried command from the stored transaction without touching the
/// gateway again.
fn replay(tx: Transaction) -> Result<PaymentReceipt> {
    match tx.status {
        TransactionStatus::Success => Ok(PaymentReceipt {
            transaction_id: tx.id,
            status: PublicStatus::Success,
            provider_reference: tx.provider_reference,
        }),
        TransactionStatus::Failed => Err(PaymentError::GatewayRejected {
            transaction_id: tx.id,
            reason: tx
                .failure_reason
                .unwrap_or_else(|| "previously rejected".to_string()),
        }),
        TransactionStatus::Pending | TransactionStatus::Reconciling => {
            Err(PaymentError::GatewayIndeterminate {
                transaction_id: tx.id,
                reason: "payment is still being resolved".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{LedgerStore, ReconciliationQueue};
    use crate::domain::transaction::{IdempotencyKey, PaymentMethod};
    use crate::infrastructure::gateway::{GatewayBehavior, SimulatedGateway};
    use crate::infrastructure::in_memory::{InMemoryLedgerStore, InMemoryReconciliationQueue};
    use std::sync::Arc;

    struct Harness {
        ledger: Arc<InMemoryLedgerStore>,
        queue: Arc<InMemoryReconciliationQueue>,
        gateway: Arc<SimulatedGateway>,
        orchestrator: PaymentOrchestrator,
    }

    async fn harness(gateway: SimulatedGateway, timeout: Duration) -> Harness {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let queue = Arc::new(InMemoryReconciliationQueue::new());
        let gateway = Arc::new(gateway);
        ledger
            .deposit(1234, "1000.00".parse().unwrap())
            .await
            .unwrap();

        let config = EngineConfig::default().with_gateway_timeout(timeout);
        let orchestrator =
            PaymentOrchestrator::new(ledger.clone(), gateway.clone(), queue.clone(), &config);
        Harness {
            ledger,
            queue,
            gateway,
            orchestrator,
        }
    }

    fn command(amount: &str, key: &str) -> PaymentCommand {
        PaymentCommand::new(
            1234,
            PaymentMethod::Card,
            amount.parse().unwrap(),
            Some(IdempotencyKey::new(key).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_accepted_payment_settles() {
        let h = harness(
            SimulatedGateway::new(GatewayBehavior::Accept),
            Duration::from_secs(1),
        )
        .await;

        let receipt = h
            .orchestrator
            .submit_payment(command("100.50", "k1"))
            .await
            .unwrap();
        assert_eq!(receipt.status, PublicStatus::Success);
        assert!(receipt.provider_reference.is_some());

        let tx = h.ledger.transaction(receipt.transaction_id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(h.ledger.balance(1234).await.unwrap().to_string(), "899.50");
        assert!(h.queue.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_payment_is_compensated() {
        let h = harness(
            SimulatedGateway::new(GatewayBehavior::Reject),
            Duration::from_secs(1),
        )
        .await;

        let err = h
            .orchestrator
            .submit_payment(command("100.50", "k1"))
            .await
            .unwrap_err();
        let id = match err {
            PaymentError::GatewayRejected { transaction_id, .. } => transaction_id,
            other => panic!("expected rejection, got {:?}", other),
        };

        let tx = h.ledger.transaction(id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(h.ledger.balance(1234).await.unwrap().to_string(), "1000.00");
        assert!(h.queue.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_indeterminate_not_rejected() {
        let h = harness(
            SimulatedGateway::new(GatewayBehavior::Hang),
            Duration::from_millis(20),
        )
        .await;

        let err = h
            .orchestrator
            .submit_payment(command("100.50", "k1"))
            .await
            .unwrap_err();
        assert!(err.is_pending());
        let id = err.transaction_id().unwrap();

        // Reservation stands and nothing is credited back yet.
        let tx = h.ledger.transaction(id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(h.ledger.balance(1234).await.unwrap().to_string(), "899.50");

        let pending = h.queue.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].transaction_id, id);
        assert_eq!(pending[0].action, RequiredAction::QueryGateway);
    }

    #[tokio::test]
    async fn test_insufficient_funds_never_reaches_gateway() {
        let h = harness(
            SimulatedGateway::new(GatewayBehavior::Accept),
            Duration::from_secs(1),
        )
        .await;

        let err = h
            .orchestrator
            .submit_payment(command("1000.50", "k1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InsufficientFunds { .. }));
        assert_eq!(h.gateway.submissions(), 0);
        assert_eq!(h.ledger.balance(1234).await.unwrap().to_string(), "1000.00");
    }

    #[tokio::test]
    async fn test_retry_with_same_key_does_not_charge_twice() {
        let h = harness(
            SimulatedGateway::new(GatewayBehavior::Accept),
            Duration::from_secs(1),
        )
        .await;

        let first = h
            .orchestrator
            .submit_payment(command("100.00", "retry-me"))
            .await
            .unwrap();
        let second = h
            .orchestrator
            .submit_payment(command("100.00", "retry-me"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(h.gateway.submissions(), 1);
        assert_eq!(h.ledger.balance(1234).await.unwrap().to_string(), "900.00");
    }

    #[tokio::test]
    async fn test_replay_of_rejected_payment_stays_rejected() {
        let h = harness(
            SimulatedGateway::new(GatewayBehavior::Reject),
            Duration::from_secs(1),
        )
        .await;

        let _ = h.orchestrator.submit_payment(command("10.00", "k1")).await;
        let err = h
            .orchestrator
            .submit_payment(command("10.00", "k1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::GatewayRejected { .. }));
        assert_eq!(h.gateway.submissions(), 1);
        assert_eq!(h.ledger.balance(1234).await.unwrap().to_string(), "1000.00");
    }

    #[tokio::test]
    async fn test_caller_cancellation_does_not_abandon_reservation() {
        let h = harness(
            SimulatedGateway::new(GatewayBehavior::Accept).with_latency(Duration::from_millis(50)),
            Duration::from_secs(1),
        )
        .await;
        let orchestrator = Arc::new(h.orchestrator);

        let caller = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.submit_payment(command("100.00", "k1")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let history = h.ledger.list_transactions(1234, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TransactionStatus::Success);
        assert_eq!(h.ledger.balance(1234).await.unwrap().to_string(), "900.00");
    }
}
