#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use walletpay::application::orchestrator::PaymentOrchestrator;
use walletpay::application::reconciler::Reconciler;
use walletpay::config::EngineConfig;
use walletpay::domain::gateway::{GatewayOutcome, GatewayRequest};
use walletpay::domain::money::{Amount, Balance};
use walletpay::domain::ports::{GatewayAdapter, LedgerStore, ReconciliationQueue, Reservation};
use walletpay::domain::reconciliation::ReconciliationEntry;
use walletpay::domain::transaction::{
    IdempotencyKey, PaymentCommand, PaymentMethod, Settlement, Transaction, TransactionId,
};
use walletpay::domain::wallet::Wallet;
use walletpay::error::{PaymentError, Result};
use walletpay::infrastructure::in_memory::{InMemoryLedgerStore, InMemoryReconciliationQueue};

pub fn amount(s: &str) -> Amount {
    s.parse().unwrap()
}

pub fn payment(user_id: u64, value: &str, key: &str) -> PaymentCommand {
    PaymentCommand::new(
        user_id,
        PaymentMethod::Card,
        amount(value),
        Some(IdempotencyKey::new(key).unwrap()),
    )
}

/// Ledger whose `finalize` fails while `finalize_faults` is non-zero.
#[derive(Default)]
pub struct FaultyLedgerStore {
    pub inner: InMemoryLedgerStore,
    finalize_faults: AtomicUsize,
}

impl FaultyLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls to `finalize` fail with `StoreUnavailable`.
    pub fn fail_next_finalizes(&self, n: usize) {
        self.finalize_faults.store(n, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.finalize_faults.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for FaultyLedgerStore {
    async fn reserve_and_create(&self, command: &PaymentCommand) -> Result<Reservation> {
        self.inner.reserve_and_create(command).await
    }

    async fn finalize(&self, id: TransactionId, settlement: Settlement) -> Result<Transaction> {
        let injected = self
            .finalize_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PaymentError::StoreUnavailable(
                "simulated write failure".to_string(),
            ));
        }
        self.inner.finalize(id, settlement).await
    }

    async fn mark_reconciling(&self, id: TransactionId) -> Result<Transaction> {
        self.inner.mark_reconciling(id).await
    }

    async fn deposit(&self, user_id: u64, amount: Amount) -> Result<Balance> {
        self.inner.deposit(user_id, amount).await
    }

    async fn balance(&self, user_id: u64) -> Result<Balance> {
        self.inner.balance(user_id).await
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.inner.transaction(id).await
    }

    async fn list_transactions(&self, user_id: u64, limit: usize) -> Result<Vec<Transaction>> {
        self.inner.list_transactions(user_id, limit).await
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        self.inner.wallets().await
    }

    async fn unresolved(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Transaction>> {
        self.inner.unresolved(cutoff, limit).await
    }
}

/// Gateway answering submissions from a script, then accepting.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<GatewayOutcome>>,
    query_answer: Mutex<Option<GatewayOutcome>>,
    submissions: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(script: impl IntoIterator<Item = GatewayOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    pub async fn answer_queries_with(&self, outcome: GatewayOutcome) {
        *self.query_answer.lock().await = Some(outcome);
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

pub fn accepted() -> GatewayOutcome {
    GatewayOutcome::Accepted {
        provider_reference: "prov-ref".to_string(),
    }
}

pub fn rejected() -> GatewayOutcome {
    GatewayOutcome::Rejected {
        reason: "card declined".to_string(),
    }
}

pub fn indeterminate() -> GatewayOutcome {
    GatewayOutcome::Indeterminate {
        reason: "connection reset".to_string(),
    }
}

#[async_trait]
impl GatewayAdapter for ScriptedGateway {
    async fn submit(&self, _request: &GatewayRequest) -> GatewayOutcome {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.script.lock().await.pop_front().unwrap_or_else(accepted)
    }

    async fn query(&self, _transaction_id: TransactionId) -> GatewayOutcome {
        self.query_answer
            .lock()
            .await
            .clone()
            .unwrap_or_else(indeterminate)
    }
}

/// Queue that refuses every write.
#[derive(Default)]
pub struct DownQueue;

#[async_trait]
impl ReconciliationQueue for DownQueue {
    async fn enqueue(&self, _entry: ReconciliationEntry) -> Result<()> {
        Err(PaymentError::StoreUnavailable("queue unreachable".to_string()))
    }

    async fn pending(&self, _limit: usize) -> Result<Vec<ReconciliationEntry>> {
        Ok(Vec::new())
    }

    async fn record_attempt(&self, _id: TransactionId, _error: &str) -> Result<()> {
        Err(PaymentError::StoreUnavailable("queue unreachable".to_string()))
    }

    async fn remove(&self, _id: TransactionId) -> Result<()> {
        Err(PaymentError::StoreUnavailable("queue unreachable".to_string()))
    }
}

/// In-memory queue whose `remove` fails while `remove_faults` is non-zero.
#[derive(Default)]
pub struct FlakyQueue {
    pub inner: InMemoryReconciliationQueue,
    remove_faults: AtomicUsize,
}

impl FlakyQueue {
    pub fn fail_next_removes(&self, n: usize) {
        self.remove_faults.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReconciliationQueue for FlakyQueue {
    async fn enqueue(&self, entry: ReconciliationEntry) -> Result<()> {
        self.inner.enqueue(entry).await
    }

    async fn pending(&self, limit: usize) -> Result<Vec<ReconciliationEntry>> {
        self.inner.pending(limit).await
    }

    async fn record_attempt(&self, id: TransactionId, error: &str) -> Result<()> {
        self.inner.record_attempt(id, error).await
    }

    async fn remove(&self, id: TransactionId) -> Result<()> {
        let injected = self
            .remove_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PaymentError::StoreUnavailable(
                "simulated queue failure".to_string(),
            ));
        }
        self.inner.remove(id).await
    }
}

/// Orchestrator and reconciler wired to shared test doubles.
pub struct Harness<L: LedgerStore + 'static> {
    pub ledger: Arc<L>,
    pub gateway: Arc<ScriptedGateway>,
    pub queue: Arc<InMemoryReconciliationQueue>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub reconciler: Reconciler,
}

impl<L: LedgerStore + 'static> Harness<L> {
    pub fn new(ledger: L, gateway: ScriptedGateway) -> Self {
        let ledger = Arc::new(ledger);
        let gateway = Arc::new(gateway);
        let queue = Arc::new(InMemoryReconciliationQueue::new());
        let config = EngineConfig::default().with_gateway_timeout(Duration::from_millis(200));
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            ledger.clone(),
            gateway.clone(),
            queue.clone(),
            &config,
        ));
        let reconciler = Reconciler::new(ledger.clone(), gateway.clone(), queue.clone(), &config);
        Self {
            ledger,
            gateway,
            queue,
            orchestrator,
            reconciler,
        }
    }

    pub async fn balance(&self, user_id: u64) -> String {
        self.ledger.balance(user_id).await.unwrap().to_string()
    }
}
