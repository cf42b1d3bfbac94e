use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{LedgerStore, ReconciliationQueue, Reservation};
use crate::domain::reconciliation::ReconciliationEntry;
use crate::domain::transaction::{
    IdempotencyKey, PaymentCommand, Settlement, Transaction, TransactionId, TransactionStatus,
};
use crate::domain::wallet::Wallet;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    wallets: HashMap<u64, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    by_user: HashMap<u64, Vec<TransactionId>>,
    idempotency: HashMap<(u64, IdempotencyKey), TransactionId>,
}

/// A thread-safe in-memory ledger.
///
/// All wallets and transactions sit behind one `RwLock`; every mutating call
/// holds the write guard for its whole check-and-write, which makes each call
/// a single atomic unit. Ideal for testing or single-process use.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn reserve_and_create(&self, command: &PaymentCommand) -> Result<Reservation> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let key = (command.user_id, command.idempotency_key.clone());
        if let Some(id) = state.idempotency.get(&key) {
            let existing = state.transactions.get(id).cloned().ok_or_else(|| {
                PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                    "Idempotency index points at missing transaction {}",
                    id
                ))))
            })?;
            if !existing.matches_command(command) {
                return Err(PaymentError::InvalidCommand(format!(
                    "Idempotency key '{}' was already used for a different payment",
                    command.idempotency_key
                )));
            }
            return Ok(Reservation::Existing(existing));
        }

        let mut wallet = state
            .wallets
            .get(&command.user_id)
            .cloned()
            .unwrap_or_else(|| Wallet::new(command.user_id));
        wallet.reserve(command.amount)?;

        let tx = Transaction::pending(command);
        state.wallets.insert(command.user_id, wallet);
        state.by_user.entry(command.user_id).or_default().push(tx.id);
        state.idempotency.insert(key, tx.id);
        state.transactions.insert(tx.id, tx.clone());

        Ok(Reservation::Created(tx))
    }

    async fn finalize(&self, id: TransactionId, settlement: Settlement) -> Result<Transaction> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let stored = state
            .transactions
            .get_mut(&id)
            .ok_or(PaymentError::TransactionNotFound(id))?;

        let mut updated = stored.clone();
        updated.settle(&settlement)?;

        if updated.status == TransactionStatus::Failed {
            state
                .wallets
                .entry(updated.user_id)
                .or_insert_with(|| Wallet::new(updated.user_id))
                .credit(updated.amount)?;
        }

        *stored = updated.clone();
        Ok(updated)
    }

    async fn mark_reconciling(&self, id: TransactionId) -> Result<Transaction> {
        let mut state = self.state.write().await;
        let stored = state
            .transactions
            .get_mut(&id)
            .ok_or(PaymentError::TransactionNotFound(id))?;

        if stored.status != TransactionStatus::Reconciling {
            stored.transition(TransactionStatus::Reconciling)?;
        }
        Ok(stored.clone())
    }

    async fn deposit(&self, user_id: u64, amount: Amount) -> Result<Balance> {
        let mut state = self.state.write().await;
        let wallet = state
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id));
        wallet.credit(amount)?;
        Ok(wallet.balance)
    }

    async fn balance(&self, user_id: u64) -> Result<Balance> {
        let state = self.state.read().await;
        Ok(state
            .wallets
            .get(&user_id)
            .map(|w| w.balance)
            .unwrap_or(Balance::ZERO))
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(&id).cloned())
    }

    async fn list_transactions(&self, user_id: u64, limit: usize) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut transactions: Vec<Transaction> = state
            .by_user
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.transactions.get(id).cloned())
            .collect();
        transactions.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        transactions.truncate(limit);
        Ok(transactions)
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        let state = self.state.read().await;
        let mut wallets: Vec<Wallet> = state.wallets.values().cloned().collect();
        wallets.sort_by_key(|w| w.user_id);
        Ok(wallets)
    }

    async fn unresolved(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut open: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| !tx.status.is_terminal() && tx.updated_at <= cutoff)
            .cloned()
            .collect();
        open.sort_by(|a, b| (a.updated_at, a.id).cmp(&(b.updated_at, b.id)));
        open.truncate(limit);
        Ok(open)
    }
}

/// A thread-safe in-memory reconciliation queue keyed by transaction id.
#[derive(Default, Clone)]
pub struct InMemoryReconciliationQueue {
    entries: Arc<RwLock<HashMap<TransactionId, ReconciliationEntry>>>,
}

impl InMemoryReconciliationQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconciliationQueue for InMemoryReconciliationQueue {
    async fn enqueue(&self, entry: ReconciliationEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.transaction_id, entry);
        Ok(())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<ReconciliationEntry>> {
        let entries = self.entries.read().await;
        let mut pending: Vec<ReconciliationEntry> = entries.values().cloned().collect();
        pending.sort_by(|a, b| {
            (a.enqueued_at, a.transaction_id).cmp(&(b.enqueued_at, b.transaction_id))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn record_attempt(&self, id: TransactionId, error: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&id) {
            entry.record_attempt(error);
        }
        Ok(())
    }

    async fn remove(&self, id: TransactionId) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(&id);
        Ok(())
    }
}
