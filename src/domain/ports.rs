use super::gateway::{GatewayOutcome, GatewayRequest};
use super::money::{Amount, Balance};
use super::reconciliation::ReconciliationEntry;
use super::transaction::{PaymentCommand, Settlement, Transaction, TransactionId};
use super::wallet::Wallet;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Result of `LedgerStore::reserve_and_create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// Funds were debited and a PENDING transaction inserted.
    Created(Transaction),
    /// The idempotency key was already used; nothing was debited.
    Existing(Transaction),
}

impl Reservation {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Reservation::Created(tx) | Reservation::Existing(tx) => tx,
        }
    }
}

/// Durable holder of wallet balances and transaction records.
///
/// Every mutating method is one atomic unit and is durable before it returns.
/// Cross-request coordination happens here, never in the callers.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Checks `balance >= amount`, debits, and inserts a PENDING transaction in
    /// one conditional write. Fails with `InsufficientFunds` without mutating.
    /// Keyed by `(user_id, idempotency_key)`.
    async fn reserve_and_create(&self, command: &PaymentCommand) -> Result<Reservation>;

    /// Moves a PENDING or RECONCILING transaction to its terminal status,
    /// crediting the reservation back on failure. Terminal transactions yield
    /// `AlreadyFinalized` and are left untouched.
    async fn finalize(&self, id: TransactionId, settlement: Settlement) -> Result<Transaction>;

    /// Records that compensation is owed but could not be written
    /// synchronously. Idempotent for transactions already RECONCILING.
    async fn mark_reconciling(&self, id: TransactionId) -> Result<Transaction>;

    /// Provisions funds, creating the wallet if needed.
    async fn deposit(&self, user_id: u64, amount: Amount) -> Result<Balance>;

    /// Current balance; unknown users have an implicit zero balance.
    async fn balance(&self, user_id: u64) -> Result<Balance>;

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;

    /// Newest first, at most `limit` entries.
    async fn list_transactions(&self, user_id: u64, limit: usize) -> Result<Vec<Transaction>>;

    async fn wallets(&self) -> Result<Vec<Wallet>>;

    /// PENDING and RECONCILING transactions last updated at or before
    /// `cutoff`, oldest first, at most `limit` entries.
    async fn unresolved(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Transaction>>;
}

/// Capability over the external settlement provider.
///
/// Implementations map transport failures to `Indeterminate`; they never
/// return an error type because every failure is one of the three outcomes.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    async fn submit(&self, request: &GatewayRequest) -> GatewayOutcome;

    /// Asks the provider what happened to a previously submitted transaction.
    async fn query(&self, transaction_id: TransactionId) -> GatewayOutcome;
}

/// Durable queue of deferred compensation and status checks.
#[async_trait]
pub trait ReconciliationQueue: Send + Sync {
    /// Inserts or replaces the entry for the transaction.
    async fn enqueue(&self, entry: ReconciliationEntry) -> Result<()>;
    /// Oldest first, at most `limit` entries.
    async fn pending(&self, limit: usize) -> Result<Vec<ReconciliationEntry>>;
    async fn record_attempt(&self, id: TransactionId, error: &str) -> Result<()>;
    async fn remove(&self, id: TransactionId) -> Result<()>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type GatewayAdapterRef = Arc<dyn GatewayAdapter>;
pub type ReconciliationQueueRef = Arc<dyn ReconciliationQueue>;
