use crate::config::EngineConfig;
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::LedgerStoreRef;
use crate::domain::transaction::{PaymentMethod, PublicStatus, Transaction, TransactionId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A transaction as shown to callers of the read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    pub id: TransactionId,
    pub user_id: u64,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub status: PublicStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionView {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            user_id: tx.user_id,
            amount: tx.amount,
            method: tx.method,
            status: tx.status.public_status(),
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

/// Balance and history queries, passed straight through to the ledger.
pub struct WalletService {
    ledger: LedgerStoreRef,
    history_limit: usize,
}

impl WalletService {
    pub fn new(ledger: LedgerStoreRef, config: &EngineConfig) -> Self {
        Self {
            ledger,
            history_limit: config.history_limit,
        }
    }

    pub async fn balance(&self, user_id: u64) -> Result<Balance> {
        self.ledger.balance(user_id).await
    }

    /// Newest first. `limit` is capped at the configured history limit.
    pub async fn history(&self, user_id: u64, limit: Option<usize>) -> Result<Vec<TransactionView>> {
        let limit = limit
            .unwrap_or(self.history_limit)
            .min(self.history_limit);
        let transactions = self.ledger.list_transactions(user_id, limit).await?;
        Ok(transactions.into_iter().map(TransactionView::from).collect())
    }
}
