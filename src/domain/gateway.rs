use super::money::Amount;
use super::transaction::{PaymentMethod, Transaction, TransactionId};
use serde::{Deserialize, Serialize};

/// What the settlement provider is asked to charge.
///
/// `transaction_id` doubles as the provider-side idempotency token, so a
/// repeated submit or a status query never creates a second charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub transaction_id: TransactionId,
    pub user_id: u64,
    pub method: PaymentMethod,
    pub amount: Amount,
}

impl From<&Transaction> for GatewayRequest {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            user_id: tx.user_id,
            method: tx.method,
            amount: tx.amount,
        }
    }
}

/// The three outcomes a gateway call can have.
///
/// `Indeterminate` (timeout, connection loss) means the provider may or may
/// not have charged, so it must never be handled like `Rejected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayOutcome {
    Accepted { provider_reference: String },
    Rejected { reason: String },
    Indeterminate { reason: String },
}
