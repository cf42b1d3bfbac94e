use crate::domain::transaction::{PublicStatus, TransactionId, TransactionStatus};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Insufficient funds: user {user_id} has {available}, requested {requested}")]
    InsufficientFunds {
        user_id: u64,
        available: String,
        requested: String,
    },

    #[error("Gateway rejected transaction {transaction_id}: {reason}")]
    GatewayRejected {
        transaction_id: TransactionId,
        reason: String,
    },

    #[error("Gateway outcome for transaction {transaction_id} is indeterminate: {reason}")]
    GatewayIndeterminate {
        transaction_id: TransactionId,
        reason: String,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Finalization failed for transaction {transaction_id}: {reason}")]
    FinalizationFailed {
        transaction_id: TransactionId,
        reason: String,
    },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("Transaction {transaction_id} already finalized as {status}")]
    AlreadyFinalized {
        transaction_id: TransactionId,
        status: TransactionStatus,
    },

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// Stable machine-readable code for callers.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::InvalidCommand(_) => "invalid_command",
            PaymentError::InsufficientFunds { .. } => "insufficient_funds",
            PaymentError::GatewayRejected { .. } => "gateway_rejected",
            PaymentError::GatewayIndeterminate { .. } => "gateway_indeterminate",
            PaymentError::StoreUnavailable(_) => "store_unavailable",
            PaymentError::FinalizationFailed { .. } => "finalization_failed",
            PaymentError::TransactionNotFound(_) => "transaction_not_found",
            PaymentError::AlreadyFinalized { .. } => "already_finalized",
            PaymentError::CsvError(_) | PaymentError::IoError(_) => "io_error",
            PaymentError::InternalError(_) => "internal_error",
        }
    }

    /// Whether the payment may still complete without the caller resubmitting.
    ///
    /// Indeterminate and finalization failures are owned by the reconciliation
    /// path once a transaction id exists.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            PaymentError::GatewayIndeterminate { .. } | PaymentError::FinalizationFailed { .. }
        )
    }

    /// Whether the caller may retry the same command (with the same
    /// idempotency key).
    pub fn is_retriable(&self) -> bool {
        self.is_pending() || matches!(self, PaymentError::StoreUnavailable(_))
    }

    /// Status a caller should report for the payment that produced this error.
    pub fn public_status(&self) -> PublicStatus {
        match self {
            PaymentError::AlreadyFinalized { status, .. } => status.public_status(),
            e if e.is_pending() => PublicStatus::Pending,
            _ => PublicStatus::Failed,
        }
    }

    /// The transaction this error refers to, if a reservation was made.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            PaymentError::GatewayRejected { transaction_id, .. }
            | PaymentError::GatewayIndeterminate { transaction_id, .. }
            | PaymentError::FinalizationFailed { transaction_id, .. }
            | PaymentError::AlreadyFinalized { transaction_id, .. } => Some(*transaction_id),
            PaymentError::TransactionNotFound(id) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(e: rocksdb::Error) -> Self {
        PaymentError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(e: serde_json::Error) -> Self {
        PaymentError::InternalError(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_errors_are_retriable() {
        let id = TransactionId::new();
        let err = PaymentError::GatewayIndeterminate {
            transaction_id: id,
            reason: "timeout".to_string(),
        };
        assert!(err.is_pending());
        assert!(err.is_retriable());
        assert_eq!(err.transaction_id(), Some(id));
        assert_eq!(err.code(), "gateway_indeterminate");
        assert_eq!(err.public_status(), PublicStatus::Pending);
    }

    #[test]
    fn test_business_rejections_are_final() {
        let err = PaymentError::InsufficientFunds {
            user_id: 1,
            available: "500.00".to_string(),
            requested: "1000.50".to_string(),
        };
        assert!(!err.is_pending());
        assert!(!err.is_retriable());
        assert_eq!(err.transaction_id(), None);

        let err = PaymentError::GatewayRejected {
            transaction_id: TransactionId::new(),
            reason: "card declined".to_string(),
        };
        assert!(!err.is_retriable());
        assert_eq!(err.code(), "gateway_rejected");
        assert_eq!(err.public_status(), PublicStatus::Failed);

        let err = PaymentError::AlreadyFinalized {
            transaction_id: TransactionId::new(),
            status: TransactionStatus::Success,
        };
        assert_eq!(err.public_status(), PublicStatus::Success);
    }

    #[test]
    fn test_store_unavailable_is_retriable_but_not_pending() {
        let err = PaymentError::StoreUnavailable("connection reset".to_string());
        assert!(err.is_retriable());
        assert!(!err.is_pending());
    }
}
