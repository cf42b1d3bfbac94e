use super::transaction::TransactionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a transaction was handed to the reconciliation path.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RequiredAction {
    /// Provider rejected the charge but the credit-back could not be written.
    Compensate,
    /// Provider outcome unknown; ask it before touching the ledger.
    QueryGateway,
    /// Provider accepted but `Finalize(SUCCESS)` could not be written.
    ConfirmSettlement,
}

impl fmt::Display for RequiredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequiredAction::Compensate => "compensate",
            RequiredAction::QueryGateway => "query_gateway",
            RequiredAction::ConfirmSettlement => "confirm_settlement",
        })
    }
}

/// A durable unit of deferred work. One entry per transaction.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ReconciliationEntry {
    pub transaction_id: TransactionId,
    pub action: RequiredAction,
    pub reason: String,
    /// Set when the provider already accepted the charge.
    #[serde(default)]
    pub provider_reference: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl ReconciliationEntry {
    pub fn new(transaction_id: TransactionId, action: RequiredAction, reason: impl Into<String>) -> Self {
        Self {
            transaction_id,
            action,
            reason: reason.into(),
            provider_reference: None,
            attempts: 0,
            last_error: None,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_provider_reference(mut self, provider_reference: impl Into<String>) -> Self {
        self.provider_reference = Some(provider_reference.into());
        self
    }

    pub fn record_attempt(&mut self, error: impl Into<String>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
    }
}
