use super::money::Amount;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque transaction identifier.
///
/// ULID-based so ids are unique without coordination and sort by creation
/// time, which the stores rely on for newest-first history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(ulid::Ulid);

impl TransactionId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(ulid::Ulid::from_bytes(bytes))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Account,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Account => "account",
            PaymentMethod::Card => "card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "account" => Ok(PaymentMethod::Account),
            "card" => Ok(PaymentMethod::Card),
            other => Err(PaymentError::InvalidCommand(format!(
                "Invalid payment method '{}'",
                other
            ))),
        }
    }
}

/// Stored lifecycle of a transaction.
///
/// `Pending` and `Reconciling` still hold the reservation debit; `Success`
/// keeps it; `Failed` has had it credited back.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Reconciling,
}

impl TransactionStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }

    /// Whether the reservation debit is still outstanding.
    #[inline]
    pub fn holds_reservation(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Pending | TransactionStatus::Reconciling
        )
    }

    /// One-way transitions: PENDING fans out, RECONCILING only resolves,
    /// terminal states never move.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Success) | (Pending, Failed) | (Pending, Reconciling)
                | (Reconciling, Success)
                | (Reconciling, Failed)
        )
    }

    pub fn public_status(&self) -> PublicStatus {
        match self {
            TransactionStatus::Success => PublicStatus::Success,
            TransactionStatus::Failed => PublicStatus::Failed,
            TransactionStatus::Pending | TransactionStatus::Reconciling => PublicStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Reconciling => "RECONCILING",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status as exposed to callers. `RECONCILING` is never reported as a
/// definitive outcome.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PublicStatus {
    Success,
    Failed,
    Pending,
}

impl fmt::Display for PublicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PublicStatus::Success => "success",
            PublicStatus::Failed => "failed",
            PublicStatus::Pending => "pending",
        })
    }
}

/// Caller-supplied token that makes a payment submission safe to retry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub const MAX_LEN: usize = 128;

    pub fn new(key: impl Into<String>) -> Result<Self, PaymentError> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(PaymentError::InvalidCommand(
                "Idempotency key must not be empty".to_string(),
            ));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(PaymentError::InvalidCommand(format!(
                "Idempotency key longer than {} bytes",
                Self::MAX_LEN
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Assigns a fresh key for callers that do not supply one.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated request to spend from a wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCommand {
    pub user_id: u64,
    pub method: PaymentMethod,
    pub amount: Amount,
    pub idempotency_key: IdempotencyKey,
}

impl PaymentCommand {
    pub fn new(
        user_id: u64,
        method: PaymentMethod,
        amount: Amount,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Self {
        Self {
            user_id,
            method,
            amount,
            idempotency_key: idempotency_key.unwrap_or_else(IdempotencyKey::generate),
        }
    }
}

/// Terminal outcome handed to `LedgerStore::finalize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Provider charged; the reservation debit stands.
    Succeeded { provider_reference: String },
    /// Provider did not charge; the reservation is credited back.
    Failed { reason: String },
}

impl Settlement {
    pub fn target_status(&self) -> TransactionStatus {
        match self {
            Settlement::Succeeded { .. } => TransactionStatus::Success,
            Settlement::Failed { .. } => TransactionStatus::Failed,
        }
    }
}

/// A persisted payment. Only `status`, `provider_reference`, `failure_reason`
/// and `updated_at` change after creation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: u64,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub status: TransactionStatus,
    pub idempotency_key: IdempotencyKey,
    #[serde(default)]
    pub provider_reference: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A freshly reserved transaction.
    pub fn pending(command: &PaymentCommand) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            user_id: command.user_id,
            amount: command.amount,
            method: command.method,
            status: TransactionStatus::Pending,
            idempotency_key: command.idempotency_key.clone(),
            provider_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a replayed command carries the same payload as this record.
    pub fn matches_command(&self, command: &PaymentCommand) -> bool {
        self.user_id == command.user_id
            && self.amount == command.amount
            && self.method == command.method
    }

    /// Applies a status change, refusing anything the lifecycle forbids.
    pub fn transition(&mut self, next: TransactionStatus) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::AlreadyFinalized {
                transaction_id: self.id,
                status: self.status,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves to the settlement's terminal status and records its details.
    pub fn settle(&mut self, settlement: &Settlement) -> Result<(), PaymentError> {
        self.transition(settlement.target_status())?;
        match settlement {
            Settlement::Succeeded { provider_reference } => {
                self.provider_reference = Some(provider_reference.clone());
            }
            Settlement::Failed { reason } => {
                self.failure_reason = Some(reason.clone());
            }
        }
        Ok(())
    }
}
