use super::money::{Amount, Balance};
use crate::error::PaymentError;
use serde::{Deserialize, Serialize};

/// A user's spendable funds.
///
/// One wallet per user, created lazily with a zero balance. Only the ledger
/// store's atomic primitives call the mutators below.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Wallet {
    pub user_id: u64,
    pub balance: Balance,
}

impl Wallet {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            balance: Balance::ZERO,
        }
    }

    /// Debits a reservation if the balance covers it, otherwise leaves the
    /// wallet untouched.
    pub fn reserve(&mut self, amount: Amount) -> Result<(), PaymentError> {
        match self.balance.checked_debit(amount) {
            Some(balance) => {
                self.balance = balance;
                Ok(())
            }
            None => Err(PaymentError::InsufficientFunds {
                user_id: self.user_id,
                available: self.balance.to_string(),
                requested: amount.to_string(),
            }),
        }
    }

    /// Credits funds back (compensation) or in (provisioning).
    pub fn credit(&mut self, amount: Amount) -> Result<(), PaymentError> {
        self.balance = self.balance.checked_credit(amount).ok_or_else(|| {
            PaymentError::InvalidCommand(format!(
                "Crediting {} would overflow the balance of user {}",
                amount, self.user_id
            ))
        })?;
        Ok(())
    }
}
