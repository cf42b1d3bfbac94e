use crate::error::PaymentError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits carried by one minor unit (cents).
pub const MINOR_UNIT_SCALE: u32 = 2;

const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// A strictly positive payment amount, stored as integer minor units.
///
/// Decimal text is only accepted at the boundary (`FromStr`, `TryFrom<Decimal>`);
/// all ledger arithmetic happens on the integer representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub fn from_minor_units(units: i64) -> Result<Self, PaymentError> {
        if units > 0 {
            Ok(Self(units))
        } else {
            Err(PaymentError::InvalidCommand(
                "Amount must be positive".to_string(),
            ))
        }
    }

    /// Converts a decimal major-unit value (e.g. `100.50`) into minor units.
    ///
    /// Rejects values with more precision than one minor unit instead of rounding.
    pub fn from_decimal(value: Decimal) -> Result<Self, PaymentError> {
        Self::from_minor_units(decimal_to_minor_units(value)?)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_SCALE)
    }
}

impl TryFrom<i64> for Amount {
    type Error = PaymentError;

    fn try_from(units: i64) -> Result<Self, Self::Error> {
        Self::from_minor_units(units)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal(parse_decimal(s)?)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

/// A wallet balance in minor units.
///
/// Only the checked operations below change it, so it never goes negative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Balance(i64);

impl Balance {
    pub const ZERO: Self = Self(0);

    pub fn from_minor_units(units: i64) -> Result<Self, PaymentError> {
        if units >= 0 {
            Ok(Self(units))
        } else {
            Err(PaymentError::InvalidCommand(
                "Balance cannot be negative".to_string(),
            ))
        }
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_SCALE)
    }

    /// Debits `amount`; `None` if that would go below zero.
    pub fn checked_debit(self, amount: Amount) -> Option<Self> {
        self.0
            .checked_sub(amount.0)
            .filter(|units| *units >= 0)
            .map(Self)
    }

    /// Credits `amount`; `None` on overflow.
    pub fn checked_credit(self, amount: Amount) -> Option<Self> {
        self.0.checked_add(amount.0).map(Self)
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl FromStr for Balance {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_minor_units(decimal_to_minor_units(parse_decimal(s)?)?)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

fn parse_decimal(s: &str) -> Result<Decimal, PaymentError> {
    Decimal::from_str(s.trim())
        .map_err(|e| PaymentError::InvalidCommand(format!("Invalid amount '{}': {}", s, e)))
}

fn decimal_to_minor_units(value: Decimal) -> Result<i64, PaymentError> {
    let value = value.normalize();
    if value.scale() > MINOR_UNIT_SCALE {
        return Err(PaymentError::InvalidCommand(format!(
            "Amount {} has more than {} decimal places",
            value, MINOR_UNIT_SCALE
        )));
    }
    value
        .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
        .and_then(|v| v.to_i64())
        .ok_or_else(|| PaymentError::InvalidCommand(format!("Amount {} out of range", value)))
}
