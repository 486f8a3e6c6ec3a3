//! Fixed-point money and payment method types.
//!
//! Amounts are held as integer cents so that payment reconciliation is exact.
//! Decimal input is accepted through [`Money::parse`] and [`Money::from_decimal`];
//! anything finer than a cent is rejected rather than rounded.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// A monetary amount in whole cents.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero dollars.
    pub const ZERO: Self = Self(0);

    /// Builds an amount from a count of cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// The amount in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Converts an exact decimal into cents.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidMoney`] if the value has a non-zero
    /// digit beyond the second fraction digit or does not fit in cents.
    pub fn from_decimal(value: Decimal) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidMoney {
            input: value.to_string(),
            reason: reason.to_string(),
        };

        if value.normalize().scale() > 2 {
            return Err(invalid("amounts are limited to whole cents"));
        }

        value
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.to_i64())
            .map(Self)
            .ok_or_else(|| invalid("amount is out of range"))
    }

    /// Parses a decimal string such as `"60"`, `"60.5"` or `"60.00"`.
    ///
    /// A leading `$` is tolerated.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidMoney`] for non-numeric input or
    /// sub-cent precision.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let digits = trimmed.strip_prefix('$').unwrap_or(trimmed);
        let value = Decimal::from_str(digits).map_err(|e| ValidationError::InvalidMoney {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_decimal(value).map_err(|e| match e {
            ValidationError::InvalidMoney { reason, .. } => ValidationError::InvalidMoney {
                input: input.to_string(),
                reason,
            },
            other => other,
        })
    }

    /// The amount as a two-fraction-digit decimal.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Self> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// How a customer paid for (part of) a record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Credit or debit card
    #[sea_orm(string_value = "card")]
    Card,
    /// Physical cash
    #[sea_orm(string_value = "cash")]
    Cash,
    /// Cash App transfer
    #[sea_orm(string_value = "cashapp")]
    CashApp,
    /// Zelle transfer
    #[sea_orm(string_value = "zelle")]
    Zelle,
    /// Anything else; described by the entry's label
    #[sea_orm(string_value = "other")]
    Other,
}

impl PaymentMethod {
    /// Every method, in display order.
    pub const ALL: [Self; 5] = [Self::Card, Self::Cash, Self::CashApp, Self::Zelle, Self::Other];

    /// Lowercase identifier used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Cash => "cash",
            Self::CashApp => "cashapp",
            Self::Zelle => "zelle",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown payment method '{s}'"))
    }
}

/// One method/amount pair making up part of a record's price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEntry {
    /// Payment method
    pub method: PaymentMethod,
    /// Amount paid through this method
    pub amount: Money,
    /// Free-text description, meaningful for [`PaymentMethod::Other`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl PaymentEntry {
    /// Creates an entry without a label.
    #[must_use]
    pub const fn new(method: PaymentMethod, amount: Money) -> Self {
        Self {
            method,
            amount,
            label: None,
        }
    }

    /// Creates an `other` entry with the given label.
    #[must_use]
    pub fn other(amount: Money, label: impl Into<String>) -> Self {
        Self {
            method: PaymentMethod::Other,
            amount,
            label: Some(label.into()),
        }
    }
}
