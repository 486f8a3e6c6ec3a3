//! Unified error types for the salon ledger.
//!
//! Validation failures carry the specific rule that was violated so callers can
//! surface it directly. Database, I/O and serialization failures are wrapped so
//! every core function can return the crate-wide [`Result`].

use chrono::NaiveDate;
use thiserror::Error;

use crate::core::money::{Money, PaymentMethod};

/// A record or cycle failed one of the ledger's invariants.
///
/// These are always recoverable: nothing has been written when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The payment entries do not add up to the declared price.
    #[error("Payments total {paid} but the price is {price}")]
    PaymentSumMismatch {
        /// Declared price of the record
        price: Money,
        /// Sum of all payment amounts
        paid: Money,
    },

    /// A single payment entry has a negative amount.
    #[error("Payment via {method} has a negative amount: {amount}")]
    NegativeAmount {
        /// Method of the offending entry
        method: PaymentMethod,
        /// The negative amount
        amount: Money,
    },

    /// A record must carry at least one payment entry.
    #[error("At least one payment entry is required")]
    MissingPayments,

    /// Payments with method `other` must say what the method was.
    #[error("Payment method 'other' requires a non-empty label")]
    MissingOtherLabel,

    /// The record price itself is negative.
    #[error("Price cannot be negative: {price}")]
    NegativePrice {
        /// The rejected price
        price: Money,
    },

    /// A tip was negative.
    #[error("Tip cannot be negative: {tip}")]
    NegativeTip {
        /// The rejected tip
        tip: Money,
    },

    /// A monetary input could not be represented in whole cents.
    #[error("Invalid monetary amount '{input}': {reason}")]
    InvalidMoney {
        /// Raw input as received
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// The record date lies outside the range of its cycle.
    #[error("Date {date} is outside cycle '{cycle_name}' ({start} to {end})")]
    DateOutsideCycle {
        /// Record date
        date: NaiveDate,
        /// Cycle name, for the error message
        cycle_name: String,
        /// Inclusive cycle start
        start: NaiveDate,
        /// Inclusive cycle end
        end: NaiveDate,
    },

    /// A cycle whose start is after its end.
    #[error("Cycle start {start} is after its end {end}")]
    InvalidDateRange {
        /// Requested start date
        start: NaiveDate,
        /// Requested end date
        end: NaiveDate,
    },

    /// A date string that is neither `YYYY-MM-DD` nor a recognised datetime.
    #[error("Invalid date '{input}'")]
    InvalidDate {
        /// Raw input as received
        input: String,
    },

    /// A required text field was empty.
    #[error("{field} cannot be empty")]
    EmptyField {
        /// Name of the field
        field: &'static str,
    },
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A record or cycle violated a ledger rule.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No cycle with the given id exists.
    #[error("Cycle not found: {id}")]
    CycleNotFound {
        /// The requested cycle id
        id: i64,
    },

    /// No record with the given id exists.
    #[error("Record not found: {id}")]
    RecordNotFound {
        /// The requested record id
        id: i64,
    },

    /// The acting user may not perform the operation.
    #[error("User {user_id} is not allowed to {action}")]
    Forbidden {
        /// Acting user
        user_id: String,
        /// Short description of the attempted action
        action: String,
    },

    /// The cycle still has records assigned to it.
    #[error("Cycle {id} still has {record_count} record(s) assigned")]
    CycleInUse {
        /// Cycle id
        id: i64,
        /// Number of records referencing the cycle
        record_count: u64,
    },

    /// More than one cycle matched a date where exactly one was required.
    #[error("Date {date} matches {} cycles: {cycle_ids:?}", .cycle_ids.len())]
    AmbiguousCycle {
        /// The date being resolved
        date: NaiveDate,
        /// Ids of every matching cycle
        cycle_ids: Vec<i64>,
    },

    /// The migration error rate crossed the safety threshold; nothing was committed.
    #[error(
        "Cycle migration aborted: {errored} of {total} records could not be assigned \
         (limit {:.1}%)",
        .max_error_rate * 100.0
    )]
    IntegrityAbort {
        /// Malformed plus unassignable records
        errored: usize,
        /// Records examined
        total: usize,
        /// Configured threshold as a fraction of all records
        max_error_rate: f64,
    },

    /// Configuration or input problem outside the ledger rules.
    #[error("Configuration error: {message}")]
    Config {
        /// Human readable description
        message: String,
    },

    /// Error from the database layer.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem error (backups, config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is a recoverable validation failure.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether this error maps to a "not found" response.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::CycleNotFound { .. } | Self::RecordNotFound { .. })
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
