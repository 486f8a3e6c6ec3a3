//! Core ledger logic, independent of any transport or UI.

/// Identity of the acting user
pub mod actor;
/// Cycle repository and date-to-cycle resolution
pub mod cycle;
/// Calendar date parsing and normalization
pub mod dates;
/// Repository-style facade with stats invalidation
pub mod ledger;
/// Batch re-filing of records into the cycle matching their date
pub mod migration;
/// Fixed-point money and payment methods
pub mod money;
/// Payment reconciliation rules
pub mod payment;
/// Service and product record store
pub mod record;
/// Per-stylist cycle statistics
pub mod stats;
