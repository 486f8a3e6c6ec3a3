//! Shared test utilities for the salon ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating cycles and records with sensible defaults.

use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::{
    core::{
        actor::Actor,
        cycle,
        money::{Money, PaymentEntry, PaymentMethod},
        record::{self, ProductDraft, RecordDraft, RecordWithPayments, ServiceDraft},
    },
    entities::{self, Record},
    errors::{Error, Result},
};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Shorthand for a calendar date. Panics on an invalid date, tests only.
#[allow(clippy::unwrap_used)]
pub fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// A stylist actor.
pub fn stylist(user_id: &str) -> Actor {
    Actor::stylist(user_id)
}

/// The administrator actor used across tests.
pub fn admin() -> Actor {
    Actor::admin("admin")
}

/// Card payment of `cents`.
pub fn card(cents: i64) -> PaymentEntry {
    PaymentEntry::new(PaymentMethod::Card, Money::from_cents(cents))
}

/// Cash payment of `cents`.
pub fn cash(cents: i64) -> PaymentEntry {
    PaymentEntry::new(PaymentMethod::Cash, Money::from_cents(cents))
}

/// Cash App payment of `cents`.
pub fn cashapp(cents: i64) -> PaymentEntry {
    PaymentEntry::new(PaymentMethod::CashApp, Money::from_cents(cents))
}

/// Zelle payment of `cents`.
pub fn zelle(cents: i64) -> PaymentEntry {
    PaymentEntry::new(PaymentMethod::Zelle, Money::from_cents(cents))
}

/// A service draft with no tip, customer or notes.
pub fn service_draft(
    cycle_id: i64,
    date: NaiveDate,
    price_cents: i64,
    payments: Vec<PaymentEntry>,
) -> RecordDraft {
    RecordDraft::Service(ServiceDraft {
        cycle_id,
        name: "Silk press".to_string(),
        customer: Some("Test customer".to_string()),
        price: Money::from_cents(price_cents),
        tip: Money::ZERO,
        date,
        notes: None,
        payments,
    })
}

/// A product draft with no notes.
pub fn product_draft(
    cycle_id: i64,
    date: NaiveDate,
    price_cents: i64,
    payments: Vec<PaymentEntry>,
) -> RecordDraft {
    RecordDraft::Product(ProductDraft {
        cycle_id,
        name: "Edge control".to_string(),
        price: Money::from_cents(price_cents),
        date,
        notes: None,
        payments,
    })
}

/// Creates a cycle with the given name and range.
pub async fn create_test_cycle(
    db: &DatabaseConnection,
    name: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<entities::cycle::Model> {
    cycle::create_cycle(db, name.to_string(), start_date, end_date, None).await
}

/// Sets up a database with "Cycle A" covering 2025-06-01 to 2025-06-14.
/// Returns (db, cycle) for common test scenarios.
pub async fn setup_with_cycle() -> Result<(DatabaseConnection, entities::cycle::Model)> {
    let db = setup_test_db().await?;
    let cycle = create_test_cycle(&db, "Cycle A", ymd(2025, 6, 1), ymd(2025, 6, 14)).await?;
    Ok((db, cycle))
}

/// Creates a card-paid service as the stylist themself. The date must be inside the cycle.
pub async fn create_test_service(
    db: &DatabaseConnection,
    cycle: &entities::cycle::Model,
    user_id: &str,
    date: NaiveDate,
    price_cents: i64,
) -> Result<RecordWithPayments> {
    let draft = service_draft(cycle.id, date, price_cents, vec![card(price_cents)]);
    record::create_record(db, &stylist(user_id), draft).await
}

/// Creates a card-paid service as an administrator, skipping the date-range check.
pub async fn create_admin_service(
    db: &DatabaseConnection,
    cycle: &entities::cycle::Model,
    user_id: &str,
    date: NaiveDate,
    price_cents: i64,
) -> Result<RecordWithPayments> {
    let draft = service_draft(cycle.id, date, price_cents, vec![card(price_cents)]);
    record::create_record_for(db, &admin(), user_id, draft).await
}

/// Overwrites the stored date text of a record, bypassing validation.
/// Used to simulate rows written by older clients.
pub async fn set_raw_record_date(db: &DatabaseConnection, record_id: i64, raw: &str) -> Result<()> {
    let existing = Record::find_by_id(record_id)
        .one(db)
        .await?
        .ok_or(Error::RecordNotFound { id: record_id })?;
    let mut active: entities::record::ActiveModel = existing.into();
    active.date = Set(raw.to_string());
    active.update(db).await?;
    Ok(())
}
