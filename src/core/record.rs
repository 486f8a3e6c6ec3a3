//! Record business logic - Services and products logged by stylists.
//!
//! Every write validates the payment breakdown first, then (for non-admin
//! actors) checks that the record date lies inside its cycle. The record row and
//! its payment rows are written inside one database transaction, so a failure
//! never leaves a record without its breakdown or vice versa.

use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    core::{
        actor::Actor,
        cycle::require_cycle,
        dates::format_date,
        money::{Money, PaymentEntry},
        payment::PaymentReconciled,
    },
    entities::{Payment, Record, RecordKind, cycle, payment, record},
    errors::{Error, Result, ValidationError},
};

/// Input for a service record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDraft {
    /// Cycle to file the record under
    pub cycle_id: i64,
    /// Service name (e.g., "Silk press")
    pub name: String,
    /// Customer name
    pub customer: Option<String>,
    /// Total price
    pub price: Money,
    /// Tip on top of the price
    pub tip: Money,
    /// Day the service was performed
    pub date: NaiveDate,
    /// Free-form notes
    pub notes: Option<String>,
    /// How the price was paid
    pub payments: Vec<PaymentEntry>,
}

/// Input for a product sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    /// Cycle to file the record under
    pub cycle_id: i64,
    /// Product name
    pub name: String,
    /// Total price
    pub price: Money,
    /// Day of the sale
    pub date: NaiveDate,
    /// Free-form notes
    pub notes: Option<String>,
    /// How the price was paid
    pub payments: Vec<PaymentEntry>,
}

/// A service or product to be created or written over an existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordDraft {
    /// A service
    Service(ServiceDraft),
    /// A product sale
    Product(ProductDraft),
}

impl PaymentReconciled for ServiceDraft {
    fn price(&self) -> Money {
        self.price
    }

    fn payments(&self) -> &[PaymentEntry] {
        &self.payments
    }
}

impl PaymentReconciled for ProductDraft {
    fn price(&self) -> Money {
        self.price
    }

    fn payments(&self) -> &[PaymentEntry] {
        &self.payments
    }
}

impl PaymentReconciled for RecordDraft {
    fn price(&self) -> Money {
        match self {
            Self::Service(s) => s.price,
            Self::Product(p) => p.price,
        }
    }

    fn payments(&self) -> &[PaymentEntry] {
        match self {
            Self::Service(s) => &s.payments,
            Self::Product(p) => &p.payments,
        }
    }
}

impl RecordDraft {
    /// Service or product.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Service(_) => RecordKind::Service,
            Self::Product(_) => RecordKind::Product,
        }
    }

    /// Target cycle.
    #[must_use]
    pub const fn cycle_id(&self) -> i64 {
        match self {
            Self::Service(s) => s.cycle_id,
            Self::Product(p) => p.cycle_id,
        }
    }

    /// Record date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        match self {
            Self::Service(s) => s.date,
            Self::Product(p) => p.date,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Service(s) => &s.name,
            Self::Product(p) => &p.name,
        }
    }

    fn tip(&self) -> Money {
        match self {
            Self::Service(s) => s.tip,
            Self::Product(_) => Money::ZERO,
        }
    }

    /// Runs every check that does not need the database.
    ///
    /// # Errors
    /// Returns the first violated [`ValidationError`].
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        self.validate_payments()?;

        if self.name().trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "Record name",
            });
        }

        let tip = self.tip();
        if tip.is_negative() {
            return Err(ValidationError::NegativeTip { tip });
        }

        Ok(())
    }

    fn write_into(&self, active: &mut record::ActiveModel) {
        let (customer, notes) = match self {
            Self::Service(s) => (s.customer.clone(), s.notes.clone()),
            Self::Product(p) => (None, p.notes.clone()),
        };
        active.kind = Set(self.kind());
        active.cycle_id = Set(self.cycle_id());
        active.name = Set(self.name().trim().to_string());
        active.customer = Set(customer);
        active.price_cents = Set(self.price().cents());
        active.tip_cents = Set(self.tip().cents());
        active.date = Set(format_date(self.date()));
        active.notes = Set(notes);
    }
}

/// A stored record together with its payment breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordWithPayments {
    /// The record row
    pub record: record::Model,
    /// Its payment rows
    pub payments: Vec<payment::Model>,
}

impl RecordWithPayments {
    /// Declared price.
    #[must_use]
    pub const fn price(&self) -> Money {
        Money::from_cents(self.record.price_cents)
    }

    /// Tip, zero for products.
    #[must_use]
    pub const fn tip(&self) -> Money {
        Money::from_cents(self.record.tip_cents)
    }

    /// Payment rows as domain entries.
    #[must_use]
    pub fn payment_entries(&self) -> Vec<PaymentEntry> {
        self.payments
            .iter()
            .map(|p| PaymentEntry {
                method: p.method,
                amount: Money::from_cents(p.amount_cents),
                label: p.label.clone(),
            })
            .collect()
    }
}

/// Result of an update: the new state and the cycle the record was filed under before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedRecord {
    /// The record after the update
    pub record: RecordWithPayments,
    /// Cycle id before the update
    pub previous_cycle_id: i64,
}

fn check_date_in_cycle(actor: &Actor, cycle: &cycle::Model, date: NaiveDate) -> Result<()> {
    if actor.is_admin() || cycle.contains(date) {
        return Ok(());
    }
    Err(ValidationError::DateOutsideCycle {
        date,
        cycle_name: cycle.name.clone(),
        start: cycle.start_date,
        end: cycle.end_date,
    }
    .into())
}

async fn insert_payments<C>(
    db: &C,
    record_id: i64,
    entries: &[PaymentEntry],
) -> Result<Vec<payment::Model>>
where
    C: ConnectionTrait,
{
    let mut inserted = Vec::with_capacity(entries.len());
    for entry in entries {
        let model = payment::ActiveModel {
            record_id: Set(record_id),
            method: Set(entry.method),
            amount_cents: Set(entry.amount.cents()),
            label: Set(entry
                .label
                .as_ref()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())),
            ..Default::default()
        };
        inserted.push(model.insert(db).await?);
    }
    Ok(inserted)
}

/// Creates a record owned by the acting user.
pub async fn create_record(
    db: &DatabaseConnection,
    actor: &Actor,
    draft: RecordDraft,
) -> Result<RecordWithPayments> {
    let owner = actor.user_id.clone();
    create_record_for(db, actor, &owner, draft).await
}

/// Creates a record owned by `owner_id`.
///
/// Only administrators may create records for someone else.
pub async fn create_record_for(
    db: &DatabaseConnection,
    actor: &Actor,
    owner_id: &str,
    draft: RecordDraft,
) -> Result<RecordWithPayments> {
    draft.validate()?;

    if !actor.can_modify(owner_id) {
        return Err(Error::Forbidden {
            user_id: actor.user_id.clone(),
            action: format!("create records for {owner_id}"),
        });
    }

    let txn = db.begin().await?;

    let cycle = require_cycle(&txn, draft.cycle_id()).await?;
    check_date_in_cycle(actor, &cycle, draft.date())?;

    let now = Utc::now().naive_utc();
    let mut active = record::ActiveModel {
        user_id: Set(owner_id.to_string()),
        created_by_admin: Set(actor.is_admin()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    draft.write_into(&mut active);

    let record = active.insert(&txn).await?;
    let payments = insert_payments(&txn, record.id, draft.payments()).await?;

    txn.commit().await?;

    info!(
        "Created {:?} record {} for {} in cycle {} ({})",
        record.kind,
        record.id,
        record.user_id,
        record.cycle_id,
        Money::from_cents(record.price_cents)
    );
    Ok(RecordWithPayments { record, payments })
}

/// Replaces the contents of an existing record, including its payment breakdown.
///
/// Stylists may only update their own records and may not move them to another
/// cycle; administrators may do both.
pub async fn update_record(
    db: &DatabaseConnection,
    actor: &Actor,
    record_id: i64,
    draft: RecordDraft,
) -> Result<UpdatedRecord> {
    draft.validate()?;

    let txn = db.begin().await?;

    let existing = Record::find_by_id(record_id)
        .one(&txn)
        .await?
        .ok_or(Error::RecordNotFound { id: record_id })?;

    if !actor.can_modify(&existing.user_id) {
        return Err(Error::Forbidden {
            user_id: actor.user_id.clone(),
            action: format!("update record {record_id}"),
        });
    }

    let previous_cycle_id = existing.cycle_id;
    if draft.cycle_id() != previous_cycle_id && !actor.is_admin() {
        return Err(Error::Forbidden {
            user_id: actor.user_id.clone(),
            action: format!("move record {record_id} to another cycle"),
        });
    }

    let cycle = require_cycle(&txn, draft.cycle_id()).await?;
    check_date_in_cycle(actor, &cycle, draft.date())?;

    let mut active: record::ActiveModel = existing.into();
    draft.write_into(&mut active);
    active.created_by_admin = Set(actor.is_admin());
    active.updated_at = Set(Utc::now().naive_utc());
    let record = active.update(&txn).await?;

    Payment::delete_many()
        .filter(payment::Column::RecordId.eq(record_id))
        .exec(&txn)
        .await?;
    let payments = insert_payments(&txn, record_id, draft.payments()).await?;

    txn.commit().await?;

    debug!(
        "Updated record {record_id} (cycle {previous_cycle_id} -> {})",
        record.cycle_id
    );
    Ok(UpdatedRecord {
        record: RecordWithPayments { record, payments },
        previous_cycle_id,
    })
}

/// Permanently deletes a record and its payments, returning the deleted row.
pub async fn delete_record(
    db: &DatabaseConnection,
    actor: &Actor,
    record_id: i64,
) -> Result<record::Model> {
    let txn = db.begin().await?;

    let existing = Record::find_by_id(record_id)
        .one(&txn)
        .await?
        .ok_or(Error::RecordNotFound { id: record_id })?;

    if !actor.can_modify(&existing.user_id) {
        return Err(Error::Forbidden {
            user_id: actor.user_id.clone(),
            action: format!("delete record {record_id}"),
        });
    }

    Payment::delete_many()
        .filter(payment::Column::RecordId.eq(record_id))
        .exec(&txn)
        .await?;
    existing.clone().delete(&txn).await?;

    txn.commit().await?;
    info!("Deleted record {record_id}");
    Ok(existing)
}

/// Retrieves a record and its payments by id.
pub async fn get_record(
    db: &DatabaseConnection,
    record_id: i64,
) -> Result<Option<RecordWithPayments>> {
    let found = Record::find_by_id(record_id)
        .find_with_related(Payment)
        .all(db)
        .await?;
    Ok(found
        .into_iter()
        .next()
        .map(|(record, payments)| RecordWithPayments { record, payments }))
}

/// All records filed under a cycle, oldest first.
pub async fn list_records_by_cycle<C>(db: &C, cycle_id: i64) -> Result<Vec<RecordWithPayments>>
where
    C: ConnectionTrait,
{
    let rows = Record::find()
        .filter(record::Column::CycleId.eq(cycle_id))
        .order_by_asc(record::Column::Date)
        .order_by_asc(record::Column::Id)
        .find_with_related(Payment)
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(record, payments)| RecordWithPayments { record, payments })
        .collect())
}

/// A single stylist's records within a cycle, oldest first.
pub async fn list_records_by_user<C>(
    db: &C,
    user_id: &str,
    cycle_id: i64,
) -> Result<Vec<RecordWithPayments>>
where
    C: ConnectionTrait,
{
    let rows = Record::find()
        .filter(record::Column::CycleId.eq(cycle_id))
        .filter(record::Column::UserId.eq(user_id))
        .order_by_asc(record::Column::Date)
        .order_by_asc(record::Column::Id)
        .find_with_related(Payment)
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(record, payments)| RecordWithPayments { record, payments })
        .collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::money::PaymentMethod;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_service_in_range() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let draft = service_draft(
            cycle.id,
            ymd(2025, 6, 10),
            6000,
            vec![card(4000), cash(2000)],
        );

        let created = create_record(&db, &stylist("stylist-1"), draft).await?;
        assert_eq!(created.record.kind, RecordKind::Service);
        assert_eq!(created.record.user_id, "stylist-1");
        assert_eq!(created.record.date, "2025-06-10");
        assert_eq!(created.price(), Money::from_cents(6000));
        assert_eq!(created.payments.len(), 2);
        assert!(!created.record.created_by_admin);

        let fetched = get_record(&db, created.record.id).await?.unwrap();
        assert_eq!(fetched.record, created.record);
        assert_eq!(fetched.payment_entries().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_mismatched_payments_write_nothing() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let draft = service_draft(
            cycle.id,
            ymd(2025, 6, 10),
            5000,
            vec![cash(2000), card(2999)],
        );

        let result = create_record(&db, &stylist("stylist-1"), draft).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::PaymentSumMismatch { .. }))
        ));
        assert!(list_records_by_cycle(&db, cycle.id).await?.is_empty());
        assert_eq!(Payment::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_stylist_date_outside_cycle_rejected_admin_accepted() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let draft = service_draft(cycle.id, ymd(2025, 6, 20), 6000, vec![card(6000)]);

        let rejected = create_record(&db, &stylist("stylist-1"), draft.clone()).await;
        assert!(matches!(
            rejected,
            Err(Error::Validation(ValidationError::DateOutsideCycle { .. }))
        ));

        let accepted = create_record_for(&db, &admin(), "stylist-1", draft).await?;
        assert!(accepted.record.created_by_admin);
        assert_eq!(accepted.record.user_id, "stylist-1");
        assert_eq!(accepted.record.cycle_id, cycle.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_cycle_is_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        let draft = product_draft(42, ymd(2025, 6, 10), 1500, vec![cash(1500)]);
        let result = create_record(&db, &stylist("stylist-1"), draft).await;
        assert!(matches!(result, Err(Error::CycleNotFound { id: 42 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_stylist_cannot_create_for_someone_else() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let draft = product_draft(cycle.id, ymd(2025, 6, 10), 1500, vec![cash(1500)]);
        let result = create_record_for(&db, &stylist("stylist-1"), "stylist-2", draft).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_product_drops_tip_and_customer() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let draft = product_draft(cycle.id, ymd(2025, 6, 3), 2250, vec![zelle(2250)]);
        let created = create_record(&db, &stylist("stylist-1"), draft).await?;
        assert_eq!(created.record.kind, RecordKind::Product);
        assert_eq!(created.record.tip_cents, 0);
        assert!(created.record.customer.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_name_and_negative_tip_rejected() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;

        let mut unnamed = service_draft(cycle.id, ymd(2025, 6, 10), 1000, vec![cash(1000)]);
        if let RecordDraft::Service(s) = &mut unnamed {
            s.name = "   ".to_string();
        }
        let result = create_record(&db, &stylist("stylist-1"), unnamed).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::EmptyField { .. }))
        ));

        let mut tipped = service_draft(cycle.id, ymd(2025, 6, 10), 1000, vec![cash(1000)]);
        if let RecordDraft::Service(s) = &mut tipped {
            s.tip = Money::from_cents(-500);
        }
        let result = create_record(&db, &stylist("stylist-1"), tipped).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::NegativeTip { .. }))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_replaces_payments() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let created = create_test_service(&db, &cycle, "stylist-1", ymd(2025, 6, 10), 6000).await?;

        let draft = service_draft(
            cycle.id,
            ymd(2025, 6, 11),
            8000,
            vec![cash(5000), PaymentEntry::other(Money::from_cents(3000), "gift card")],
        );
        let updated = update_record(&db, &stylist("stylist-1"), created.record.id, draft).await?;

        assert_eq!(updated.previous_cycle_id, cycle.id);
        assert_eq!(updated.record.record.price_cents, 8000);
        assert_eq!(updated.record.record.date, "2025-06-11");
        let methods: Vec<PaymentMethod> =
            updated.record.payments.iter().map(|p| p.method).collect();
        assert_eq!(methods, vec![PaymentMethod::Cash, PaymentMethod::Other]);
        assert_eq!(
            updated.record.payments[1].label.as_deref(),
            Some("gift card")
        );
        assert_eq!(Payment::find().count(&db).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_invalid_keeps_original() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let created = create_test_service(&db, &cycle, "stylist-1", ymd(2025, 6, 10), 6000).await?;

        let draft = service_draft(cycle.id, ymd(2025, 6, 10), 7000, vec![cash(6000)]);
        let result = update_record(&db, &stylist("stylist-1"), created.record.id, draft).await;
        assert!(result.is_err());

        let unchanged = get_record(&db, created.record.id).await?.unwrap();
        assert_eq!(unchanged, created);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_ownership_and_reassignment() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let other = create_test_cycle(&db, "B", ymd(2025, 6, 15), ymd(2025, 6, 28)).await?;
        let created = create_test_service(&db, &cycle, "stylist-1", ymd(2025, 6, 10), 6000).await?;

        let same_cycle = service_draft(cycle.id, ymd(2025, 6, 10), 6000, vec![card(6000)]);
        let result =
            update_record(&db, &stylist("stylist-2"), created.record.id, same_cycle).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));

        let moved = service_draft(other.id, ymd(2025, 6, 16), 6000, vec![card(6000)]);
        let result =
            update_record(&db, &stylist("stylist-1"), created.record.id, moved.clone()).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));

        let updated = update_record(&db, &admin(), created.record.id, moved).await?;
        assert_eq!(updated.previous_cycle_id, cycle.id);
        assert_eq!(updated.record.record.cycle_id, other.id);
        assert_eq!(updated.record.record.user_id, "stylist-1");
        Ok(())
    }

    #[tokio::test]
    async fn test_update_missing_record() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let draft = service_draft(cycle.id, ymd(2025, 6, 10), 6000, vec![card(6000)]);
        let result = update_record(&db, &admin(), 404, draft).await;
        assert!(matches!(result, Err(Error::RecordNotFound { id: 404 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_record_removes_payments() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let created = create_test_service(&db, &cycle, "stylist-1", ymd(2025, 6, 10), 6000).await?;

        let forbidden = delete_record(&db, &stylist("stylist-2"), created.record.id).await;
        assert!(matches!(forbidden, Err(Error::Forbidden { .. })));

        let deleted = delete_record(&db, &stylist("stylist-1"), created.record.id).await?;
        assert_eq!(deleted.id, created.record.id);
        assert!(get_record(&db, created.record.id).await?.is_none());
        assert_eq!(Payment::find().count(&db).await?, 0);

        let again = delete_record(&db, &stylist("stylist-1"), created.record.id).await;
        assert!(matches!(again, Err(Error::RecordNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_by_cycle_and_user() -> Result<()> {
        let (db, cycle) = setup_with_cycle().await?;
        let other = create_test_cycle(&db, "B", ymd(2025, 6, 15), ymd(2025, 6, 28)).await?;

        let later = create_test_service(&db, &cycle, "stylist-1", ymd(2025, 6, 12), 1000).await?;
        let earlier = create_test_service(&db, &cycle, "stylist-2", ymd(2025, 6, 2), 2000).await?;
        create_test_service(&db, &other, "stylist-1", ymd(2025, 6, 20), 3000).await?;

        let in_cycle = list_records_by_cycle(&db, cycle.id).await?;
        let ids: Vec<i64> = in_cycle.iter().map(|r| r.record.id).collect();
        assert_eq!(ids, vec![earlier.record.id, later.record.id]);
        assert!(in_cycle.iter().all(|r| r.payments.len() == 1));

        let mine = list_records_by_user(&db, "stylist-1", cycle.id).await?;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].record.id, later.record.id);

        assert!(list_records_by_user(&db, "nobody", cycle.id).await?.is_empty());
        Ok(())
    }
}
