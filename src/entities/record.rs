//! Record entity - A service or product sold by a stylist within a cycle.
//!
//! Money columns hold integer cents. `date` is kept as text because rows written
//! by older clients may carry a full datetime; new rows always store `YYYY-MM-DD`.
//! The payment breakdown lives in the `payments` table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether a record is a service or a product sale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// A service performed for a customer
    #[sea_orm(string_value = "service")]
    Service,
    /// A retail product sale
    #[sea_orm(string_value = "product")]
    Product,
}

/// Record database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "records")]
pub struct Model {
    /// Unique identifier for the record
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Service or product
    pub kind: RecordKind,
    /// Stylist who owns the record
    pub user_id: String,
    /// Cycle the record is filed under
    pub cycle_id: i64,
    /// Service or product name
    pub name: String,
    /// Customer name, services only
    pub customer: Option<String>,
    /// Total price in cents
    pub price_cents: i64,
    /// Tip in cents, always zero for products
    pub tip_cents: i64,
    /// Record date as text
    pub date: String,
    /// Free-form notes
    pub notes: Option<String>,
    /// Whether an administrator authored the last write (date-range check skipped)
    pub created_by_admin: bool,
    /// When the record was created
    pub created_at: DateTime,
    /// When the record was last modified
    pub updated_at: DateTime,
}

/// Defines relationships between Record and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each record belongs to one cycle
    #[sea_orm(
        belongs_to = "super::cycle::Entity",
        from = "Column::CycleId",
        to = "super::cycle::Column::Id"
    )]
    Cycle,
    /// One record has many payment entries
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::cycle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cycle.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
