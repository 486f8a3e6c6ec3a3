//! Payment entity - One method/amount line of a record's payment breakdown.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::money::PaymentMethod;

/// Payment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment line
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Record this payment settles
    pub record_id: i64,
    /// How the customer paid
    pub method: PaymentMethod,
    /// Amount in cents
    pub amount_cents: i64,
    /// Description for `other` payments
    pub label: Option<String>,
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment belongs to one record
    #[sea_orm(
        belongs_to = "super::record::Entity",
        from = "Column::RecordId",
        to = "super::record::Column::Id",
        on_delete = "Cascade"
    )]
    Record,
}

impl Related<super::record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Record.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
