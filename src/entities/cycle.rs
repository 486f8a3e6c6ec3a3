//! Cycle entity - A named, inclusive date range that buckets records for reporting.
//!
//! Cycles are normally two weeks long. Nothing structurally prevents two cycles
//! from overlapping, so lookups by date may return several rows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Cycle database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cycles")]
pub struct Model {
    /// Unique identifier for the cycle
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g., "June 1 - June 14")
    pub name: String,
    /// First day of the cycle, inclusive
    pub start_date: Date,
    /// Last day of the cycle, inclusive
    pub end_date: Date,
    /// Optional administrator notes
    pub notes: Option<String>,
    /// When the cycle was created
    pub created_at: DateTime,
    /// When the cycle was last modified
    pub updated_at: DateTime,
}

impl Model {
    /// Whether `date` falls within `[start_date, end_date]`.
    #[must_use]
    pub fn contains(&self, date: Date) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Whether this cycle shares at least one day with `other`.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start_date <= other.end_date && other.start_date <= self.end_date
    }
}

/// Defines relationships between Cycle and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One cycle has many records
    #[sea_orm(has_many = "super::record::Entity")]
    Records,
}

impl Related<super::record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
