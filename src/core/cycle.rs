//! Cycle business logic - Stores named date ranges and resolves dates to cycles.
//!
//! Cycles may overlap, so a date can fall into zero, one or several cycles.
//! [`match_cycle`] is the single place that decides which one wins; both record
//! filing and the migration engine go through it.

use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    entities::{Cycle, Record, cycle, record},
    errors::{Error, Result, ValidationError},
};

/// How "the current cycle" is chosen when several cycles contain today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentCyclePolicy {
    /// The cycle that started most recently; ties go to the newest cycle.
    #[default]
    LatestStart,
    /// The cycle that started first; ties go to the oldest cycle.
    EarliestStart,
    /// Refuse to guess and return [`Error::AmbiguousCycle`].
    RejectAmbiguous,
}

/// Outcome of resolving a record date against the known cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleMatch<'a> {
    /// No cycle contains the date.
    Unassignable,
    /// Exactly one cycle contains the date.
    Unique(&'a cycle::Model),
    /// Several cycles contain the date.
    Ambiguous {
        /// The cycle selected by the tie-break
        chosen: &'a cycle::Model,
        /// Ids of all matching cycles, chronologically ordered
        candidates: Vec<i64>,
        /// `true` when the record's current cycle was among the matches and was kept
        kept_current: bool,
    },
}

impl<'a> CycleMatch<'a> {
    /// The selected cycle, if any.
    #[must_use]
    pub const fn chosen(&self) -> Option<&'a cycle::Model> {
        match self {
            Self::Unassignable => None,
            Self::Unique(c) | Self::Ambiguous { chosen: c, .. } => Some(*c),
        }
    }
}

/// Partial update for a cycle; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CycleUpdate {
    /// New name
    pub name: Option<String>,
    /// New start date
    pub start_date: Option<NaiveDate>,
    /// New end date
    pub end_date: Option<NaiveDate>,
    /// New notes; `Some(None)` clears them
    pub notes: Option<Option<String>>,
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(ValidationError::InvalidDateRange { start, end }.into());
    }
    Ok(())
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "Cycle name" }.into());
    }
    Ok(())
}

/// Every cycle in `cycles` that contains `date`, earliest start first.
#[must_use]
pub fn matching_cycles(cycles: &[cycle::Model], date: NaiveDate) -> Vec<&cycle::Model> {
    let mut matches: Vec<&cycle::Model> = cycles.iter().filter(|c| c.contains(date)).collect();
    matches.sort_by_key(|c| (c.start_date, c.id));
    matches
}

/// Resolves `date` to a cycle, applying the overlap tie-break.
///
/// With several matches the record's current cycle is kept when it is one of
/// them; otherwise the chronologically first match (earliest start, then lowest
/// id) is chosen and the result is flagged for review by the caller.
#[must_use]
pub fn match_cycle(
    cycles: &[cycle::Model],
    date: NaiveDate,
    current_cycle_id: Option<i64>,
) -> CycleMatch<'_> {
    let matches = matching_cycles(cycles, date);
    match matches.as_slice() {
        [] => CycleMatch::Unassignable,
        [only] => CycleMatch::Unique(*only),
        [first, ..] => {
            let candidates = matches.iter().map(|c| c.id).collect();
            let current = current_cycle_id
                .and_then(|id| matches.iter().copied().find(|c| c.id == id));
            match current {
                Some(kept) => CycleMatch::Ambiguous {
                    chosen: kept,
                    candidates,
                    kept_current: true,
                },
                None => CycleMatch::Ambiguous {
                    chosen: *first,
                    candidates,
                    kept_current: false,
                },
            }
        }
    }
}

/// Picks the current cycle out of the cycles containing today.
///
/// Returns `Ok(None)` when `matches` is empty.
///
/// # Errors
/// Returns [`Error::AmbiguousCycle`] when `policy` is
/// [`CurrentCyclePolicy::RejectAmbiguous`] and more than one cycle matches.
pub fn select_current(
    today: NaiveDate,
    mut matches: Vec<cycle::Model>,
    policy: CurrentCyclePolicy,
) -> Result<Option<cycle::Model>> {
    if matches.len() > 1 {
        warn!(
            "{} cycles contain {today}; resolving with {policy:?}",
            matches.len()
        );
    }
    match policy {
        CurrentCyclePolicy::LatestStart => {
            Ok(matches.into_iter().max_by_key(|c| (c.start_date, c.id)))
        }
        CurrentCyclePolicy::EarliestStart => {
            Ok(matches.into_iter().min_by_key(|c| (c.start_date, c.id)))
        }
        CurrentCyclePolicy::RejectAmbiguous => {
            if matches.len() > 1 {
                return Err(Error::AmbiguousCycle {
                    date: today,
                    cycle_ids: matches.iter().map(|c| c.id).collect(),
                });
            }
            Ok(matches.pop())
        }
    }
}

/// Creates a new cycle after checking that `start_date <= end_date`.
pub async fn create_cycle(
    db: &DatabaseConnection,
    name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    notes: Option<String>,
) -> Result<cycle::Model> {
    check_name(&name)?;
    check_range(start_date, end_date)?;

    let now = Utc::now().naive_utc();
    let model = cycle::ActiveModel {
        name: Set(name.trim().to_string()),
        start_date: Set(start_date),
        end_date: Set(end_date),
        notes: Set(notes),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let created = model.insert(db).await?;
    info!(
        "Created cycle {} '{}' ({} to {})",
        created.id, created.name, created.start_date, created.end_date
    );
    Ok(created)
}

/// Retrieves a cycle by id, returning None if it does not exist.
pub async fn get_cycle_by_id<C>(db: &C, cycle_id: i64) -> Result<Option<cycle::Model>>
where
    C: ConnectionTrait,
{
    Cycle::find_by_id(cycle_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a cycle by id, failing with [`Error::CycleNotFound`] if missing.
pub async fn require_cycle<C>(db: &C, cycle_id: i64) -> Result<cycle::Model>
where
    C: ConnectionTrait,
{
    get_cycle_by_id(db, cycle_id)
        .await?
        .ok_or(Error::CycleNotFound { id: cycle_id })
}

/// Lists every cycle, earliest start first.
pub async fn list_cycles<C>(db: &C) -> Result<Vec<cycle::Model>>
where
    C: ConnectionTrait,
{
    Cycle::find()
        .order_by_asc(cycle::Column::StartDate)
        .order_by_asc(cycle::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Returns all cycles whose inclusive range contains `date`, earliest start first.
pub async fn find_cycles_containing(
    db: &DatabaseConnection,
    date: NaiveDate,
) -> Result<Vec<cycle::Model>> {
    Cycle::find()
        .filter(cycle::Column::StartDate.lte(date))
        .filter(cycle::Column::EndDate.gte(date))
        .order_by_asc(cycle::Column::StartDate)
        .order_by_asc(cycle::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Resolves the cycle active on `today` according to `policy`.
///
/// Returns `Ok(None)` when no cycle contains today.
///
/// # Errors
/// See [`select_current`].
pub async fn resolve_current(
    db: &DatabaseConnection,
    today: NaiveDate,
    policy: CurrentCyclePolicy,
) -> Result<Option<cycle::Model>> {
    let matches = find_cycles_containing(db, today).await?;
    select_current(today, matches, policy)
}

/// Applies a partial update, re-checking the merged date range.
pub async fn update_cycle(
    db: &DatabaseConnection,
    cycle_id: i64,
    changes: CycleUpdate,
) -> Result<cycle::Model> {
    let existing = require_cycle(db, cycle_id).await?;

    let start = changes.start_date.unwrap_or(existing.start_date);
    let end = changes.end_date.unwrap_or(existing.end_date);
    check_range(start, end)?;

    let mut active: cycle::ActiveModel = existing.into();
    if let Some(name) = changes.name {
        check_name(&name)?;
        active.name = Set(name.trim().to_string());
    }
    active.start_date = Set(start);
    active.end_date = Set(end);
    if let Some(notes) = changes.notes {
        active.notes = Set(notes);
    }
    active.updated_at = Set(Utc::now().naive_utc());

    let updated = active.update(db).await?;
    debug!("Updated cycle {cycle_id}");
    Ok(updated)
}

/// Deletes a cycle that no record references.
///
/// # Errors
/// Returns [`Error::CycleInUse`] while records are still filed under the cycle.
pub async fn delete_cycle(db: &DatabaseConnection, cycle_id: i64) -> Result<()> {
    let existing = require_cycle(db, cycle_id).await?;

    let record_count = Record::find()
        .filter(record::Column::CycleId.eq(cycle_id))
        .count(db)
        .await?;
    if record_count > 0 {
        return Err(Error::CycleInUse {
            id: cycle_id,
            record_count,
        });
    }

    existing.delete(db).await?;
    info!("Deleted cycle {cycle_id}");
    Ok(())
}

/// Other cycles sharing at least one day with the given cycle.
pub async fn find_overlapping_cycles(
    db: &DatabaseConnection,
    cycle_id: i64,
) -> Result<Vec<cycle::Model>> {
    let target = require_cycle(db, cycle_id).await?;
    Cycle::find()
        .filter(cycle::Column::Id.ne(cycle_id))
        .filter(cycle::Column::StartDate.lte(target.end_date))
        .filter(cycle::Column::EndDate.gte(target.start_date))
        .order_by_asc(cycle::Column::StartDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Every unordered pair of overlapping cycles, for data-quality review.
pub async fn overlapping_pairs(
    db: &DatabaseConnection,
) -> Result<Vec<(cycle::Model, cycle::Model)>> {
    let cycles = list_cycles(db).await?;
    let mut pairs = Vec::new();
    for (i, a) in cycles.iter().enumerate() {
        for b in cycles.iter().skip(i + 1) {
            if a.overlaps(b) {
                pairs.push((a.clone(), b.clone()));
            }
        }
    }
    Ok(pairs)
}
