//! Cycle migration - Re-files every record under the cycle matching its date.
//!
//! Cycles are often created or edited after stylists have already logged
//! records, and records are sometimes filed under the wrong cycle. This batch job
//! walks the whole record store, resolves each record date against the cycle
//! table and moves records whose assignment is wrong.
//!
//! The run is all-or-nothing:
//!
//! 1. a JSON snapshot of cycles, records and payments is written first
//! 2. every record is planned in memory with [`plan_migration`]
//! 3. if malformed plus unassignable records exceed the configured share of all
//!    records, the run aborts with [`Error::IntegrityAbort`] and nothing changes
//! 4. otherwise all reassignments are committed in a single transaction
//!
//! Running it again right after a clean pass moves nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{DatabaseTransaction, QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    config::settings::{DEFAULT_MAX_ERROR_RATE, MigrationSettings},
    core::{
        cycle::{CycleMatch, list_cycles, match_cycle},
        dates::normalize_record_date,
    },
    entities::{Payment, Record, SystemState, cycle, payment, record, system_state},
    errors::{Error, Result},
};

const LAST_CYCLE_MIGRATION_KEY: &str = "last_cycle_migration";

/// Knobs for a migration run.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOptions {
    /// Compute the report but roll everything back
    pub dry_run: bool,
    /// Directory for the pre-run snapshot; no snapshot when `None`
    pub backup_dir: Option<PathBuf>,
    /// Abort when `(malformed + unassignable) / total` is above this fraction
    pub max_error_rate: f64,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup_dir: None,
            max_error_rate: DEFAULT_MAX_ERROR_RATE,
        }
    }
}

impl MigrationOptions {
    /// Options taken from the `[migration]` config section.
    #[must_use]
    pub fn from_settings(settings: &MigrationSettings) -> Self {
        Self {
            dry_run: false,
            backup_dir: settings.backup_dir.clone(),
            max_error_rate: settings.max_error_rate,
        }
    }
}

/// A record that moved to a different cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reassignment {
    /// Record id
    pub record_id: i64,
    /// Owner of the record
    pub user_id: String,
    /// Normalized record date
    pub date: NaiveDate,
    /// Cycle before the run
    pub from_cycle_id: i64,
    /// Cycle after the run
    pub to_cycle_id: i64,
}

/// A record whose date fell into more than one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousMatch {
    /// Record id
    pub record_id: i64,
    /// Normalized record date
    pub date: NaiveDate,
    /// Every matching cycle, chronologically
    pub candidates: Vec<i64>,
    /// Cycle the tie-break chose
    pub resolved_to: i64,
    /// `true` when the record stayed in its current cycle
    pub kept_current: bool,
}

impl AmbiguousMatch {
    /// Whether someone should confirm the tie-break's choice.
    #[must_use]
    pub const fn needs_review(&self) -> bool {
        !self.kept_current
    }
}

/// A record whose date is in no cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnassignableRecord {
    /// Record id
    pub record_id: i64,
    /// Normalized record date
    pub date: NaiveDate,
    /// Cycle the record remains filed under
    pub current_cycle_id: i64,
}

/// A record whose date could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRecord {
    /// Record id
    pub record_id: i64,
    /// The stored value
    pub raw_date: String,
}

/// Everything a run found and did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    /// Records examined
    pub total_records: usize,
    /// Records moved to another cycle
    pub moved: Vec<Reassignment>,
    /// Ids of records already in the right cycle
    pub unchanged: Vec<i64>,
    /// Records matching several cycles (also counted as moved or unchanged)
    pub ambiguous: Vec<AmbiguousMatch>,
    /// Records matching no cycle, left untouched
    pub unassignable: Vec<UnassignableRecord>,
    /// Records with a missing or unreadable date, left untouched
    pub malformed: Vec<MalformedRecord>,
    /// Snapshot written before the run
    pub backup_path: Option<PathBuf>,
    /// Whether the run was rolled back on purpose
    pub dry_run: bool,
    /// When the run started
    pub started_at: DateTime<Utc>,
}

impl MigrationReport {
    /// Number of records moved.
    #[must_use]
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }

    /// Number of records left where they were.
    #[must_use]
    pub fn unchanged_count(&self) -> usize {
        self.unchanged.len()
    }

    /// Number of records matching several cycles.
    #[must_use]
    pub fn ambiguous_count(&self) -> usize {
        self.ambiguous.len()
    }

    /// Malformed plus unassignable records.
    #[must_use]
    pub fn errored_count(&self) -> usize {
        self.malformed.len() + self.unassignable.len()
    }

    /// Share of records that could not be placed, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // counts are far below 2^52
    pub fn error_rate(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        self.errored_count() as f64 / self.total_records as f64
    }

    /// Whether the error rate is above `max_error_rate`.
    #[must_use]
    pub fn exceeds(&self, max_error_rate: f64) -> bool {
        self.error_rate() > max_error_rate
    }
}

/// Decides, without touching the database, where every record belongs.
#[must_use]
pub fn plan_migration(
    cycles: &[cycle::Model],
    records: &[record::Model],
    started_at: DateTime<Utc>,
) -> MigrationReport {
    let mut report = MigrationReport {
        total_records: records.len(),
        moved: Vec::new(),
        unchanged: Vec::new(),
        ambiguous: Vec::new(),
        unassignable: Vec::new(),
        malformed: Vec::new(),
        backup_path: None,
        dry_run: false,
        started_at,
    };

    for rec in records {
        let Some(date) = normalize_record_date(&rec.date) else {
            warn!("Record {} has an unreadable date {:?}", rec.id, rec.date);
            report.malformed.push(MalformedRecord {
                record_id: rec.id,
                raw_date: rec.date.clone(),
            });
            continue;
        };

        let matched = match_cycle(cycles, date, Some(rec.cycle_id));
        let chosen = match &matched {
            CycleMatch::Unassignable => {
                warn!("Record {} dated {date} matches no cycle", rec.id);
                report.unassignable.push(UnassignableRecord {
                    record_id: rec.id,
                    date,
                    current_cycle_id: rec.cycle_id,
                });
                continue;
            }
            CycleMatch::Unique(c) => *c,
            CycleMatch::Ambiguous {
                chosen,
                candidates,
                kept_current,
            } => {
                if *kept_current {
                    info!(
                        "Record {} dated {date} matches cycles {candidates:?}; kept current cycle {}",
                        rec.id, chosen.id
                    );
                } else {
                    warn!(
                        "Record {} dated {date} matches cycles {candidates:?}; chose {} for review",
                        rec.id, chosen.id
                    );
                }
                report.ambiguous.push(AmbiguousMatch {
                    record_id: rec.id,
                    date,
                    candidates: candidates.clone(),
                    resolved_to: chosen.id,
                    kept_current: *kept_current,
                });
                *chosen
            }
        };

        if chosen.id == rec.cycle_id {
            report.unchanged.push(rec.id);
        } else {
            info!(
                "Record {} dated {date}: cycle {} -> {}",
                rec.id, rec.cycle_id, chosen.id
            );
            report.moved.push(Reassignment {
                record_id: rec.id,
                user_id: rec.user_id.clone(),
                date,
                from_cycle_id: rec.cycle_id,
                to_cycle_id: chosen.id,
            });
        }
    }

    report
}

#[derive(Serialize)]
struct Snapshot<'a> {
    taken_at: DateTime<Utc>,
    cycles: &'a [cycle::Model],
    records: &'a [record::Model],
    payments: &'a [payment::Model],
}

/// Writes a JSON snapshot of the store and returns its path.
///
/// The file is written under a temporary name and renamed into place, so a
/// snapshot on disk is always complete.
async fn write_snapshot(
    txn: &DatabaseTransaction,
    dir: &Path,
    taken_at: DateTime<Utc>,
    cycles: &[cycle::Model],
    records: &[record::Model],
) -> Result<PathBuf> {
    let payments = Payment::find()
        .order_by_asc(payment::Column::Id)
        .all(txn)
        .await?;
    let snapshot = Snapshot {
        taken_at,
        cycles,
        records,
        payments: &payments,
    };
    let body = serde_json::to_vec_pretty(&snapshot)?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "cycle-migration-{}.json",
        taken_at.format("%Y%m%dT%H%M%S%.3fZ")
    ));
    let partial = path.with_extension("json.partial");
    tokio::fs::write(&partial, body).await?;
    tokio::fs::rename(&partial, &path).await?;

    info!("Wrote pre-migration snapshot to {}", path.display());
    Ok(path)
}

/// Runs the migration over the whole record store.
///
/// # Errors
/// Returns [`Error::IntegrityAbort`] (after rolling back) when too many records
/// cannot be placed, or any database / filesystem error; in every error case no
/// reassignment is committed.
pub async fn run_cycle_migration(
    db: &DatabaseConnection,
    options: &MigrationOptions,
) -> Result<MigrationReport> {
    let started_at = Utc::now();
    info!(
        "Starting cycle migration (dry run: {}, max error rate: {:.1}%)",
        options.dry_run,
        options.max_error_rate * 100.0
    );

    let txn = db.begin().await?;

    let cycles = list_cycles(&txn).await?;
    let records = Record::find()
        .order_by_asc(record::Column::Id)
        .all(&txn)
        .await?;

    let backup_path = match (&options.backup_dir, options.dry_run) {
        (Some(dir), false) => {
            Some(write_snapshot(&txn, dir, started_at, &cycles, &records).await?)
        }
        _ => None,
    };

    let mut report = plan_migration(&cycles, &records, started_at);
    report.backup_path = backup_path;
    report.dry_run = options.dry_run;

    if report.exceeds(options.max_error_rate) {
        txn.rollback().await?;
        if options.dry_run {
            warn!(
                "Dry run: {} of {} records could not be placed; a real run would abort",
                report.errored_count(),
                report.total_records
            );
            return Ok(report);
        }
        error!(
            "Aborting cycle migration: {} malformed and {} unassignable of {} records",
            report.malformed.len(),
            report.unassignable.len(),
            report.total_records
        );
        return Err(Error::IntegrityAbort {
            errored: report.errored_count(),
            total: report.total_records,
            max_error_rate: options.max_error_rate,
        });
    }

    if options.dry_run {
        txn.rollback().await?;
        info!(
            "Dry run complete: {} would move, {} unchanged",
            report.moved_count(),
            report.unchanged_count()
        );
        return Ok(report);
    }

    let now = started_at.naive_utc();
    let by_id: HashMap<i64, &record::Model> = records.iter().map(|r| (r.id, r)).collect();
    for change in &report.moved {
        let rec = by_id
            .get(&change.record_id)
            .copied()
            .ok_or(Error::RecordNotFound {
                id: change.record_id,
            })?;
        let mut active: record::ActiveModel = rec.clone().into();
        active.cycle_id = Set(change.to_cycle_id);
        active.updated_at = Set(now);
        active.update(&txn).await?;
    }

    set_last_cycle_migration(&txn, started_at).await?;

    // All reassignments succeed or none do
    txn.commit().await?;

    info!(
        "Cycle migration committed: {} moved, {} unchanged, {} ambiguous, {} errored",
        report.moved_count(),
        report.unchanged_count(),
        report.ambiguous_count(),
        report.errored_count()
    );
    Ok(report)
}

/// When the last committed migration started, if one ever ran.
pub async fn get_last_cycle_migration<C>(db: &C) -> Result<Option<DateTime<Utc>>>
where
    C: ConnectionTrait,
{
    let state = SystemState::find()
        .filter(system_state::Column::Key.eq(LAST_CYCLE_MIGRATION_KEY))
        .one(db)
        .await?;

    state
        .map(|s| {
            DateTime::parse_from_rfc3339(&s.value)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| Error::Config {
                    message: format!("Failed to parse last migration timestamp: {e}"),
                })
        })
        .transpose()
}

async fn set_last_cycle_migration<C>(db: &C, at: DateTime<Utc>) -> Result<()>
where
    C: ConnectionTrait,
{
    let value = at.to_rfc3339();
    let now = Utc::now().naive_utc();

    let existing = SystemState::find()
        .filter(system_state::Column::Key.eq(LAST_CYCLE_MIGRATION_KEY))
        .one(db)
        .await?;

    if let Some(state) = existing {
        let mut active: system_state::ActiveModel = state.into();
        active.value = Set(value);
        active.updated_at = Set(now);
        active.update(db).await?;
    } else {
        let new_state = system_state::ActiveModel {
            key: Set(LAST_CYCLE_MIGRATION_KEY.to_string()),
            value: Set(value),
            updated_at: Set(now),
            ..Default::default()
        };
        new_state.insert(db).await?;
    }

    Ok(())
}

/// Formats a report into a human-readable audit summary.
#[must_use]
pub fn format_migration_summary(report: &MigrationReport) -> String {
    use std::fmt::Write;

    let mode = if report.dry_run { " (dry run)" } else { "" };
    let mut summary = format!(
        "Cycle migration{mode} - {} - {} records\n",
        report.started_at.format("%Y-%m-%d %H:%M UTC"),
        report.total_records
    );

    // Writing to a String cannot fail
    let _ = writeln!(
        summary,
        "  Moved: {} | Unchanged: {} | Ambiguous: {} | Errored: {}",
        report.moved_count(),
        report.unchanged_count(),
        report.ambiguous_count(),
        report.errored_count()
    );
    if let Some(path) = &report.backup_path {
        let _ = writeln!(summary, "  Snapshot: {}", path.display());
    }

    if !report.moved.is_empty() {
        summary.push_str("\nMoved:\n");
        for m in &report.moved {
            let _ = writeln!(
                summary,
                "  record {} ({}, {}) cycle {} -> {}",
                m.record_id, m.user_id, m.date, m.from_cycle_id, m.to_cycle_id
            );
        }
    }

    if !report.ambiguous.is_empty() {
        summary.push_str("\nMultiple matching cycles:\n");
        for a in &report.ambiguous {
            let outcome = if a.kept_current {
                "resolved to current assignment"
            } else {
                "resolved to earliest match, needs review"
            };
            let _ = writeln!(
                summary,
                "  record {} ({}) cycles {:?} -> {} ({outcome})",
                a.record_id, a.date, a.candidates, a.resolved_to
            );
        }
    }

    if !report.unassignable.is_empty() {
        summary.push_str("\nNo matching cycle:\n");
        for u in &report.unassignable {
            let _ = writeln!(
                summary,
                "  record {} ({}) left in cycle {}",
                u.record_id, u.date, u.current_cycle_id
            );
        }
    }

    if !report.malformed.is_empty() {
        summary.push_str("\nUnreadable dates:\n");
        for m in &report.malformed {
            let _ = writeln!(summary, "  record {} {:?}", m.record_id, m.raw_date);
        }
    }

    summary
}
