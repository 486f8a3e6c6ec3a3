//! The ledger facade consumed by request handlers.
//!
//! Wraps the database connection, the stats memo and the stylist directory so
//! that every record write invalidates exactly the statistics it affects.

use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use tracing::debug;

use crate::{
    config::{settings::Settings, stylists::StylistDirectory},
    core::{
        actor::Actor,
        cycle::{self, CurrentCyclePolicy},
        migration::{self, MigrationOptions, MigrationReport},
        record::{self, RecordDraft, RecordWithPayments, UpdatedRecord},
        stats::{self, CycleStatsReport, StatsCache},
    },
    entities::{cycle as cycle_entity, record as record_entity},
    errors::Result,
};

/// Repository-style entry point to the salon ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: DatabaseConnection,
    cache: StatsCache,
    directory: StylistDirectory,
    current_policy: CurrentCyclePolicy,
}

impl Ledger {
    /// Creates a ledger with default settings.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            cache: StatsCache::new(),
            directory: StylistDirectory::default(),
            current_policy: CurrentCyclePolicy::default(),
        }
    }

    /// Creates a ledger configured from `config.toml` settings.
    #[must_use]
    pub fn with_settings(db: DatabaseConnection, settings: &Settings) -> Self {
        Self {
            db,
            cache: StatsCache::new(),
            directory: StylistDirectory::from_config(&settings.stylists),
            current_policy: settings.cycles.current_policy,
        }
    }

    /// Underlying connection.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Stats memo shared by clones of this ledger.
    #[must_use]
    pub const fn cache(&self) -> &StatsCache {
        &self.cache
    }

    /// Stylist name lookup.
    #[must_use]
    pub const fn directory(&self) -> &StylistDirectory {
        &self.directory
    }

    /// Creates a cycle.
    pub async fn create_cycle(
        &self,
        name: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        notes: Option<String>,
    ) -> Result<cycle_entity::Model> {
        cycle::create_cycle(&self.db, name, start_date, end_date, notes).await
    }

    /// Applies a partial update to a cycle. Cached stats for it are dropped.
    pub async fn update_cycle(
        &self,
        cycle_id: i64,
        changes: cycle::CycleUpdate,
    ) -> Result<cycle_entity::Model> {
        let updated = cycle::update_cycle(&self.db, cycle_id, changes).await?;
        self.cache.invalidate_cycle(cycle_id).await;
        Ok(updated)
    }

    /// Deletes a cycle no record references.
    pub async fn delete_cycle(&self, cycle_id: i64) -> Result<()> {
        cycle::delete_cycle(&self.db, cycle_id).await?;
        self.cache.invalidate_cycle(cycle_id).await;
        Ok(())
    }

    /// All cycles containing `date`.
    pub async fn find_cycles_containing(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<cycle_entity::Model>> {
        cycle::find_cycles_containing(&self.db, date).await
    }

    /// The cycle to pre-select for a stylist on `today`.
    pub async fn resolve_current_cycle(
        &self,
        today: NaiveDate,
    ) -> Result<Option<cycle_entity::Model>> {
        cycle::resolve_current(&self.db, today, self.current_policy).await
    }

    /// Creates a record owned by the actor.
    pub async fn create_record(
        &self,
        actor: &Actor,
        draft: RecordDraft,
    ) -> Result<RecordWithPayments> {
        let created = record::create_record(&self.db, actor, draft).await?;
        self.invalidate(&created.record).await;
        Ok(created)
    }

    /// Creates a record on behalf of `owner_id` (administrators only).
    pub async fn create_record_for(
        &self,
        actor: &Actor,
        owner_id: &str,
        draft: RecordDraft,
    ) -> Result<RecordWithPayments> {
        let created = record::create_record_for(&self.db, actor, owner_id, draft).await?;
        self.invalidate(&created.record).await;
        Ok(created)
    }

    /// Rewrites a record; stats for both its old and new cycle are dropped.
    pub async fn update_record(
        &self,
        actor: &Actor,
        record_id: i64,
        draft: RecordDraft,
    ) -> Result<UpdatedRecord> {
        let updated = record::update_record(&self.db, actor, record_id, draft).await?;
        let rec = &updated.record.record;
        self.cache
            .invalidate(updated.previous_cycle_id, &rec.user_id)
            .await;
        self.invalidate(rec).await;
        Ok(updated)
    }

    /// Deletes a record.
    pub async fn delete_record(&self, actor: &Actor, record_id: i64) -> Result<()> {
        let deleted = record::delete_record(&self.db, actor, record_id).await?;
        self.invalidate(&deleted).await;
        Ok(())
    }

    /// A record and its payments.
    pub async fn get_record(&self, record_id: i64) -> Result<Option<RecordWithPayments>> {
        record::get_record(&self.db, record_id).await
    }

    /// All records in a cycle.
    pub async fn list_records_by_cycle(&self, cycle_id: i64) -> Result<Vec<RecordWithPayments>> {
        record::list_records_by_cycle(&self.db, cycle_id).await
    }

    /// One stylist's records in a cycle.
    pub async fn list_records_by_user(
        &self,
        user_id: &str,
        cycle_id: i64,
    ) -> Result<Vec<RecordWithPayments>> {
        record::list_records_by_user(&self.db, user_id, cycle_id).await
    }

    /// Statistics for a cycle, served from the memo when possible.
    ///
    /// A report that raced with a write is returned but not memoized.
    pub async fn get_stats(
        &self,
        cycle_id: i64,
        user_id: Option<&str>,
    ) -> Result<CycleStatsReport> {
        if let Some(hit) = self.cache.get(cycle_id, user_id).await {
            debug!("Stats cache hit for cycle {cycle_id}, user {user_id:?}");
            return Ok(hit);
        }

        let generation = self.cache.generation().await;
        let report = stats::compute_cycle_stats(&self.db, &self.directory, cycle_id, user_id).await?;
        self.cache
            .insert(cycle_id, user_id, report.clone(), generation)
            .await;
        Ok(report)
    }

    /// Runs the cycle migration; a committed run clears all cached stats.
    pub async fn run_cycle_migration(&self, options: &MigrationOptions) -> Result<MigrationReport> {
        let report = migration::run_cycle_migration(&self.db, options).await?;
        if !report.dry_run && report.moved_count() > 0 {
            self.cache.clear().await;
        }
        Ok(report)
    }

    async fn invalidate(&self, rec: &record_entity::Model) {
        self.cache.invalidate(rec.cycle_id, &rec.user_id).await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::money::Money;
    use crate::test_utils::*;

    async fn setup_ledger() -> Result<(Ledger, cycle_entity::Model)> {
        let db = setup_test_db().await?;
        let ledger = Ledger::new(db);
        let cycle = ledger
            .create_cycle("Cycle A".to_string(), ymd(2025, 6, 1), ymd(2025, 6, 14), None)
            .await?;
        Ok((ledger, cycle))
    }

    #[tokio::test]
    async fn test_stats_reflect_writes_through_cache() -> Result<()> {
        let (ledger, cycle) = setup_ledger().await?;
        let maya = stylist("stylist-1");

        let empty = ledger.get_stats(cycle.id, None).await?;
        assert_eq!(empty.totals.total_sales(), Money::ZERO);
        assert_eq!(ledger.cache().len().await, 1);

        let created = ledger
            .create_record(
                &maya,
                service_draft(cycle.id, ymd(2025, 6, 10), 6000, vec![card(4000), cash(2000)]),
            )
            .await?;
        assert!(ledger.cache().is_empty().await);

        let after_create = ledger.get_stats(cycle.id, None).await?;
        assert_eq!(after_create.totals.total_service_price, Money::from_cents(6000));
        assert_eq!(after_create.totals.service_count, 1);

        ledger
            .update_record(
                &maya,
                created.record.id,
                service_draft(cycle.id, ymd(2025, 6, 10), 7000, vec![card(7000)]),
            )
            .await?;
        let after_update = ledger.get_stats(cycle.id, Some("stylist-1")).await?;
        assert_eq!(after_update.totals.total_service_price, Money::from_cents(7000));

        ledger.delete_record(&maya, created.record.id).await?;
        let after_delete = ledger.get_stats(cycle.id, Some("stylist-1")).await?;
        assert_eq!(after_delete.totals.total_service_price, Money::ZERO);
        assert_eq!(after_delete.stylists.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_during_stats_computation_is_not_masked() -> Result<()> {
        let (ledger, cycle) = setup_ledger().await?;

        // A reader misses the cache and starts computing.
        let generation = ledger.cache().generation().await;
        let stale =
            stats::compute_cycle_stats(ledger.db(), ledger.directory(), cycle.id, None).await?;
        assert_eq!(stale.totals.service_count, 0);

        // A write commits before the reader stores its result.
        ledger
            .create_record(
                &stylist("stylist-1"),
                service_draft(cycle.id, ymd(2025, 6, 10), 6000, vec![card(6000)]),
            )
            .await?;
        assert!(!ledger.cache().insert(cycle.id, None, stale, generation).await);

        let fresh = ledger.get_stats(cycle.id, None).await?;
        assert_eq!(fresh.totals.service_count, 1);
        assert_eq!(ledger.get_stats(cycle.id, None).await?, fresh);
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_move_invalidates_both_cycles() -> Result<()> {
        let (ledger, first) = setup_ledger().await?;
        let second = ledger
            .create_cycle("Cycle B".to_string(), ymd(2025, 6, 15), ymd(2025, 6, 28), None)
            .await?;
        let created = ledger
            .create_record(
                &stylist("stylist-1"),
                service_draft(first.id, ymd(2025, 6, 10), 6000, vec![cash(6000)]),
            )
            .await?;

        ledger.get_stats(first.id, None).await?;
        ledger.get_stats(second.id, None).await?;

        ledger
            .update_record(
                &admin(),
                created.record.id,
                service_draft(second.id, ymd(2025, 6, 16), 6000, vec![cash(6000)]),
            )
            .await?;

        let first_stats = ledger.get_stats(first.id, None).await?;
        let second_stats = ledger.get_stats(second.id, None).await?;
        assert_eq!(first_stats.totals.service_count, 0);
        assert_eq!(second_stats.totals.service_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_migration_clears_cache() -> Result<()> {
        let (ledger, first) = setup_ledger().await?;
        let second = ledger
            .create_cycle("Cycle B".to_string(), ymd(2025, 6, 15), ymd(2025, 6, 28), None)
            .await?;
        ledger
            .create_record_for(
                &admin(),
                "stylist-1",
                service_draft(first.id, ymd(2025, 6, 20), 6000, vec![cash(6000)]),
            )
            .await?;

        assert_eq!(ledger.get_stats(second.id, None).await?.totals.service_count, 0);

        let report = ledger.run_cycle_migration(&MigrationOptions::default()).await?;
        assert_eq!(report.moved_count(), 1);
        assert_eq!(ledger.get_stats(second.id, None).await?.totals.service_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_current_cycle_uses_policy() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = crate::config::settings::parse_settings(
            "[cycles]\ncurrent_policy = \"earliest_start\"\n",
        )?;
        let ledger = Ledger::with_settings(db, &settings);
        let early = ledger
            .create_cycle("A".to_string(), ymd(2025, 6, 22), ymd(2025, 7, 5), None)
            .await?;
        ledger
            .create_cycle("B".to_string(), ymd(2025, 7, 1), ymd(2025, 7, 14), None)
            .await?;

        let current = ledger.resolve_current_cycle(ymd(2025, 7, 3)).await?;
        assert_eq!(current.map(|c| c.id), Some(early.id));
        assert!(ledger.resolve_current_cycle(ymd(2025, 8, 1)).await?.is_none());
        Ok(())
    }
}
