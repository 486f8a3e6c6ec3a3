//! Per-stylist cycle statistics.
//!
//! Statistics are never stored; they are folded from the record store on demand.
//! [`StatsCache`] memoizes reports per `(cycle, user)` and is invalidated by
//! every write that touches that pair.
//!
//! Each record is validated on its own, so the fold re-checks every sum: many
//! valid records can still add up past what fits in cents.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::{
    config::stylists::StylistDirectory,
    core::{
        cycle::require_cycle,
        money::{Money, PaymentMethod},
        record::{RecordWithPayments, list_records_by_cycle, list_records_by_user},
    },
    entities::{RecordKind, cycle},
    errors::{Result, ValidationError},
};

fn checked_add(acc: &mut Money, amount: Money) -> std::result::Result<(), ValidationError> {
    let Some(sum) = acc.checked_add(amount) else {
        return Err(ValidationError::InvalidMoney {
            input: format!("{acc} + {amount}"),
            reason: "cycle total is out of range".to_string(),
        });
    };
    *acc = sum;
    Ok(())
}

/// Totals for one stylist within one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    /// Stylist user id
    pub user_id: String,
    /// Display name from the stylist directory
    pub stylist_name: String,
    /// Sum of service prices
    pub total_service_price: Money,
    /// Sum of product prices
    pub total_product_price: Money,
    /// Sum of service tips
    pub total_tips: Money,
    /// Number of services
    pub service_count: u64,
    /// Number of products
    pub product_count: u64,
    /// Payment amounts per method across this stylist's records
    pub payments: PaymentTotals,
}

impl CycleStats {
    /// All-zero statistics for a stylist.
    #[must_use]
    pub fn empty(user_id: &str, stylist_name: String) -> Self {
        Self {
            user_id: user_id.to_string(),
            stylist_name,
            total_service_price: Money::ZERO,
            total_product_price: Money::ZERO,
            total_tips: Money::ZERO,
            service_count: 0,
            product_count: 0,
            payments: PaymentTotals::default(),
        }
    }

    /// Service plus product revenue, excluding tips.
    ///
    /// Stats built by [`aggregate`] are checked to keep this sum in range.
    #[must_use]
    pub fn total_sales(&self) -> Money {
        self.total_service_price + self.total_product_price
    }

    fn add(&mut self, item: &RecordWithPayments) -> std::result::Result<(), ValidationError> {
        match item.record.kind {
            RecordKind::Service => {
                checked_add(&mut self.total_service_price, item.price())?;
                checked_add(&mut self.total_tips, item.tip())?;
                self.service_count += 1;
            }
            RecordKind::Product => {
                checked_add(&mut self.total_product_price, item.price())?;
                self.product_count += 1;
            }
        }
        self.payments.add_record(item)
    }

    fn merge(&mut self, other: &Self) -> std::result::Result<(), ValidationError> {
        checked_add(&mut self.total_service_price, other.total_service_price)?;
        checked_add(&mut self.total_product_price, other.total_product_price)?;
        checked_add(&mut self.total_tips, other.total_tips)?;
        self.service_count += other.service_count;
        self.product_count += other.product_count;
        self.payments.merge(&other.payments)
    }
}

/// Payment amounts grouped by method. Every method is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PaymentTotals(BTreeMap<PaymentMethod, Money>);

impl Default for PaymentTotals {
    fn default() -> Self {
        Self(
            PaymentMethod::ALL
                .into_iter()
                .map(|m| (m, Money::ZERO))
                .collect(),
        )
    }
}

impl PaymentTotals {
    /// Amount collected through `method`.
    #[must_use]
    pub fn get(&self, method: PaymentMethod) -> Money {
        self.0.get(&method).copied().unwrap_or(Money::ZERO)
    }

    /// Sum over all methods.
    ///
    /// Totals built by [`aggregate`] are checked to keep this sum in range.
    #[must_use]
    pub fn total(&self) -> Money {
        self.0.values().sum()
    }

    fn checked_total(&self) -> std::result::Result<Money, ValidationError> {
        let mut total = Money::ZERO;
        for amount in self.0.values() {
            checked_add(&mut total, *amount)?;
        }
        Ok(total)
    }

    /// Iterates `(method, amount)` in display order.
    pub fn iter(&self) -> impl Iterator<Item = (PaymentMethod, Money)> + '_ {
        self.0.iter().map(|(m, a)| (*m, *a))
    }

    fn add(
        &mut self,
        method: PaymentMethod,
        amount: Money,
    ) -> std::result::Result<(), ValidationError> {
        checked_add(self.0.entry(method).or_insert(Money::ZERO), amount)
    }

    fn add_record(&mut self, item: &RecordWithPayments) -> std::result::Result<(), ValidationError> {
        for payment in &item.payments {
            self.add(payment.method, Money::from_cents(payment.amount_cents))?;
        }
        Ok(())
    }

    fn merge(&mut self, other: &Self) -> std::result::Result<(), ValidationError> {
        for (method, amount) in other.iter() {
            self.add(method, amount)?;
        }
        Ok(())
    }
}

/// Statistics for a cycle, optionally narrowed to one stylist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleStatsReport {
    /// The cycle reported on
    pub cycle: cycle::Model,
    /// One entry per stylist, ordered by display name
    pub stylists: Vec<CycleStats>,
    /// Payment totals across every included record
    pub payment_totals: PaymentTotals,
    /// Grand totals across all included stylists
    pub totals: CycleStats,
}

/// Groups records by owner and folds them into per-stylist statistics.
///
/// When `only_user` is given the result always contains exactly that stylist,
/// with zero totals if they logged nothing.
///
/// # Errors
/// Returns [`ValidationError::InvalidMoney`] if any total, including total
/// sales and the sum over payment methods, does not fit in cents.
pub fn aggregate(
    records: &[RecordWithPayments],
    directory: &StylistDirectory,
    only_user: Option<&str>,
) -> std::result::Result<(Vec<CycleStats>, CycleStats), ValidationError> {
    let mut by_user: HashMap<&str, CycleStats> = HashMap::new();

    if let Some(user_id) = only_user {
        by_user.insert(
            user_id,
            CycleStats::empty(user_id, directory.display_name(user_id)),
        );
    }

    for item in records {
        let user_id = item.record.user_id.as_str();
        if only_user.is_some_and(|u| u != user_id) {
            continue;
        }
        by_user
            .entry(user_id)
            .or_insert_with(|| CycleStats::empty(user_id, directory.display_name(user_id)))
            .add(item)?;
    }

    let mut stylists: Vec<CycleStats> = by_user.into_values().collect();
    stylists.sort_by(|a, b| {
        a.stylist_name
            .cmp(&b.stylist_name)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    let mut totals = CycleStats::empty("", "All stylists".to_string());
    for stats in &stylists {
        totals.merge(stats)?;
    }

    // Amounts are non-negative, so per-stylist sums stay below these.
    let mut sales = totals.total_service_price;
    checked_add(&mut sales, totals.total_product_price)?;
    totals.payments.checked_total()?;

    Ok((stylists, totals))
}

/// Computes statistics for a cycle straight from the record store.
pub async fn compute_cycle_stats(
    db: &DatabaseConnection,
    directory: &StylistDirectory,
    cycle_id: i64,
    user_id: Option<&str>,
) -> Result<CycleStatsReport> {
    let cycle = require_cycle(db, cycle_id).await?;

    let records = match user_id {
        Some(user) => list_records_by_user(db, user, cycle_id).await?,
        None => list_records_by_cycle(db, cycle_id).await?,
    };
    debug!(
        "Aggregating {} record(s) for cycle {cycle_id} (user {user_id:?})",
        records.len()
    );

    let (stylists, totals) = aggregate(&records, directory, user_id)?;
    Ok(CycleStatsReport {
        cycle,
        payment_totals: totals.payments.clone(),
        stylists,
        totals,
    })
}

type StatsKey = (i64, Option<String>);

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<StatsKey, CycleStatsReport>,
    /// Bumped by every invalidation
    generation: u64,
}

/// Memo of computed reports keyed by `(cycle_id, user_id)`.
///
/// A report is only stored if no invalidation happened since the caller read
/// [`StatsCache::generation`], so a report computed before a write can never
/// replace the invalidated entry.
#[derive(Debug, Clone, Default)]
pub struct StatsCache {
    state: Arc<RwLock<CacheState>>,
}

impl StatsCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current invalidation generation. Read it before computing a report.
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Returns the cached report, if present.
    pub async fn get(&self, cycle_id: i64, user_id: Option<&str>) -> Option<CycleStatsReport> {
        let key = (cycle_id, user_id.map(str::to_string));
        self.state.read().await.entries.get(&key).cloned()
    }

    /// Stores a report computed after reading `generation`.
    ///
    /// Returns `false` and discards the report when the cache was invalidated
    /// in the meantime.
    pub async fn insert(
        &self,
        cycle_id: i64,
        user_id: Option<&str>,
        report: CycleStatsReport,
        generation: u64,
    ) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            trace!("Discarding stale stats for cycle {cycle_id}, user {user_id:?}");
            return false;
        }
        state
            .entries
            .insert((cycle_id, user_id.map(str::to_string)), report);
        true
    }

    /// Drops the per-user and the whole-cycle entries affected by a write.
    pub async fn invalidate(&self, cycle_id: i64, user_id: &str) {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.entries.remove(&(cycle_id, Some(user_id.to_string())));
        state.entries.remove(&(cycle_id, None));
        trace!("Invalidated stats for cycle {cycle_id}, user {user_id}");
    }

    /// Drops every entry for a cycle.
    pub async fn invalidate_cycle(&self, cycle_id: i64) {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.entries.retain(|(cycle, _), _| *cycle != cycle_id);
    }

    /// Drops everything.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.entries.clear();
        debug!("Stats cache cleared");
    }

    /// Number of cached reports.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Whether the cache holds no reports.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}

/// Formats a report as a plain-text table.
#[must_use]
pub fn format_stats_report(report: &CycleStatsReport) -> String {
    use std::fmt::Write;

    let mut out = format!(
        "Cycle '{}' ({} to {})\n",
        report.cycle.name, report.cycle.start_date, report.cycle.end_date
    );

    // write! is infallible when writing to String
    for stats in &report.stylists {
        let _ = writeln!(
            out,
            "  {:<20} services {:>3} {:>12} | tips {:>10} | products {:>3} {:>12}",
            stats.stylist_name,
            stats.service_count,
            stats.total_service_price.to_string(),
            stats.total_tips.to_string(),
            stats.product_count,
            stats.total_product_price.to_string(),
        );
    }

    let _ = writeln!(
        out,
        "  Total sales {} + tips {}",
        report.totals.total_sales(),
        report.totals.total_tips
    );
    let methods: Vec<String> = report
        .payment_totals
        .iter()
        .map(|(method, amount)| format!("{method} {amount}"))
        .collect();
    let _ = writeln!(out, "  Payments: {}", methods.join(", "));

    out
}
