//! The cost tracker: persists one [`CostRecord`] per inference call attempt
//! (successful or not), and answers the range-bounded aggregation queries
//! the cost dashboard and budget alerts need.
//!
//! Storage follows the workspace's `redb`-as-a-durable-table idiom: a single
//! append-only table keyed by a monotonic sequence number, with the full
//! record serialized as JSON in the value (the same trade-off the memory
//! index makes — human-inspectable on disk, rebuildable if the schema
//! changes, and cheap enough at this call volume that a secondary index
//! isn't worth the complexity).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use corvus_types::{CostAggregate, CostRecord, CostSink, Provider};
use redb::{Database, ReadableTable, TableDefinition};

const RECORDS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("cost_records");
const SEQUENCE_KEY: &str = "__next_id";
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("cost_meta");

/// An inclusive time range used to bound an aggregation query.
#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn month(year: i32, month: u32) -> Self {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .expect("valid year/month")
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .expect("valid year/month")
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
            - Duration::nanoseconds(1);
        Self { start, end }
    }
}

/// A known model and the provider/tier/context window it belongs to.
/// Deprecated models are hidden from `active_models` but remain visible via
/// `lookup` so historical cost records can still be attributed.
#[derive(Debug, Clone)]
pub struct ModelRegistryEntry {
    pub model: String,
    pub provider: Provider,
    pub tier: &'static str,
    pub context_window: u32,
    pub deprecated: bool,
}

/// Tracks known models. Not persisted — rebuilt from a static seed list at
/// startup, matching the capability matrix's own static-table approach.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    entries: HashMap<String, ModelRegistryEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: ModelRegistryEntry) {
        self.entries.insert(entry.model.clone(), entry);
    }

    pub fn lookup(&self, model: &str) -> Option<&ModelRegistryEntry> {
        self.entries.get(model)
    }

    /// Active (non-deprecated) models, newest registration order not
    /// guaranteed since the backing map is unordered.
    pub fn active_models(&self) -> Vec<&ModelRegistryEntry> {
        self.entries.values().filter(|e| !e.deprecated).collect()
    }

    pub fn mark_deprecated(&mut self, model: &str) {
        if let Some(entry) = self.entries.get_mut(model) {
            entry.deprecated = true;
        }
    }
}

/// A budget-threshold crossing, emitted once per period per threshold.
#[derive(Debug, Clone)]
pub struct BudgetAlert {
    pub period: String,
    pub threshold_usd: f64,
    pub accumulated_usd: f64,
}

/// Persists cost records and answers aggregation queries. Also doubles as a
/// [`CostSink`] so the broker can report every call without depending on
/// this crate's storage details.
pub struct CostTracker {
    db: Database,
    budget_alert_threshold_usd: f64,
    /// Day-keys for which the budget alert has already fired, so a
    /// threshold crossing is never reported twice for the same day.
    alerted_days: Mutex<std::collections::HashSet<String>>,
}

impl CostTracker {
    pub fn open(path: impl AsRef<Path>, budget_alert_threshold_usd: f64) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)
            .with_context(|| format!("opening cost tracker redb database at {}", path.display()))?;
        {
            let tx = db.begin_write()?;
            tx.open_table(RECORDS_TABLE)?;
            tx.open_table(META_TABLE)?;
            tx.commit()?;
        }
        Ok(Self {
            db,
            budget_alert_threshold_usd,
            alerted_days: Mutex::new(std::collections::HashSet::new()),
        })
    }

    fn next_sequence(&self, tx: &redb::WriteTransaction) -> Result<u64> {
        let mut meta = tx.open_table(META_TABLE)?;
        let next = meta.get(SEQUENCE_KEY)?.map(|v| v.value()).unwrap_or(0);
        meta.insert(SEQUENCE_KEY, next + 1)?;
        Ok(next)
    }

    /// Persists one record, returning a [`BudgetAlert`] if this record just
    /// pushed the current day's accumulated cost past the configured
    /// threshold for the first time today.
    pub fn insert(&self, record: &CostRecord) -> Result<Option<BudgetAlert>> {
        let bytes = serde_json::to_vec(record)?;
        let tx = self.db.begin_write()?;
        let id = self.next_sequence(&tx)?;
        {
            let mut tbl = tx.open_table(RECORDS_TABLE)?;
            tbl.insert(id, bytes.as_slice())?;
        }
        tx.commit()?;

        let day_key = record.ts.format("%Y-%m-%d").to_string();
        let today_total = self.total_cost(TimeRange {
            start: record.ts.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
            end: record.ts,
        })?;
        if today_total >= self.budget_alert_threshold_usd {
            let mut alerted = self.alerted_days.lock().unwrap();
            if alerted.insert(day_key.clone()) {
                return Ok(Some(BudgetAlert {
                    period: day_key,
                    threshold_usd: self.budget_alert_threshold_usd,
                    accumulated_usd: today_total,
                }));
            }
        }
        Ok(None)
    }

    fn scan(&self) -> Result<Vec<CostRecord>> {
        let tx = self.db.begin_read()?;
        let tbl = tx.open_table(RECORDS_TABLE)?;
        let mut out = Vec::new();
        for entry in tbl.iter()? {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(value.value())?);
        }
        Ok(out)
    }

    pub fn total_cost(&self, range: TimeRange) -> Result<f64> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|r| range.contains(r.ts))
            .map(|r| r.cost_usd)
            .sum())
    }

    pub fn cost_by_provider(&self, range: TimeRange) -> Result<HashMap<Provider, CostAggregate>> {
        let mut out: HashMap<Provider, CostAggregate> = HashMap::new();
        for record in self.scan()?.into_iter().filter(|r| range.contains(r.ts)) {
            out.entry(record.provider).or_default().accumulate(&record);
        }
        Ok(out)
    }

    pub fn cost_by_task_type(&self, range: TimeRange) -> Result<HashMap<String, CostAggregate>> {
        let mut out: HashMap<String, CostAggregate> = HashMap::new();
        for record in self.scan()?.into_iter().filter(|r| range.contains(r.ts)) {
            let key = record.task_type.clone().unwrap_or_else(|| "unknown".to_string());
            out.entry(key).or_default().accumulate(&record);
        }
        Ok(out)
    }

    pub fn cost_by_model(&self, range: TimeRange) -> Result<HashMap<String, CostAggregate>> {
        let mut out: HashMap<String, CostAggregate> = HashMap::new();
        for record in self.scan()?.into_iter().filter(|r| range.contains(r.ts)) {
            out.entry(record.model.clone()).or_default().accumulate(&record);
        }
        Ok(out)
    }

    /// Per-day totals for the last `days` days, oldest first.
    pub fn daily_breakdown(&self, days: i64) -> Result<Vec<(NaiveDate, CostAggregate)>> {
        let range = TimeRange::last_days(days);
        let mut by_day: HashMap<NaiveDate, CostAggregate> = HashMap::new();
        for record in self.scan()?.into_iter().filter(|r| range.contains(r.ts)) {
            by_day.entry(record.ts.date_naive()).or_default().accumulate(&record);
        }
        let mut out: Vec<_> = by_day.into_iter().collect();
        out.sort_by_key(|(date, _)| *date);
        Ok(out)
    }

    pub fn monthly_report(&self, year: i32, month: u32) -> Result<CostAggregate> {
        let range = TimeRange::month(year, month);
        let mut aggregate = CostAggregate::default();
        for record in self.scan()?.into_iter().filter(|r| range.contains(r.ts)) {
            aggregate.accumulate(&record);
        }
        Ok(aggregate)
    }

    /// Linear extrapolation of the current month's daily average cost across
    /// the full month, based on however many days have elapsed so far.
    pub fn projected_monthly_cost(&self) -> Result<f64> {
        let now = Utc::now();
        let range = TimeRange::month(now.year(), now.month());
        let elapsed_so_far = self.total_cost(TimeRange {
            start: range.start,
            end: now,
        })?;
        let days_elapsed = (now.date_naive() - range.start.date_naive()).num_days() + 1;
        let days_in_month = days_in_month(now.year(), now.month());
        if days_elapsed <= 0 {
            return Ok(0.0);
        }
        let daily_average = elapsed_so_far / days_elapsed as f64;
        Ok(daily_average * days_in_month as f64)
    }

    /// Count of records for `provider` flagged `rate_limit_hit` within
    /// `range`.
    pub fn rate_limit_count(&self, provider: Provider, range: TimeRange) -> Result<u64> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|r| r.provider == provider && r.rate_limit_hit && range.contains(r.ts))
            .count() as u64)
    }

    pub fn record_count(&self) -> Result<u64> {
        Ok(self.scan()?.len() as u64)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid year/month");
    let this_month_first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid year/month");
    (next_month_first - this_month_first).num_days() as u32
}

#[async_trait]
impl CostSink for CostTracker {
    async fn record(&self, record: CostRecord) {
        match self.insert(&record) {
            Ok(Some(alert)) => {
                tracing::warn!(
                    period = %alert.period,
                    threshold_usd = alert.threshold_usd,
                    accumulated_usd = alert.accumulated_usd,
                    "budget alert threshold crossed"
                );
            }
            Ok(None) => {}
            Err(err) => tracing::error!(%err, "failed to persist cost record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_types::TaskType;

    fn sample(provider: Provider, cost_usd: f64, task_type: TaskType) -> CostRecord {
        CostRecord {
            ts: Utc::now(),
            provider,
            model: "test-model".to_string(),
            tokens_in: 100,
            tokens_out: 50,
            cost_usd,
            cost_estimated: false,
            task_type: Some(format!("{task_type:?}")),
            user_id: Some("u1".to_string()),
            latency_ms: Some(120.0),
            rate_limit_hit: false,
            success: true,
            error: None,
        }
    }

    #[test]
    fn every_inference_call_produces_exactly_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = CostTracker::open(dir.path().join("costs.redb"), 1000.0).unwrap();
        tracker.insert(&sample(Provider::Claude, 0.05, TaskType::CodeGeneration)).unwrap();
        tracker.insert(&sample(Provider::Openai, 0.02, TaskType::SimpleQa)).unwrap();
        tracker.insert(&sample(Provider::Claude, 0.03, TaskType::CodeGeneration)).unwrap();

        assert_eq!(tracker.record_count().unwrap(), 3);
        let total = tracker.total_cost(TimeRange::last_days(1)).unwrap();
        assert!((total - 0.10).abs() < 1e-9);
    }

    #[test]
    fn cost_by_provider_groups_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = CostTracker::open(dir.path().join("costs.redb"), 1000.0).unwrap();
        tracker.insert(&sample(Provider::Claude, 0.05, TaskType::CodeGeneration)).unwrap();
        tracker.insert(&sample(Provider::Claude, 0.03, TaskType::CodeGeneration)).unwrap();
        tracker.insert(&sample(Provider::Openai, 0.02, TaskType::SimpleQa)).unwrap();

        let by_provider = tracker.cost_by_provider(TimeRange::last_days(1)).unwrap();
        assert_eq!(by_provider.get(&Provider::Claude).unwrap().calls, 2);
        assert_eq!(by_provider.get(&Provider::Openai).unwrap().calls, 1);
    }

    #[test]
    fn budget_alert_fires_once_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = CostTracker::open(dir.path().join("costs.redb"), 0.05).unwrap();
        let first = tracker.insert(&sample(Provider::Claude, 0.04, TaskType::CodeGeneration)).unwrap();
        assert!(first.is_none());
        let second = tracker.insert(&sample(Provider::Claude, 0.04, TaskType::CodeGeneration)).unwrap();
        assert!(second.is_some());
        let third = tracker.insert(&sample(Provider::Claude, 0.04, TaskType::CodeGeneration)).unwrap();
        assert!(third.is_none(), "alert must not repeat for the same day");
    }

    #[test]
    fn failed_call_is_still_exactly_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = CostTracker::open(dir.path().join("costs.redb"), 1000.0).unwrap();
        let failed = CostRecord::failed(Provider::Claude, "claude-3-5-sonnet-latest", "connection refused");
        tracker.insert(&failed).unwrap();
        assert_eq!(tracker.record_count().unwrap(), 1);
        assert_eq!(tracker.total_cost(TimeRange::last_days(1)).unwrap(), 0.0);
    }

    #[test]
    fn model_registry_hides_deprecated_from_active_list() {
        let mut registry = ModelRegistry::new();
        registry.register(ModelRegistryEntry {
            model: "claude-2".to_string(),
            provider: Provider::Claude,
            tier: "legacy",
            context_window: 100_000,
            deprecated: false,
        });
        registry.mark_deprecated("claude-2");
        assert!(registry.active_models().is_empty());
        assert!(registry.lookup("claude-2").is_some());
    }
}
