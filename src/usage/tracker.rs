//! Bounded usage ledger and aggregate statistics.

use crate::clock::{system_clock, Clock};
use crate::tokens::{round_to, CostCalculation, ModelPricing, TokenUsage};
use crate::Result;
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

pub const DEFAULT_MAX_RECORDS: usize = 10_000;

/// One completed or failed AI invocation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub operation: String,
    pub tokens: TokenUsage,
    pub cost: CostCalculation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub success: bool,
    pub cache_hit: bool,
}

/// Metadata for [`CostTracker::track`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackOptions {
    pub user_id: Option<String>,
    pub success: bool,
    pub cache_hit: bool,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            user_id: None,
            success: true,
            cache_hit: false,
        }
    }
}

impl TrackOptions {
    pub fn failed() -> Self {
        Self {
            success: false,
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }
}

/// Record filter; time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub service: Option<String>,
}

impl StatsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    fn matches(&self, r: &UsageRecord) -> bool {
        if self.start.map_or(false, |s| r.timestamp < s) {
            return false;
        }
        if self.end.map_or(false, |e| r.timestamp > e) {
            return false;
        }
        if let Some(u) = &self.user_id {
            if r.user_id.as_deref() != Some(u.as_str()) {
                return false;
            }
        }
        if let Some(s) = &self.service {
            if &r.service != s {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub calls: u64,
    pub tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    /// `YYYY-MM-DD`
    pub date: String,
    pub calls: u64,
    pub tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub cached_calls: u64,
    pub total_tokens: u64,
    /// 6 decimals
    pub total_cost: f64,
    /// 2 decimals
    pub average_tokens_per_call: f64,
    /// 4 decimals
    pub cache_hit_rate: f64,
    pub by_service: BTreeMap<String, ServiceStats>,
    /// Keyed by UTC date.
    pub by_day: BTreeMap<String, DailyStats>,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    exported_at: DateTime<Utc>,
    record_count: usize,
    records: &'a VecDeque<UsageRecord>,
}

#[derive(Deserialize)]
struct ImportDocument {
    #[serde(default)]
    records: Option<Vec<UsageRecord>>,
}

/// Append-only ring buffer of [`UsageRecord`]s.
///
/// Once `max_records` is reached the oldest record is dropped, so long-window
/// statistics are approximate after the buffer wraps.
pub struct CostTracker {
    max_records: usize,
    pricing: ModelPricing,
    clock: Arc<dyn Clock>,
    records: Mutex<VecDeque<UsageRecord>>,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS, ModelPricing::default(), system_clock())
    }
}

impl CostTracker {
    pub fn new(max_records: usize, pricing: ModelPricing, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_records,
            pricing,
            clock,
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn pricing(&self) -> &ModelPricing {
        &self.pricing
    }

    pub fn capacity(&self) -> usize {
        self.max_records
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<UsageRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn track(
        &self,
        service: &str,
        operation: &str,
        tokens: TokenUsage,
        opts: TrackOptions,
    ) -> UsageRecord {
        let cost = self.pricing.cost(&tokens);
        let record = UsageRecord {
            timestamp: self.clock.now(),
            service: service.to_string(),
            operation: operation.to_string(),
            tokens,
            cost,
            user_id: opts.user_id,
            success: opts.success,
            cache_hit: opts.cache_hit,
        };

        info!(
            service,
            operation,
            tokens = record.tokens.total_tokens,
            cost = %record.cost.format(),
            success = record.success,
            "tracked AI usage"
        );

        let mut records = self.lock();
        records.push_back(record.clone());
        while records.len() > self.max_records {
            records.pop_front();
        }
        record
    }

    pub fn stats(&self, filter: &StatsFilter) -> UsageStats {
        let records = self.lock();
        aggregate(records.iter().filter(|r| filter.matches(r)))
    }

    /// Half-open `[start, end)` variant used for calendar windows.
    fn stats_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> UsageStats {
        let records = self.lock();
        aggregate(
            records
                .iter()
                .filter(|r| r.timestamp >= start && r.timestamp < end),
        )
    }

    /// Local-midnight-to-midnight totals for `date` (default: today).
    pub fn daily_stats(&self, date: Option<NaiveDate>) -> DailyStats {
        let date = date.unwrap_or_else(|| self.today());
        let start = local_midnight(date);
        let end = local_midnight(date.succ_opt().unwrap_or(date));
        let stats = self.stats_between(start, end);
        DailyStats {
            date: date.format("%Y-%m-%d").to_string(),
            calls: stats.total_calls,
            tokens: stats.total_tokens,
            cost: stats.total_cost,
        }
    }

    /// Statistics for a local calendar month; `month` is 1-based.
    ///
    /// Both default to the current month. An invalid month yields empty stats.
    pub fn monthly_stats(&self, year: Option<i32>, month: Option<u32>) -> UsageStats {
        let today = self.today();
        let year = year.unwrap_or(today.year());
        let month = month.unwrap_or(today.month());
        match month_bounds(year, month) {
            Some((start, end)) => self.stats_between(start, end),
            None => {
                debug!(year, month, "invalid month requested");
                UsageStats::default()
            }
        }
    }

    pub fn user_stats(&self, user_id: &str) -> UsageStats {
        self.stats(&StatsFilter::new().user(user_id))
    }

    pub fn service_stats(&self, service: &str) -> UsageStats {
        self.stats(&StatsFilter::new().service(service))
    }

    /// Up to `limit` records, newest first.
    pub fn recent_records(&self, limit: usize) -> Vec<UsageRecord> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn export_json(&self) -> Result<String> {
        let records = self.lock();
        let doc = ExportDocument {
            exported_at: self.clock.now(),
            record_count: records.len(),
            records: &*records,
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Replaces the ledger with the records of an export document.
    ///
    /// A document without a `records` array leaves the ledger untouched and
    /// imports nothing. Only the newest `max_records` are kept.
    pub fn import_json(&self, json: &str) -> Result<usize> {
        let doc: ImportDocument = serde_json::from_str(json)?;
        let Some(mut imported) = doc.records else {
            return Ok(0);
        };
        if imported.len() > self.max_records {
            imported.drain(..imported.len() - self.max_records);
        }
        let count = imported.len();
        *self.lock() = imported.into();
        info!(count, "imported usage records");
        Ok(count)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&Local).date_naive()
    }
}

fn aggregate<'a>(records: impl Iterator<Item = &'a UsageRecord>) -> UsageStats {
    let mut stats = UsageStats::default();
    let mut total_cost = 0.0;
    for r in records {
        stats.total_calls += 1;
        if r.success {
            stats.successful_calls += 1;
        }
        if r.cache_hit {
            stats.cached_calls += 1;
        }
        let tokens = u64::from(r.tokens.total_tokens);
        stats.total_tokens += tokens;
        total_cost += r.cost.total_cost;

        let svc = stats.by_service.entry(r.service.clone()).or_default();
        svc.calls += 1;
        svc.tokens += tokens;
        svc.cost += r.cost.total_cost;

        let date = r.timestamp.format("%Y-%m-%d").to_string();
        let day = stats.by_day.entry(date.clone()).or_insert_with(|| DailyStats {
            date,
            ..DailyStats::default()
        });
        day.calls += 1;
        day.tokens += tokens;
        day.cost += r.cost.total_cost;
    }

    stats.failed_calls = stats.total_calls - stats.successful_calls;
    stats.total_cost = round_to(total_cost, 6);
    if stats.total_calls > 0 {
        let calls = stats.total_calls as f64;
        stats.average_tokens_per_call = round_to(stats.total_tokens as f64 / calls, 2);
        stats.cache_hit_rate = round_to(stats.cached_calls as f64 / calls, 4);
    }
    for svc in stats.by_service.values_mut() {
        svc.cost = round_to(svc.cost, 6);
    }
    for day in stats.by_day.values_mut() {
        day.cost = round_to(day.cost, 6);
    }
    stats
}

fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

fn month_bounds(year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((local_midnight(first), local_midnight(next)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn local_noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, m, d, 12, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn tracker(max: usize) -> (CostTracker, ManualClock) {
        let clock = ManualClock::new(local_noon(2026, 3, 15));
        (
            CostTracker::new(max, ModelPricing::deepseek_chat(), Arc::new(clock.clone())),
            clock,
        )
    }

    #[test]
    fn test_track_prices_record() {
        let (t, _) = tracker(10);
        let r = t.track(
            "summary",
            "generate",
            TokenUsage::new(1_000_000, 1_000_000),
            TrackOptions::default(),
        );
        assert!((r.cost.total_cost - 0.42).abs() < 1e-9);
        assert!(r.success);
        assert!(!r.cache_hit);
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let (t, _) = tracker(3);
        for i in 0..5 {
            t.track("svc", &format!("op{i}"), TokenUsage::new(1, 1), TrackOptions::default());
        }
        assert_eq!(t.len(), 3);
        let recent = t.recent_records(10);
        assert_eq!(recent[0].operation, "op4");
        assert_eq!(recent[2].operation, "op2");
    }

    #[test]
    fn test_stats_aggregates() {
        let (t, _) = tracker(100);
        t.track("summary", "a", TokenUsage::new(100, 50), TrackOptions::default().with_user("u1"));
        t.track("summary", "a", TokenUsage::zero(), TrackOptions::failed());
        t.track(
            "sentiment",
            "b",
            TokenUsage::new(10, 10),
            TrackOptions::default().with_cache_hit(true),
        );

        let s = t.stats(&StatsFilter::new());
        assert_eq!(s.total_calls, 3);
        assert_eq!(s.successful_calls, 2);
        assert_eq!(s.failed_calls, 1);
        assert_eq!(s.cached_calls, 1);
        assert_eq!(s.total_tokens, 170);
        assert_eq!(s.average_tokens_per_call, 56.67);
        assert_eq!(s.cache_hit_rate, 0.3333);
        assert_eq!(s.by_service["summary"].calls, 2);
        assert_eq!(s.by_day.len(), 1);

        assert_eq!(t.user_stats("u1").total_calls, 1);
        assert_eq!(t.service_stats("sentiment").total_tokens, 20);
    }

    #[test]
    fn test_time_filter_is_inclusive() {
        let (t, clock) = tracker(100);
        let first = t.track("s", "o", TokenUsage::new(1, 0), TrackOptions::default());
        clock.advance(Duration::from_secs(60));
        t.track("s", "o", TokenUsage::new(1, 0), TrackOptions::default());
        let s = t.stats(&StatsFilter::new().until(first.timestamp));
        assert_eq!(s.total_calls, 1);
        let s = t.stats(&StatsFilter::new().since(first.timestamp));
        assert_eq!(s.total_calls, 2);
    }

    #[test]
    fn test_daily_and_monthly_windows() {
        let (t, clock) = tracker(100);
        t.track("s", "o", TokenUsage::new(1000, 0), TrackOptions::default());
        clock.set(local_noon(2026, 3, 16));
        t.track("s", "o", TokenUsage::new(2000, 0), TrackOptions::default());
        clock.set(local_noon(2026, 4, 1));
        t.track("s", "o", TokenUsage::new(4000, 0), TrackOptions::default());

        let day = t.daily_stats(NaiveDate::from_ymd_opt(2026, 3, 16));
        assert_eq!(day.date, "2026-03-16");
        assert_eq!(day.calls, 1);
        assert_eq!(day.tokens, 2000);

        assert_eq!(t.daily_stats(None).tokens, 4000);
        assert_eq!(t.monthly_stats(Some(2026), Some(3)).total_calls, 2);
        assert_eq!(t.monthly_stats(None, None).total_calls, 1);
        assert_eq!(t.monthly_stats(Some(2026), Some(13)).total_calls, 0);
    }

    #[test]
    fn test_export_import_round_trip() {
        let (t, _) = tracker(100);
        t.track("summary", "a", TokenUsage::new(5, 5), TrackOptions::default());
        t.track("trend-analysis", "b", TokenUsage::new(7, 7), TrackOptions::default());
        let json = t.export_json().unwrap();
        assert!(json.contains("\"record_count\": 2"));

        let (other, _) = tracker(1);
        assert_eq!(other.import_json(&json).unwrap(), 1);
        assert_eq!(other.recent_records(1)[0].service, "trend-analysis");

        assert_eq!(other.import_json("{\"unrelated\": true}").unwrap(), 0);
        assert_eq!(other.len(), 1);
        assert!(other.import_json("not json").is_err());
    }
}
