//! 用量与成本追踪模块：记录每次 AI 调用的 Token 与费用，并提供统计和预算检查。
//!
//! # Usage Tracking Module
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CostTracker`] | Bounded ring buffer of [`UsageRecord`]s with aggregate queries |
//! | [`UsageStats`] | Totals plus per-service and per-day breakdowns |
//! | [`BudgetConfig`] / [`BudgetStatus`] | Daily and monthly spend limits |
//!
//! ```rust
//! use newslens_ai::tokens::TokenUsage;
//! use newslens_ai::usage::{BudgetConfig, CostTracker, TrackOptions};
//!
//! let tracker = CostTracker::default();
//! tracker.track("summary", "generate", TokenUsage::new(800, 200), TrackOptions::default());
//! let status = tracker.check_budget(&BudgetConfig::new(10.0, 200.0));
//! assert!(!status.daily_exceeded);
//! ```

mod budget;
mod tracker;

pub use budget::{check_budget, BudgetConfig, BudgetStatus};
pub use tracker::{
    CostTracker, DailyStats, ServiceStats, StatsFilter, TrackOptions, UsageRecord, UsageStats,
    DEFAULT_MAX_RECORDS,
};
