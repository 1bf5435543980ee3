//! Spend limits checked against the usage ledger.

use super::tracker::CostTracker;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Daily limit in the pricing currency.
    pub daily: f64,
    pub monthly: f64,
    /// Fraction of a limit at which a warning is raised (e.g. `0.8`).
    pub warning_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily: 10.0,
            monthly: 200.0,
            warning_threshold: 0.8,
        }
    }
}

impl BudgetConfig {
    pub fn new(daily: f64, monthly: f64) -> Self {
        Self {
            daily,
            monthly,
            ..Self::default()
        }
    }

    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub daily_exceeded: bool,
    pub monthly_exceeded: bool,
    pub daily_warning: bool,
    pub monthly_warning: bool,
    pub daily_usage: f64,
    pub monthly_usage: f64,
}

impl BudgetStatus {
    pub fn any_exceeded(&self) -> bool {
        self.daily_exceeded || self.monthly_exceeded
    }

    pub fn any_warning(&self) -> bool {
        self.daily_warning || self.monthly_warning
    }
}

/// Compares today's and this month's spend against `config`.
pub fn check_budget(tracker: &CostTracker, config: &BudgetConfig) -> BudgetStatus {
    let daily_usage = tracker.daily_stats(None).cost;
    let monthly_usage = tracker.monthly_stats(None, None).total_cost;

    let status = BudgetStatus {
        daily_exceeded: daily_usage >= config.daily,
        monthly_exceeded: monthly_usage >= config.monthly,
        daily_warning: daily_usage >= config.daily * config.warning_threshold,
        monthly_warning: monthly_usage >= config.monthly * config.warning_threshold,
        daily_usage,
        monthly_usage,
    };
    if status.any_exceeded() {
        warn!(daily_usage, monthly_usage, "AI budget exceeded");
    } else if status.any_warning() {
        warn!(daily_usage, monthly_usage, "AI budget warning threshold reached");
    }
    status
}

impl CostTracker {
    pub fn check_budget(&self, config: &BudgetConfig) -> BudgetStatus {
        check_budget(self, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::tokens::{ModelPricing, TokenUsage};
    use crate::usage::TrackOptions;
    use std::sync::Arc;

    // 1 token = 1 currency unit, so token counts read as spend.
    fn tracker() -> CostTracker {
        let pricing = ModelPricing::new("flat", 0.01, 0.0);
        CostTracker::new(100, pricing, Arc::new(ManualClock::starting_now()))
    }

    #[test]
    fn test_warning_below_limit() {
        let t = tracker();
        t.track("summary", "generate", TokenUsage::new(801, 0), TrackOptions::default());
        let status = t.check_budget(&BudgetConfig::new(10.0, 1000.0));
        assert!((status.daily_usage - 8.01).abs() < 1e-9);
        assert!(status.daily_warning);
        assert!(!status.daily_exceeded);
        assert!(!status.monthly_warning);
    }

    #[test]
    fn test_exceeded_uses_inclusive_comparison() {
        let t = tracker();
        t.track("summary", "generate", TokenUsage::new(1000, 0), TrackOptions::default());
        let status = check_budget(&t, &BudgetConfig::new(10.0, 10.0));
        assert!(status.daily_exceeded);
        assert!(status.monthly_exceeded);
        assert!(status.any_warning());
    }

    #[test]
    fn test_empty_ledger() {
        let status = tracker().check_budget(&BudgetConfig::default());
        assert_eq!(status.daily_usage, 0.0);
        assert!(!status.any_warning());
    }
}
