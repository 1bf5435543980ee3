//! Runtime configuration.
//!
//! Values come from an optional YAML file and are then overridden by
//! environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DEEPSEEK_API_KEY` | `llm.api_key` |
//! | `DEEPSEEK_BASE_URL` | `llm.base_url` |
//! | `DEEPSEEK_MODEL` | `llm.model` |
//! | `NEWSLENS_HTTP_TIMEOUT_SECS` | `llm.timeout_secs` |
//! | `NEWSLENS_DAILY_BUDGET` | `budget.daily` |
//! | `NEWSLENS_MONTHLY_BUDGET` | `budget.monthly` |

use crate::resilience::CircuitBreakerConfig;
use crate::usage::{BudgetConfig, DEFAULT_MAX_RECORDS};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Client-side HTTP timeout; kept below the caller's request deadline.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 12,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_records: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Base of the linear/exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { base_delay_ms: 1000 }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub llm: LlmConfig,
    pub budget: BudgetConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub tracker: TrackerConfig,
    pub retry: RetrySettings,
}

impl AiConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: AiConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("Failed to read config file: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|k| std::env::var(k).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup` (usually `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("DEEPSEEK_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = non_empty("DEEPSEEK_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = non_empty("DEEPSEEK_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = non_empty("NEWSLENS_HTTP_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_var("NEWSLENS_HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = non_empty("NEWSLENS_DAILY_BUDGET") {
            self.budget.daily = parse_var("NEWSLENS_DAILY_BUDGET", &v)?;
        }
        if let Some(v) = non_empty("NEWSLENS_MONTHLY_BUDGET") {
            self.budget.monthly = parse_var("NEWSLENS_MONTHLY_BUDGET", &v)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: &str| {
            Err(Error::configuration_with_context(
                msg.to_string(),
                ErrorContext::new()
                    .with_field_path(field)
                    .with_source("config_loader"),
            ))
        };
        if self.llm.base_url.trim().is_empty() {
            return invalid("llm.base_url", "base URL must not be empty");
        }
        if self.llm.timeout_secs == 0 {
            return invalid("llm.timeout_secs", "timeout must be positive");
        }
        if !(0.0..=1.0).contains(&self.budget.warning_threshold) {
            return invalid("budget.warning_threshold", "warning threshold must be within 0..=1");
        }
        if self.budget.daily < 0.0 || self.budget.monthly < 0.0 {
            return invalid("budget", "budget limits must not be negative");
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return invalid("circuit_breaker.failure_threshold", "threshold must be at least 1");
        }
        if self.tracker.max_records == 0 {
            return invalid("tracker.max_records", "ledger capacity must be at least 1");
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        Error::configuration_with_context(
            format!("Invalid value for {}", name),
            ErrorContext::new()
                .with_field_path(name)
                .with_details(format!("got {:?}", value))
                .with_source("config_loader"),
        )
    })
}
