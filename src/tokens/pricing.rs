//! Model pricing and cost calculation.

use super::counter::TokenUsage;
use serde::{Deserialize, Serialize};

/// Per-token rates for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub input_per_token: f64,
    pub output_per_token: f64,
    pub currency: String,
}

impl ModelPricing {
    pub fn new(model: &str, input_per_token: f64, output_per_token: f64) -> Self {
        Self {
            model: model.into(),
            input_per_token,
            output_per_token,
            currency: "USD".into(),
        }
    }

    /// Rates quoted per million tokens, the way providers publish them.
    pub fn per_million(model: &str, input: f64, output: f64) -> Self {
        Self::new(model, input / 1_000_000.0, output / 1_000_000.0)
    }

    /// DeepSeek chat: $0.14 / 1M input, $0.28 / 1M output.
    pub fn deepseek_chat() -> Self {
        Self::per_million("deepseek-chat", 0.14, 0.28)
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn cost(&self, tokens: &TokenUsage) -> CostCalculation {
        let prompt_cost = tokens.prompt_tokens as f64 * self.input_per_token;
        let completion_cost = tokens.completion_tokens as f64 * self.output_per_token;
        CostCalculation {
            prompt_cost: round6(prompt_cost),
            completion_cost: round6(completion_cost),
            total_cost: round6(prompt_cost + completion_cost),
            currency: self.currency.clone(),
        }
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self::deepseek_chat()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCalculation {
    pub prompt_cost: f64,
    pub completion_cost: f64,
    pub total_cost: f64,
    pub currency: String,
}

impl CostCalculation {
    pub fn zero(currency: impl Into<String>) -> Self {
        Self {
            prompt_cost: 0.0,
            completion_cost: 0.0,
            total_cost: 0.0,
            currency: currency.into(),
        }
    }

    pub fn format(&self) -> String {
        format!("{} {:.6}", self.currency, self.total_cost)
    }
}

pub(crate) fn round6(v: f64) -> f64 {
    round_to(v, 6)
}

pub(crate) fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}
