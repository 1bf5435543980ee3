//! Token 估算与成本计算模块：在上游未返回用量时估算 Token 数，并按价格表计算费用。
//!
//! # Token Estimation and Cost Module
//!
//! Token usage is reported by the upstream API when available; otherwise it is
//! approximated from text length. Usage is converted into money with a fixed
//! per-token pricing table, separate for input and output tokens.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TokenUsage`] | Prompt/completion/total token counts |
//! | [`TokenCounter`] | Trait for token counting implementations |
//! | [`CharacterEstimator`] | Fast character-based approximation (4 chars ≈ 1 token) |
//! | [`ModelPricing`] | Per-token input/output rates |
//! | [`CostCalculation`] | Cost breakdown rounded to 6 decimals |
//!
//! ## Example
//!
//! ```rust
//! use newslens_ai::tokens::{estimate_tokens, ModelPricing, TokenUsage};
//!
//! let prompt_tokens = estimate_tokens("Summarize today's headlines");
//! let usage = TokenUsage::new(prompt_tokens, 120);
//! let cost = ModelPricing::deepseek_chat().cost(&usage);
//! println!("Estimated cost: {}", cost.format());
//! ```

mod counter;
mod pricing;

pub use counter::{
    estimate_prompt_tokens, estimate_tokens, CharacterEstimator, TokenCounter, TokenUsage,
};
pub use pricing::{CostCalculation, ModelPricing};

pub(crate) use pricing::round_to;
