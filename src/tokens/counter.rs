//! Token counter implementations.

use serde::{Deserialize, Serialize};

/// Token usage reported by (or estimated for) one LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
    }
}

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u32;

    fn count_prompt(&self, prompt: &str, user_content: Option<&str>) -> u32 {
        self.count(prompt)
            .saturating_add(user_content.map(|c| self.count(c)).unwrap_or(0))
    }
}

/// Roughly four characters per token. Not exact; only used when the
/// upstream API does not report usage.
#[derive(Debug, Clone)]
pub struct CharacterEstimator {
    chars_per_token: f64,
}
impl CharacterEstimator {
    pub fn new() -> Self {
        Self::with_ratio(4.0)
    }
    pub fn with_ratio(r: f64) -> Self {
        Self { chars_per_token: r }
    }
}
impl Default for CharacterEstimator {
    fn default() -> Self {
        Self::new()
    }
}
impl TokenCounter for CharacterEstimator {
    fn count(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count() as f64;
        ((chars / self.chars_per_token).round() as u32).max(1)
    }
}

/// `max(1, round(len / 4))`, or 0 for empty text.
pub fn estimate_tokens(text: &str) -> u32 {
    CharacterEstimator::new().count(text)
}

pub fn estimate_prompt_tokens(prompt: &str, user_content: Option<&str>) -> u32 {
    CharacterEstimator::new().count_prompt(prompt, user_content)
}
