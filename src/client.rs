//! LLM client interface and the DeepSeek HTTP implementation.
//!
//! Services depend only on the [`LlmClient`] trait; tests substitute their
//! own implementation.

pub mod deepseek;
pub mod llm;

pub use deepseek::DeepSeekClient;
pub use llm::{ChatCompletion, ChatMessage, ChatRequest, LlmClient, MessageRole};
