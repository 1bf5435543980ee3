//! # newslens-ai
//!
//! 新闻分析应用的 AI 调用可靠性层：缓存、重试、降级、熔断与成本追踪。
//!
//! Reliability layer for the AI calls of a news-analysis service. Every call
//! to the language model goes through caching, retries, error classification,
//! rule-based fallbacks and cost accounting, so the news features stay
//! available (and affordable) when the upstream model is slow, failing or
//! rate limited.
//!
//! ## Core Philosophy
//!
//! - **Never pay twice**: identical requests are answered from a per-service cache
//! - **Degrade, don't fail**: transient failures are retried, then replaced by a rule-based result
//! - **Surface configuration problems**: auth and quota failures always reach the caller
//! - **Account for everything**: each AI call lands in a bounded usage ledger checked against a budget
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use newslens_ai::config::AiConfig;
//! use newslens_ai::services::{sentiment, AiContext};
//!
//! #[tokio::main]
//! async fn main() -> newslens_ai::Result<()> {
//!     let ctx = AiContext::from_config(&AiConfig::from_env()?)?;
//!     let resp = sentiment::analyze_sentiment(
//!         &ctx,
//!         "Chipmakers rally as demand for AI accelerators surges",
//!         Default::default(),
//!     )
//!     .await?;
//!     println!("{:?} (fallback: {})", resp.data.sentiment, resp.used_fallback);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`tokens`] | Token estimation and cost calculation |
//! | [`cache`] | TTL caches with LRU/LFU eviction, per-service registry |
//! | [`resilience`] | Retry, error classification, fallback and circuit breaker |
//! | [`error_code`] | Classified AI error kinds |
//! | [`usage`] | Usage ledger, statistics and budget checks |
//! | [`client`] | LLM client trait and the DeepSeek HTTP client |
//! | [`structured`] | JSON extraction from model output |
//! | [`services`] | Summary, sentiment, clustering, trend and SEO services |
//! | [`config`] | YAML + environment configuration |
//! | [`clock`] | Injectable time source |

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error_code;
pub mod resilience;
pub mod services;
pub mod structured;
pub mod tokens;
pub mod usage;

pub use services::{AiContext, ServiceResponse};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
