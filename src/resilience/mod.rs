//! 弹性模式模块：提供重试、错误分类、降级和熔断等可靠性保障机制。
//!
//! # Resilience Primitives Module
//!
//! Every LLM call made by the services passes through these layers:
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`retry`] | Per-attempt timeout plus linear/exponential backoff |
//! | [`classify`] | Maps raw failures onto [`AiErrorKind`](crate::error_code::AiErrorKind) |
//! | [`fallback`] | Substitutes a rule-based result for eligible failures |
//! | [`circuit_breaker`] | Stops calling a failing upstream for a cooldown period |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Failures reached the threshold, requests go straight to the fallback
//! - **Half-Open**: Cooldown elapsed, the next request probes the upstream
//!
//! ```rust
//! use newslens_ai::clock::system_clock;
//! use newslens_ai::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_cooldown(Duration::from_secs(60));
//! let breaker = CircuitBreaker::new(config, system_clock());
//!
//! if breaker.allow() {
//!     // Make API call...
//!     breaker.record_success();
//! }
//! ```
//!
//! ## Retry
//!
//! ```rust,no_run
//! use newslens_ai::resilience::retry::{with_retry, RetryPresets};
//!
//! # async fn run() -> newslens_ai::Result<()> {
//! let answer = with_retry(|| async { Ok(42) }, &RetryPresets::standard()).await?;
//! # Ok(()) }
//! ```

pub mod circuit_breaker;
pub mod classify;
pub mod fallback;
pub mod retry;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
pub use classify::{classify, classify_message, should_fallback};
pub use fallback::{with_fallback, with_fallback_opts, FallbackOptions, FallbackOutcome};
pub use retry::{
    with_retry, with_retry_detailed, with_retry_observed, Backoff, RetryConfig, RetryPresets,
    RetryReport,
};
