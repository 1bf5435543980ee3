//! 结果缓存模块：按服务划分的 TTL + LRU/LFU 缓存，避免重复调用 LLM。
//!
//! # Result Caching Module
//!
//! Every AI service result is cached under a content-addressed key so that
//! identical requests never pay for a second LLM call.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | Keyed store with TTL expiry, bounded size and hit/miss statistics |
//! | [`CacheConfig`] | TTL, capacity and [`EvictionStrategy`] for one cache |
//! | [`CachePresets`] | `short` / `standard` / `long` configurations |
//! | [`CacheRegistry`] | One named cache per service, created lazily |
//! | [`cache_key`] | Deterministic key from a service name and parameters |
//!
//! ## Example
//!
//! ```rust
//! use newslens_ai::cache::{cache_key, CacheManager, CachePresets};
//! use newslens_ai::clock::system_clock;
//! use serde_json::json;
//!
//! let cache: CacheManager<String> = CacheManager::new(CachePresets::short(), system_clock());
//! let key = cache_key("summary", &json!({"content": "…", "language": "en"}));
//! cache.set(&key, "cached summary".to_string(), None);
//! assert_eq!(cache.get(&key).as_deref(), Some("cached summary"));
//! ```

mod key;
mod manager;
mod registry;

pub use key::{cache_key, cache_key_from_value, canonical_json};
pub use manager::{
    CacheConfig, CacheEntry, CacheManager, CachePresets, CacheStats, Computed, EvictionStrategy,
    Lookup,
};
pub use registry::CacheRegistry;
