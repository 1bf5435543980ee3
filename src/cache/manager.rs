//! Cache manager.

use crate::clock::{to_chrono, Clock};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Evict the entry with the oldest `last_accessed_at`.
    Lru,
    /// Evict the entry with the lowest `access_count`.
    Lfu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    pub max_entries: usize,
    pub eviction: EvictionStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CachePresets::standard()
    }
}

impl CacheConfig {
    pub fn new(ttl: Duration, max_entries: usize, eviction: EvictionStrategy) -> Self {
        Self {
            ttl,
            max_entries,
            eviction,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// `0` disables storage: every `set` is dropped.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_eviction(mut self, eviction: EvictionStrategy) -> Self {
        self.eviction = eviction;
        self
    }
}

/// Predefined cache configurations.
pub struct CachePresets;

impl CachePresets {
    /// 1 hour, 100 entries, LRU.
    pub fn short() -> CacheConfig {
        CacheConfig::new(Duration::from_secs(3600), 100, EvictionStrategy::Lru)
    }
    /// 6 hours, 500 entries, LRU.
    pub fn standard() -> CacheConfig {
        CacheConfig::new(Duration::from_secs(21_600), 500, EvictionStrategy::Lru)
    }
    /// 24 hours, 1000 entries, LFU.
    pub fn long() -> CacheConfig {
        CacheConfig::new(Duration::from_secs(86_400), 1000, EvictionStrategy::Lfu)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    /// Insertion order, used to break eviction ties deterministically.
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub hit_rate: f64,
    pub total_requests: u64,
}

/// Outcome of [`CacheManager::get_or_compute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Hit(V),
    Miss(V),
}

impl<V> Lookup<V> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
    pub fn into_inner(self) -> V {
        match self {
            Lookup::Hit(v) | Lookup::Miss(v) => v,
        }
    }
}

/// Computed value plus whether it may be stored.
#[derive(Debug, Clone)]
pub struct Computed<V> {
    pub value: V,
    pub store: bool,
}

impl<V> Computed<V> {
    pub fn store(value: V) -> Self {
        Self { value, store: true }
    }
    /// Returned to the caller but never cached (e.g., fallback results).
    pub fn skip(value: V) -> Self {
        Self { value, store: false }
    }
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    next_seq: u64,
}

/// Keyed store with TTL expiry and bounded size.
pub struct CacheManager<V> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner<V>>,
    inflight: Mutex<HashMap<String, Gate>>,
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Membership in the in-flight computation for one key.
///
/// Dropping it, on completion or cancellation, removes the key's gate once
/// no other caller holds it. Every clone of a gate is created and dropped
/// under the `inflight` lock, so the strong count is exact there.
struct Flight<'a> {
    inflight: &'a Mutex<HashMap<String, Gate>>,
    key: &'a str,
    gate: Option<Gate>,
}

impl<'a> Flight<'a> {
    fn join(inflight: &'a Mutex<HashMap<String, Gate>>, key: &'a str) -> Self {
        let gate = inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        Self {
            inflight,
            key,
            gate: Some(gate),
        }
    }

    async fn turn(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(gate) = self.gate.take() {
            // the map and this flight
            let idle = Arc::strong_count(&gate) <= 2;
            if idle && inflight.get(self.key).is_some_and(|g| Arc::ptr_eq(g, &gate)) {
                inflight.remove(self.key);
            }
            drop(gate);
        }
    }
}

impl<V: Clone> CacheManager<V> {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                next_seq: 0,
            }),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.lock();
        match inner.entries.get(key).map(|e| e.is_expired(now)) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(true) => {
                inner.entries.remove(key);
                inner.misses += 1;
                return None;
            }
            Some(false) => {}
        }
        inner.hits += 1;
        let entry = inner.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed_at = now;
        Some(entry.value.clone())
    }

    /// Lookup that leaves counters and access metadata untouched.
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.lock()
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        if self.config.max_entries == 0 {
            return;
        }
        let now = self.clock.now();
        let ttl = ttl.unwrap_or(self.config.ttl);
        let mut inner = self.lock();

        let existing_seq = inner.entries.get(key).map(|e| e.seq);
        let seq = match existing_seq {
            Some(seq) => seq,
            None => {
                if inner.entries.len() >= self.config.max_entries {
                    self.evict_one(&mut inner);
                }
                inner.next_seq += 1;
                inner.next_seq
            }
        };

        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                created_at: now,
                expires_at: now + to_chrono(ttl),
                access_count: 0,
                last_accessed_at: now,
                seq,
            },
        );
    }

    fn evict_one(&self, inner: &mut Inner<V>) {
        let victim = match self.config.eviction {
            EvictionStrategy::Lru => inner
                .entries
                .values()
                .min_by_key(|e| (e.last_accessed_at, e.seq))
                .map(|e| e.key.clone()),
            EvictionStrategy::Lfu => inner
                .entries
                .values()
                .min_by_key(|e| (e.access_count, e.seq))
                .map(|e| e.key.clone()),
        };
        if let Some(k) = victim {
            debug!(key = %k, strategy = ?self.config.eviction, "evicting cache entry");
            inner.entries.remove(&k);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();
        match inner.entries.get(key).map(|e| e.is_expired(now)) {
            Some(false) => true,
            Some(true) => {
                inner.entries.remove(key);
                false
            }
            None => false,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Removes every entry and resets the hit/miss counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    /// Sweeps expired entries, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now));
        before - inner.entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of an entry including its access metadata.
    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lock().entries.get(key).cloned()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let total_requests = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
            hit_rate: if total_requests == 0 {
                0.0
            } else {
                inner.hits as f64 / total_requests as f64
            },
            total_requests,
        }
    }

    /// Single-flight lookup.
    ///
    /// Concurrent misses for the same key wait on one computation; waiters
    /// re-check the cache once the first computation has finished.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<Lookup<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<V>>>,
    {
        if let Some(v) = self.get(key) {
            return Ok(Lookup::Hit(v));
        }

        let flight = Flight::join(&self.inflight, key);
        let _turn = flight.turn().await;

        if let Some(v) = self.peek(key) {
            return Ok(Lookup::Hit(v));
        }

        let outcome = compute().await;
        if let Ok(computed) = &outcome {
            if computed.store {
                self.set(key, computed.value.clone(), ttl);
            }
        }
        outcome.map(|c| Lookup::Miss(c.value))
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cache(max: usize, eviction: EvictionStrategy) -> (CacheManager<u32>, ManualClock) {
        let clock = ManualClock::starting_now();
        let cfg = CacheConfig::new(Duration::from_secs(60), max, eviction);
        (CacheManager::new(cfg, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_hit_updates_access_metadata() {
        let (cache, clock) = cache(10, EvictionStrategy::Lru);
        cache.set("a", 1, None);
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get("a"), Some(1));
        let entry = cache.entry("a").unwrap();
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.last_accessed_at, clock.now());
    }

    #[test]
    fn test_ttl_expiry_counts_miss() {
        let (cache, clock) = cache(10, EvictionStrategy::Lru);
        cache.set("k", 7, Some(Duration::from_secs(1)));
        clock.advance(Duration::from_millis(1100));
        assert_eq!(cache.get("k"), None);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.size, 0, "stale entry is evicted on access");
    }

    #[test]
    fn test_entry_valid_until_exact_expiry() {
        let (cache, clock) = cache(10, EvictionStrategy::Lru);
        cache.set("k", 7, Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("k"), Some(7));
    }

    #[test]
    fn test_lru_evicts_least_recently_accessed() {
        let (cache, clock) = cache(3, EvictionStrategy::Lru);
        cache.set("a", 1, None);
        clock.advance(Duration::from_secs(1));
        cache.set("b", 2, None);
        clock.advance(Duration::from_secs(1));
        cache.set("c", 3, None);
        clock.advance(Duration::from_secs(1));
        // touch "a" so "b" becomes least recent
        cache.get("a");
        clock.advance(Duration::from_secs(1));
        cache.set("d", 4, None);

        assert_eq!(cache.len(), 3);
        assert!(cache.peek("b").is_none());
        assert!(cache.peek("a").is_some());
        assert!(cache.peek("d").is_some());
    }

    #[test]
    fn test_lfu_evicts_least_frequently_accessed() {
        let (cache, _clock) = cache(3, EvictionStrategy::Lfu);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);
        cache.get("a");
        cache.get("a");
        cache.get("c");
        cache.set("d", 4, None);
        assert!(cache.peek("b").is_none());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_ties_evict_earliest_inserted() {
        let (cache, _clock) = cache(2, EvictionStrategy::Lfu);
        cache.set("first", 1, None);
        cache.set("second", 2, None);
        cache.set("third", 3, None);
        assert!(cache.peek("first").is_none());
        assert!(cache.peek("second").is_some());
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (cache, _clock) = cache(2, EvictionStrategy::Lru);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("a", 10, None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek("a"), Some(10));
        assert_eq!(cache.peek("b"), Some(2));
    }

    #[test]
    fn test_never_exceeds_max_entries() {
        let (cache, clock) = cache(5, EvictionStrategy::Lru);
        for i in 0..50u32 {
            cache.set(&format!("k{i}"), i, None);
            clock.advance(Duration::from_millis(10));
            assert!(cache.len() <= 5);
        }
    }

    #[test]
    fn test_cleanup_sweeps_only_expired() {
        let (cache, clock) = cache(10, EvictionStrategy::Lru);
        cache.set("short", 1, Some(Duration::from_secs(1)));
        cache.set("long", 2, Some(Duration::from_secs(100)));
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().misses, 0, "cleanup is not a lookup");
    }

    #[test]
    fn test_stats_hit_rate() {
        let (cache, _clock) = cache(10, EvictionStrategy::Lru);
        cache.set("a", 1, None);
        cache.get("a");
        cache.get("a");
        cache.get("missing");
        let stats = cache.stats();
        assert_eq!(stats.total_requests, 3);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_get_or_compute_skips_storing_when_asked() {
        let (cache, _clock) = cache(10, EvictionStrategy::Lru);
        let lookup = cache
            .get_or_compute("k", None, || async { Ok(Computed::skip(5)) })
            .await
            .unwrap();
        assert_eq!(lookup, Lookup::Miss(5));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_compute_single_flight() {
        let (cache, _clock) = cache(10, EvictionStrategy::Lru);
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("same", None, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(Computed::store(42))
                    })
                    .await
                    .unwrap()
                    .into_inner()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_computations_release_their_gates() {
        let (cache, _clock) = cache(100, EvictionStrategy::Lru);
        for i in 0..50 {
            let key = format!("k{i}");
            let pending = cache.get_or_compute(&key, None, || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Computed::store(1))
            });
            let res = tokio::time::timeout(Duration::from_millis(1), pending).await;
            assert!(res.is_err());
        }
        assert_eq!(cache.inflight_len(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_leader_keeps_waiter_single_flight() {
        let (cache, _clock) = cache(10, EvictionStrategy::Lru);
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicU32::new(0));

        let compute = |calls: Arc<AtomicU32>, delay: u64| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(delay)).await;
                Ok(Computed::store(7))
            }
        };

        let leader = {
            let cache = cache.clone();
            let f = compute(calls.clone(), 3600);
            tokio::spawn(async move { cache.get_or_compute("same", None, f).await })
        };
        tokio::task::yield_now().await;
        let waiter = {
            let cache = cache.clone();
            let f = compute(calls.clone(), 1);
            tokio::spawn(async move { cache.get_or_compute("same", None, f).await })
        };
        tokio::task::yield_now().await;
        leader.abort();

        let v = waiter.await.unwrap().unwrap().into_inner();
        assert_eq!(v, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.inflight_len(), 0);
    }

    #[tokio::test]
    async fn test_completed_computation_releases_gate() {
        let (cache, _clock) = cache(10, EvictionStrategy::Lru);
        cache
            .get_or_compute("k", None, || async { Ok(Computed::store(3)) })
            .await
            .unwrap();
        assert_eq!(cache.inflight_len(), 0);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let (cache, _clock) = cache(0, EvictionStrategy::Lru);
        cache.set("a", 1, None);
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[tokio::test]
    async fn test_get_or_compute_error_not_cached() {
        let (cache, _clock) = cache(10, EvictionStrategy::Lru);
        let res = cache
            .get_or_compute("k", None, || async { Err(crate::Error::message("boom")) })
            .await;
        assert!(res.is_err());
        assert!(cache.peek("k").is_none());
    }
}
