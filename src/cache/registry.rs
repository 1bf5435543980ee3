//! Named per-service cache instances.

use super::manager::{CacheConfig, CacheManager, CacheStats, Computed, Lookup};
use crate::clock::Clock;
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// One cache per service name, created lazily on first use.
///
/// Values are stored as JSON so a single registry can hold caches of
/// different result types.
pub struct CacheRegistry {
    clock: Arc<dyn Clock>,
    instances: RwLock<HashMap<String, Arc<CacheManager<Value>>>>,
}

impl CacheRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cache for `service`, creating it with `config` (or the
    /// standard preset) if it does not exist yet. The config of an existing
    /// instance is never replaced.
    pub fn get_or_create(&self, service: &str, config: Option<CacheConfig>) -> Arc<CacheManager<Value>> {
        if let Some(c) = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
        {
            return c.clone();
        }
        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        instances
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(CacheManager::new(config.unwrap_or_default(), self.clock.clone()))
            })
            .clone()
    }

    pub fn get(&self, service: &str) -> Option<Arc<CacheManager<Value>>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .cloned()
    }

    fn all(&self) -> Vec<(String, Arc<CacheManager<Value>>)> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Sweeps expired entries from every cache.
    pub fn cleanup_all(&self) -> usize {
        self.all().iter().map(|(_, c)| c.cleanup()).sum()
    }

    pub fn stats_all(&self) -> BTreeMap<String, CacheStats> {
        self.all().into_iter().map(|(k, c)| (k, c.stats())).collect()
    }

    /// Empties every cache and resets their counters. Instances are kept.
    pub fn clear_all(&self) {
        for (_, c) in self.all() {
            c.clear();
        }
    }

    /// Typed single-flight lookup against the `service` cache.
    pub async fn cached_or_compute<T, F, Fut>(
        &self,
        service: &str,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cache = self.get_or_create(service, None);
        let lookup = cache
            .get_or_compute(key, ttl, || async {
                let value = compute().await?;
                Ok(Computed::store(serde_json::to_value(&value)?))
            })
            .await?;
        Ok(serde_json::from_value(lookup.into_inner())?)
    }

    /// Like [`Self::cached_or_compute`] but reports whether the value came
    /// from the cache and lets the computation decide whether to store.
    pub async fn lookup_or_compute<T, F, Fut>(
        &self,
        service: &str,
        config: Option<CacheConfig>,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<Lookup<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<T>>>,
    {
        let cache = self.get_or_create(service, config);
        let mut computed_value: Option<T> = None;
        let lookup = cache
            .get_or_compute(key, ttl, || async {
                let computed = compute().await?;
                let json = serde_json::to_value(&computed.value)?;
                let store = computed.store;
                computed_value = Some(computed.value);
                Ok(Computed { value: json, store })
            })
            .await?;
        match lookup {
            Lookup::Hit(v) => Ok(Lookup::Hit(serde_json::from_value(v)?)),
            Lookup::Miss(v) => match computed_value {
                Some(value) => Ok(Lookup::Miss(value)),
                None => Ok(Lookup::Miss(serde_json::from_value(v)?)),
            },
        }
    }
}
