//! Shared dependencies and the common service pipeline.

use super::ServiceResponse;
use crate::cache::{cache_key, CacheConfig, CacheRegistry, CacheStats, Computed, Lookup};
use crate::client::{ChatMessage, ChatRequest, DeepSeekClient, LlmClient};
use crate::clock::{system_clock, Clock};
use crate::config::{AiConfig, DEFAULT_MODEL};
use crate::resilience::{
    with_retry, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, FallbackOptions,
    RetryConfig,
};
use crate::tokens::{CharacterEstimator, ModelPricing, TokenCounter, TokenUsage};
use crate::usage::{
    BudgetConfig, BudgetStatus, CostTracker, StatsFilter, TrackOptions, UsageStats,
    DEFAULT_MAX_RECORDS,
};
use crate::{Error, ErrorContext, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// Everything a service call needs, passed explicitly instead of living in
/// process-wide singletons.
pub struct AiContext {
    llm: Arc<dyn LlmClient>,
    model: String,
    caches: CacheRegistry,
    tracker: Arc<CostTracker>,
    breaker_config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    budget: BudgetConfig,
    clock: Arc<dyn Clock>,
    base_delay: Duration,
    estimator: CharacterEstimator,
}

pub struct AiContextBuilder {
    llm: Arc<dyn LlmClient>,
    model: String,
    clock: Option<Arc<dyn Clock>>,
    tracker: Option<Arc<CostTracker>>,
    breaker_config: CircuitBreakerConfig,
    budget: BudgetConfig,
    base_delay: Duration,
}

impl AiContextBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn tracker(mut self, tracker: Arc<CostTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    /// Base unit for retry backoff.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn build(self) -> AiContext {
        let clock = self.clock.unwrap_or_else(system_clock);
        let tracker = self.tracker.unwrap_or_else(|| {
            Arc::new(CostTracker::new(
                DEFAULT_MAX_RECORDS,
                ModelPricing::default(),
                clock.clone(),
            ))
        });
        AiContext {
            llm: self.llm,
            model: self.model,
            caches: CacheRegistry::new(clock.clone()),
            tracker,
            breaker_config: self.breaker_config,
            breakers: RwLock::new(HashMap::new()),
            budget: self.budget,
            clock,
            base_delay: self.base_delay,
            estimator: CharacterEstimator::new(),
        }
    }
}

/// Snapshot of caches, ledger, breakers and budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiStatsReport {
    pub caches: BTreeMap<String, CacheStats>,
    pub usage: UsageStats,
    pub breakers: BTreeMap<String, CircuitBreakerSnapshot>,
    pub budget: BudgetStatus,
}

/// Describes one service invocation for [`AiContext::run`].
pub(crate) struct ServiceCall {
    pub service: &'static str,
    pub operation: &'static str,
    /// `None` for services that never cache.
    pub cache: Option<CacheConfig>,
    pub cache_params: Value,
    pub use_cache: bool,
    pub retry: RetryConfig,
    pub request: ChatRequest,
    pub user_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct CachedResult<T> {
    data: T,
    usage: TokenUsage,
}

impl AiContext {
    pub fn builder(llm: Arc<dyn LlmClient>) -> AiContextBuilder {
        AiContextBuilder {
            llm,
            model: DEFAULT_MODEL.to_string(),
            clock: None,
            tracker: None,
            breaker_config: CircuitBreakerConfig::default(),
            budget: BudgetConfig::default(),
            base_delay: Duration::from_secs(1),
        }
    }

    /// Context backed by the DeepSeek HTTP client.
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        config.validate()?;
        let llm = Arc::new(DeepSeekClient::new(&config.llm)?);
        let clock = system_clock();
        let tracker = Arc::new(CostTracker::new(
            config.tracker.max_records,
            ModelPricing::default(),
            clock.clone(),
        ));
        Ok(Self::builder(llm)
            .model(config.llm.model.clone())
            .clock(clock)
            .tracker(tracker)
            .circuit_breaker(config.circuit_breaker.clone())
            .budget(config.budget.clone())
            .base_delay(config.retry.base_delay())
            .build())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    pub fn tracker(&self) -> &Arc<CostTracker> {
        &self.tracker
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn budget_config(&self) -> &BudgetConfig {
        &self.budget
    }

    pub fn check_budget(&self) -> BudgetStatus {
        self.tracker.check_budget(&self.budget)
    }

    /// Breaker guarding `service`, created on first use.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(b) = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
        {
            return b.clone();
        }
        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(
                    CircuitBreaker::new(self.breaker_config.clone(), self.clock.clone())
                        .with_name(service),
                )
            })
            .clone()
    }

    fn all_breakers(&self) -> Vec<(String, Arc<CircuitBreaker>)> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Clears every cache, the usage ledger and all breaker state.
    pub fn reset(&self) {
        self.caches.clear_all();
        self.tracker.clear();
        for (_, b) in self.all_breakers() {
            b.reset();
        }
    }

    /// Sweeps expired cache entries; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        self.caches.cleanup_all()
    }

    pub fn stats_report(&self) -> AiStatsReport {
        AiStatsReport {
            caches: self.caches.stats_all(),
            usage: self.tracker.stats(&StatsFilter::new()),
            breakers: self
                .all_breakers()
                .into_iter()
                .map(|(k, b)| (k, b.snapshot()))
                .collect(),
            budget: self.check_budget(),
        }
    }

    pub(crate) fn chat(&self, system: &str, user: String) -> ChatRequest {
        ChatRequest::new(
            self.model.clone(),
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        )
    }

    pub(crate) fn retry_config(&self, preset: RetryConfig) -> RetryConfig {
        preset.with_base_delay(self.base_delay)
    }

    /// Cache → breaker → retry(LLM + parse) → fallback.
    pub(crate) async fn run<T, P, F>(
        &self,
        call: ServiceCall,
        parse: P,
        fallback: F,
    ) -> Result<ServiceResponse<T>>
    where
        T: Serialize + DeserializeOwned,
        P: Fn(&str) -> Result<T>,
        F: FnOnce() -> T,
    {
        let breaker = self.breaker(call.service);
        let this = self;
        let call = &call;
        let parse = &parse;
        let breaker = &breaker;
        let produce = move || async move {
            let outcome = breaker
                .execute(
                    this.attempt(call, parse),
                    move || async move { Ok((fallback(), TokenUsage::zero())) },
                    &FallbackOptions::default(),
                )
                .await?;
            Ok::<_, Error>(outcome)
        };

        let cache_config = match (&call.cache, call.use_cache) {
            (Some(cfg), true) => Some(cfg.clone()),
            _ => None,
        };
        let Some(cache_config) = cache_config else {
            let outcome = produce().await?;
            let (data, usage) = outcome.data;
            return Ok(ServiceResponse {
                data,
                usage,
                cached: false,
                used_fallback: outcome.used_fallback,
                error: outcome.error,
            });
        };

        let key = cache_key(call.service, &call.cache_params);
        let mut meta = (false, None);
        let meta_slot = &mut meta;
        let lookup = self
            .caches
            .lookup_or_compute(
                call.service,
                Some(cache_config),
                &key,
                None,
                move || async move {
                    let outcome = produce().await?;
                    let (data, usage) = outcome.data;
                    *meta_slot = (outcome.used_fallback, outcome.error);
                    let result = CachedResult { data, usage };
                    Ok(if outcome.used_fallback {
                        Computed::skip(result)
                    } else {
                        Computed::store(result)
                    })
                },
            )
            .await?;

        Ok(match lookup {
            Lookup::Hit(hit) => {
                debug!(service = call.service, key = %key, "cache hit");
                ServiceResponse {
                    data: hit.data,
                    usage: hit.usage,
                    cached: true,
                    used_fallback: false,
                    error: None,
                }
            }
            Lookup::Miss(fresh) => {
                let (used_fallback, error) = meta;
                ServiceResponse {
                    data: fresh.data,
                    usage: fresh.usage,
                    cached: false,
                    used_fallback,
                    error,
                }
            }
        })
    }

    /// Pipeline for services without a fallback: the breaker still gates the
    /// call, but an open breaker or an AI failure is returned as an error.
    pub(crate) async fn run_without_fallback<T, P>(
        &self,
        call: ServiceCall,
        parse: P,
    ) -> Result<ServiceResponse<T>>
    where
        P: Fn(&str) -> Result<T>,
    {
        let breaker = self.breaker(call.service);
        if !breaker.allow() {
            return Err(Error::runtime_with_context(
                format!("circuit breaker for {} is open", call.service),
                ErrorContext::new()
                    .with_details(format!("operation {}", call.operation))
                    .with_source("circuit_breaker"),
            ));
        }
        match self.attempt(&call, &parse).await {
            Ok((data, usage)) => {
                breaker.record_success();
                Ok(ServiceResponse {
                    data,
                    usage,
                    cached: false,
                    used_fallback: false,
                    error: None,
                })
            }
            Err(e) => {
                breaker.record_failure();
                Err(e)
            }
        }
    }

    /// Retried LLM call plus parse, with ledger accounting for both outcomes.
    async fn attempt<T, P>(&self, call: &ServiceCall, parse: &P) -> Result<(T, TokenUsage)>
    where
        P: Fn(&str) -> Result<T>,
    {
        let this = self;
        let result = with_retry(
            move || async move {
                let completion = this.llm.complete(&call.request).await?;
                let data = parse(&completion.content)?;
                let usage = completion
                    .usage
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| {
                        TokenUsage::new(
                            this.estimator.count(&call.request.prompt_text()),
                            this.estimator.count(&completion.content),
                        )
                    });
                Ok((data, usage))
            },
            &call.retry,
        )
        .await;

        let opts = |base: TrackOptions| match &call.user_id {
            Some(user) => base.with_user(user.clone()),
            None => base,
        };
        match result {
            Ok((data, usage)) => {
                if usage.total_tokens > 0 {
                    self.tracker
                        .track(call.service, call.operation, usage, opts(TrackOptions::default()));
                }
                Ok((data, usage))
            }
            Err(e) => {
                self.tracker.track(
                    call.service,
                    call.operation,
                    TokenUsage::zero(),
                    opts(TrackOptions::failed()),
                );
                Err(e)
            }
        }
    }
}
