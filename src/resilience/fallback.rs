//! Graceful degradation to rule-based results.

use super::classify::{classify, should_fallback};
use crate::error_code::AiError;
use crate::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

type Predicate = Arc<dyn Fn(&AiError) -> bool + Send + Sync>;
type Observer = Arc<dyn Fn(&AiError) + Send + Sync>;

/// Result plus which path produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackOutcome<T> {
    pub data: T,
    pub used_fallback: bool,
    /// Classified failure that triggered the fallback. `None` on the primary
    /// path and when an open circuit skipped the primary entirely.
    pub error: Option<AiError>,
}

impl<T> FallbackOutcome<T> {
    pub fn primary(data: T) -> Self {
        Self {
            data,
            used_fallback: false,
            error: None,
        }
    }

    pub fn substituted(data: T, error: Option<AiError>) -> Self {
        Self {
            data,
            used_fallback: true,
            error,
        }
    }
}

/// Overrides for the fallback decision.
#[derive(Clone, Default)]
pub struct FallbackOptions {
    should_fallback: Option<Predicate>,
    on_fallback: Option<Observer>,
}

impl FallbackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the default kind-based eligibility check.
    pub fn with_should_fallback(
        mut self,
        predicate: impl Fn(&AiError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_fallback = Some(Arc::new(predicate));
        self
    }

    /// Called with the classified error right before the fallback runs.
    pub fn with_on_fallback(mut self, observer: impl Fn(&AiError) + Send + Sync + 'static) -> Self {
        self.on_fallback = Some(Arc::new(observer));
        self
    }

    fn eligible(&self, err: &AiError) -> bool {
        match &self.should_fallback {
            Some(p) => p(err),
            None => should_fallback(err),
        }
    }
}

impl std::fmt::Debug for FallbackOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackOptions")
            .field("should_fallback", &self.should_fallback.is_some())
            .field("on_fallback", &self.on_fallback.is_some())
            .finish()
    }
}

pub async fn with_fallback<T, A, F, Fut>(ai: A, fallback: F) -> Result<FallbackOutcome<T>>
where
    A: Future<Output = Result<T>>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_fallback_opts(ai, fallback, &FallbackOptions::default()).await
}

/// Runs `ai`; on failure classifies the error and, when eligible, serves
/// `fallback` instead. Ineligible errors are returned unchanged and
/// `fallback` is never called.
pub async fn with_fallback_opts<T, A, F, Fut>(
    ai: A,
    fallback: F,
    opts: &FallbackOptions,
) -> Result<FallbackOutcome<T>>
where
    A: Future<Output = Result<T>>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match ai.await {
        Ok(data) => Ok(FallbackOutcome::primary(data)),
        Err(e) => recover(e, fallback, opts).await,
    }
}

pub(crate) async fn recover<T, F, Fut>(
    err: crate::Error,
    fallback: F,
    opts: &FallbackOptions,
) -> Result<FallbackOutcome<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let classified = classify(&err);
    if !opts.eligible(&classified) {
        return Err(err);
    }
    info!(kind = %classified.kind, error = %err, "serving fallback result");
    if let Some(observer) = &opts.on_fallback {
        observer(&classified);
    }
    let data = fallback().await?;
    Ok(FallbackOutcome::substituted(data, Some(classified)))
}
