use super::fallback::{recover, FallbackOptions, FallbackOutcome};
use crate::clock::{to_chrono, Clock};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    /// Cooldown elapsed; the next outcome decides between closed and open.
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: BreakerState,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub is_open: bool,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "cooldown_secs")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug)]
struct State {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
}

/// Per-service circuit breaker.
///
/// - Counts consecutive failures; success resets the count
/// - Opens at the threshold and routes every call to the fallback
/// - After the cooldown one probe is let through; a failed probe reopens
pub struct CircuitBreaker {
    name: String,
    cfg: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: "default".to_string(),
            cfg,
            clock,
            state: Mutex::new(State {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
            }),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cooldown_elapsed(&self, st: &State, now: DateTime<Utc>) -> bool {
        match st.last_failure_at {
            Some(at) => now - at >= to_chrono(self.cfg.cooldown),
            None => true,
        }
    }

    /// Whether the primary path may run now. Moves an open breaker whose
    /// cooldown has elapsed to half-open.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut st = self.lock();
        match st.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if self.cooldown_elapsed(&st, now) {
                    info!(breaker = %self.name, "cooldown elapsed, probing upstream");
                    st.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut st = self.lock();
        if st.state != BreakerState::Closed {
            info!(breaker = %self.name, "circuit closed");
        }
        st.state = BreakerState::Closed;
        st.consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut st = self.lock();
        st.consecutive_failures = st.consecutive_failures.saturating_add(1);
        st.last_failure_at = Some(now);
        let trip = st.state == BreakerState::HalfOpen
            || st.consecutive_failures >= self.cfg.failure_threshold;
        if trip && st.state != BreakerState::Open {
            error!(
                breaker = %self.name,
                consecutive_failures = st.consecutive_failures,
                cooldown_ms = self.cfg.cooldown.as_millis() as u64,
                "circuit opened"
            );
            st.state = BreakerState::Open;
        }
    }

    /// Back to closed with no failure history.
    pub fn reset(&self) {
        let mut st = self.lock();
        st.state = BreakerState::Closed;
        st.consecutive_failures = 0;
        st.last_failure_at = None;
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = self.clock.now();
        let st = self.lock();
        let open_remaining_ms = match (st.state, st.last_failure_at) {
            (BreakerState::Open, Some(at)) => {
                let remaining = at + to_chrono(self.cfg.cooldown) - now;
                remaining.to_std().ok().map(|d| d.as_millis() as u64)
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: st.state,
            failure_threshold: self.cfg.failure_threshold,
            cooldown_ms: self.cfg.cooldown.as_millis() as u64,
            consecutive_failures: st.consecutive_failures,
            last_failure_at: st.last_failure_at,
            is_open: st.state == BreakerState::Open,
            open_remaining_ms,
        }
    }

    /// Runs `ai` behind the breaker.
    ///
    /// While open, `fallback` is served without touching `ai` and the outcome
    /// carries no error. Otherwise the outcome of `ai` is recorded and a
    /// failure goes through the regular fallback policy.
    pub async fn execute<T, A, F, Fut>(
        &self,
        ai: A,
        fallback: F,
        opts: &FallbackOptions,
    ) -> Result<FallbackOutcome<T>>
    where
        A: Future<Output = Result<T>>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.allow() {
            info!(breaker = %self.name, "circuit open, skipping primary");
            let data = fallback().await?;
            return Ok(FallbackOutcome::substituted(data, None));
        }
        match ai.await {
            Ok(data) => {
                self.record_success();
                Ok(FallbackOutcome::primary(data))
            }
            Err(e) => {
                self.record_failure();
                recover(e, fallback, opts).await
            }
        }
    }
}

mod cooldown_secs {
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
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, cooldown: Duration) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::starting_now();
        let cfg = CircuitBreakerConfig::new()
            .with_failure_threshold(threshold)
            .with_cooldown(cooldown);
        (CircuitBreaker::new(cfg, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_success_resets_failures() {
        let (cb, _) = breaker(5, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.snapshot().consecutive_failures, 2);
        cb.record_success();
        assert_eq!(cb.snapshot().consecutive_failures, 0);
        assert_eq!(cb.snapshot().state, BreakerState::Closed);
    }

    #[test]
    fn test_opens_at_threshold() {
        let (cb, _) = breaker(3, Duration::from_secs(10));
        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow());
        cb.record_failure();
        assert!(!cb.allow());
        let snap = cb.snapshot();
        assert!(snap.is_open);
        assert_eq!(snap.open_remaining_ms, Some(10_000));
    }

    #[test]
    fn test_failed_probe_reopens_immediately() {
        let (cb, clock) = breaker(3, Duration::from_secs(10));
        for _ in 0..3 {
            cb.record_failure();
        }
        clock.advance(Duration::from_secs(11));
        assert!(cb.allow());
        assert_eq!(cb.snapshot().state, BreakerState::HalfOpen);
        cb.record_failure();
        assert!(!cb.allow());
    }

    #[tokio::test]
    async fn test_open_circuit_bypasses_primary_then_recovers() {
        let (cb, clock) = breaker(5, Duration::from_secs(60));
        let ai_calls = AtomicU32::new(0);
        let opts = FallbackOptions::default();

        for _ in 0..5 {
            let out = cb
                .execute(
                    async {
                        ai_calls.fetch_add(1, Ordering::SeqCst);
                        Err::<&str, _>(Error::message("network error"))
                    },
                    || async { Ok("rule-based") },
                    &opts,
                )
                .await
                .unwrap();
            assert!(out.used_fallback);
            assert!(out.error.is_some());
        }
        assert_eq!(ai_calls.load(Ordering::SeqCst), 5);

        let out = cb
            .execute(
                async {
                    ai_calls.fetch_add(1, Ordering::SeqCst);
                    Ok("ai")
                },
                || async { Ok("rule-based") },
                &opts,
            )
            .await
            .unwrap();
        assert_eq!(ai_calls.load(Ordering::SeqCst), 5, "sixth call skips the AI path");
        assert_eq!(out.data, "rule-based");
        assert!(out.error.is_none());

        clock.advance(Duration::from_secs(61));
        let out = cb
            .execute(
                async {
                    ai_calls.fetch_add(1, Ordering::SeqCst);
                    Ok("ai")
                },
                || async { Ok("rule-based") },
                &opts,
            )
            .await
            .unwrap();
        assert_eq!(ai_calls.load(Ordering::SeqCst), 6);
        assert_eq!(out, FallbackOutcome::primary("ai"));
        assert_eq!(cb.snapshot().state, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_ineligible_failure_still_counts() {
        let (cb, _) = breaker(5, Duration::from_secs(60));
        let res = cb
            .execute(
                async { Err::<u8, _>(Error::remote(401, "invalid api key")) },
                || async { Ok(0) },
                &FallbackOptions::default(),
            )
            .await;
        assert!(res.is_err());
        assert_eq!(cb.snapshot().consecutive_failures, 1);
    }

    #[test]
    fn test_reset() {
        let (cb, _) = breaker(1, Duration::from_secs(60));
        cb.record_failure();
        assert!(cb.snapshot().is_open);
        cb.reset();
        let snap = cb.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert!(snap.last_failure_at.is_none());
    }

    #[test]
    fn test_thread_safe_counting() {
        let (cb, _) = breaker(1000, Duration::from_secs(60));
        let cb = Arc::new(cb);
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cb = Arc::clone(&cb);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        cb.record_failure();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.snapshot().consecutive_failures, 50);
    }
}
