//! Retry with per-attempt timeout and linear/exponential backoff.

use super::classify::classify;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `base × attempt`
    Linear,
    /// `base × 2^(attempt-1)`
    Exponential,
}

/// Configuration for retry logic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: Backoff,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    #[serde(with = "duration_ms", default = "default_base_delay")]
    pub base_delay: Duration,
}

fn default_base_delay() -> Duration {
    Duration::from_millis(1000)
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryPresets::standard()
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, backoff: Backoff, timeout: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            timeout,
            base_delay: default_base_delay(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sleep before attempt `attempt + 1`, after attempt `attempt` (1-based) failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        }
    }

    /// Sum of the sleeps taken when every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts.max(1))
            .map(|a| self.delay_for(a))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Predefined retry configurations.
pub struct RetryPresets;

impl RetryPresets {
    /// 2 attempts, linear, 5s per attempt.
    pub fn fast() -> RetryConfig {
        RetryConfig::new(2, Backoff::Linear, Duration::from_secs(5))
    }

    /// 3 attempts, exponential, 30s per attempt.
    pub fn standard() -> RetryConfig {
        RetryConfig::new(3, Backoff::Exponential, Duration::from_secs(30))
    }

    /// 5 attempts, exponential, 60s per attempt.
    pub fn aggressive() -> RetryConfig {
        RetryConfig::new(5, Backoff::Exponential, Duration::from_secs(60))
    }

    /// Single 6s attempt; trend analysis runs under a tight end-to-end deadline.
    pub fn trend() -> RetryConfig {
        RetryConfig::new(1, Backoff::Linear, Duration::from_secs(6))
    }
}

/// Result of [`with_retry_detailed`].
#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: Result<T>,
    pub attempts: u32,
    pub elapsed: Duration,
}

pub async fn with_retry<T, F, Fut>(op: F, config: &RetryConfig) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_observed(op, config, |_, _| {}).await
}

/// Runs `op` up to `max_attempts` times.
///
/// Each attempt is raced against `config.timeout`; a timed-out attempt is
/// dropped and fails with [`Error::Timeout`]. Only errors whose classified
/// kind is retryable lead to another attempt. `on_failure` sees every failed
/// attempt, including the last one.
pub async fn with_retry_observed<T, F, Fut, O>(
    mut op: F,
    config: &RetryConfig,
    mut on_failure: O,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    O: FnMut(u32, &Error),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match tokio::time::timeout(config.timeout, op()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(_) => Error::Timeout {
                after_ms: config.timeout.as_millis() as u64,
            },
        };

        on_failure(attempt, &err);

        if attempt >= max_attempts {
            return Err(err);
        }
        let classified = classify(&err);
        if !classified.retryable {
            debug!(attempt, kind = %classified.kind, "error is not retryable");
            return Err(err);
        }

        let delay = config.delay_for(attempt);
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Like [`with_retry`] but reports attempts used and wall time.
pub async fn with_retry_detailed<T, F, Fut>(op: F, config: &RetryConfig) -> RetryReport<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut failed = 0u32;
    let result = with_retry_observed(op, config, |attempt, _| failed = attempt).await;
    let attempts = match &result {
        Ok(_) => failed + 1,
        Err(_) => failed,
    };
    RetryReport {
        result,
        attempts,
        elapsed: started.elapsed(),
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_presets() {
        let fast = RetryPresets::fast();
        assert_eq!((fast.max_attempts, fast.backoff), (2, Backoff::Linear));
        assert_eq!(fast.timeout, Duration::from_secs(5));
        let std = RetryPresets::standard();
        assert_eq!((std.max_attempts, std.backoff), (3, Backoff::Exponential));
        assert_eq!(RetryPresets::aggressive().max_attempts, 5);
        assert_eq!(RetryPresets::trend().timeout, Duration::from_secs(6));
        assert_eq!(std.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_delays() {
        let exp = RetryPresets::aggressive();
        let delays: Vec<u128> = (1..=4).map(|a| exp.delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000]);

        let lin = RetryPresets::fast().with_max_attempts(4);
        let delays: Vec<u128> = (1..=3).map(|a| lin.delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 3000]);
        assert_eq!(lin.total_backoff(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error_after_backoff() {
        let calls = AtomicU32::new(0);
        let config = RetryPresets::standard();
        let started = tokio::time::Instant::now();
        let res: Result<()> = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(Error::message(format!("network down #{n}")))
            },
            &config,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = res.unwrap_err();
        assert!(err.to_string().contains("network down #3"));
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let res: Result<()> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::remote(401, "invalid api key"))
            },
            &RetryPresets::aggressive(),
        )
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_drops_attempt_and_retries() {
        let calls = AtomicU32::new(0);
        let config = RetryPresets::fast();
        let res = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok(n)
            },
            &config,
        )
        .await;
        assert_eq!(res.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_every_failure() {
        let mut seen = Vec::new();
        let res: Result<()> = with_retry_observed(
            || async { Err(Error::message("rate limit exceeded")) },
            &RetryPresets::fast(),
            |attempt, e| seen.push((attempt, e.to_string())),
        )
        .await;
        assert!(res.is_err());
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].0, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detailed_report() {
        let calls = AtomicU32::new(0);
        let report = with_retry_detailed(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::message("timed out"))
                } else {
                    Ok("ok")
                }
            },
            &RetryPresets::standard(),
        )
        .await;
        assert_eq!(report.attempts, 2);
        assert!(report.result.is_ok());
    }
}
