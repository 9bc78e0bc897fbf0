//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NotifyError;

/// Per-channel retry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero behaves like one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Fraction (0.0-1.0) of each delay that is randomised.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1 = first retry).
    ///
    /// `sample` is a uniform value in `[0, 1)` used for jitter; the delay is
    /// scaled into `[d * (1 - jitter), d]`.
    pub fn delay_for(&self, retry: u32, sample: f64) -> Duration {
        let exponent = retry.saturating_sub(1).min(64) as i32;
        let raw = self.base_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        let jitter = self.jitter.clamp(0.0, 1.0);
        let scaled = capped * (1.0 - jitter * sample.clamp(0.0, 1.0));
        Duration::from_millis(scaled.max(0.0) as u64)
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    ///
    /// Returns the final result and the number of attempts made.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> (Result<T, NotifyError>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, NotifyError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt, rand::random::<f64>());
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying delivery"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return (Err(err), attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_types::DeliveryMethod;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 300,
            jitter: 0.0,
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let p = policy();
        assert_eq!(p.delay_for(1, 0.5), Duration::from_millis(100));
        assert_eq!(p.delay_for(2, 0.5), Duration::from_millis(200));
        assert_eq!(p.delay_for(3, 0.5), Duration::from_millis(300));
        assert_eq!(p.delay_for(10, 0.5), Duration::from_millis(300));
    }

    #[test]
    fn jitter_only_shortens() {
        let p = RetryPolicy {
            jitter: 0.5,
            ..policy()
        };
        assert_eq!(p.delay_for(1, 0.0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1, 1.0), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let (result, attempts) = policy()
            .run(|_| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(NotifyError::transient(DeliveryMethod::Email, "busy"))
                    } else {
                        Ok("sent")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("sent"));
        assert_eq!(attempts, 3);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let (result, attempts) = policy()
            .run(|_| async {
                Err::<(), _>(NotifyError::permanent(DeliveryMethod::Sms, "bad number"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let (result, attempts) = policy()
            .run(|_| async { Err::<(), _>(NotifyError::transient(DeliveryMethod::Push, "down")) })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 4);
    }
}
