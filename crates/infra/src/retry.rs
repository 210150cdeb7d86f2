//! Bounded retry with backoff for store and channel calls.

use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// `base * 2^(n-1)` before retry `n`, capped at `max_delay`.
    #[default]
    Exponential,
}

/// How often, and how patiently, a store or channel call is repeated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first; `0` behaves like `1`.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Random spread applied to each delay, as a fraction of it (`0.0..=1.0`).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(100), Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self::immediate(1)
    }

    /// Retry without sleeping (tests, in-process stores).
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay before retrying after `failed` attempts, without jitter.
    pub fn base_delay_after(&self, failed: u32) -> Duration {
        if failed == 0 {
            return Duration::ZERO;
        }
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => self
                .base_delay
                .saturating_mul(1u32 << (failed - 1).min(16)),
        };
        delay.min(self.max_delay)
    }

    /// Delay before retrying after `failed` attempts, with jitter applied.
    pub fn delay_after<R: Rng + ?Sized>(&self, failed: u32, rng: &mut R) -> Duration {
        let base = self.base_delay_after(failed);
        let spread = self.jitter.clamp(0.0, 1.0);
        if base.is_zero() || spread == 0.0 {
            return base;
        }
        base.mul_f64(rng.gen_range(1.0 - spread..=1.0 + spread))
    }

    /// Whether another attempt is allowed after `failed` attempts.
    pub fn should_retry(&self, failed: u32) -> bool {
        failed < self.max_attempts
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy
/// runs out of attempts. Returns the last error.
pub fn with_retry<T, E, F, R>(
    policy: &RetryPolicy,
    operation: &'static str,
    retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: core::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if retryable(&e) && policy.should_retry(attempt) => {
                let delay = policy.delay_after(attempt, &mut rand::thread_rng());
                warn!(operation, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying");
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_delay_doubles_until_capped() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_millis(350));

        assert_eq!(policy.base_delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay_after(3), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_spread() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(1000), Duration::from_secs(10));
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let d = policy.delay_after(1, &mut rng);
            assert!(d >= Duration::from_millis(900) && d <= Duration::from_millis(1100), "{d:?}");
        }
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let policy = RetryPolicy::immediate(4);
        assert_eq!(policy.delay_after(3, &mut rand::thread_rng()), Duration::ZERO);
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn retries_until_success() {
        let mut calls = 0;
        let result: Result<u32, String> = with_retry(
            &RetryPolicy::immediate(3),
            "test",
            |_| true,
            || {
                calls += 1;
                if calls < 3 { Err("flaky".to_string()) } else { Ok(calls) }
            },
        );
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn stops_at_max_attempts() {
        let mut calls = 0;
        let result: Result<(), String> = with_retry(&RetryPolicy::immediate(2), "test", |_| true, || {
            calls += 1;
            Err(format!("attempt {calls}"))
        });
        assert_eq!(result, Err("attempt 2".to_string()));
    }

    #[test]
    fn non_retryable_errors_fail_fast() {
        let mut calls = 0;
        let result: Result<(), String> = with_retry(&RetryPolicy::immediate(5), "test", |_| false, || {
            calls += 1;
            Err("fatal".to_string())
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
