//! Retry policy: backoff computation and scheduling decisions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::types::FailureKind;

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after the given delay.
    RetryAfter(Duration),
    /// Retry budget exhausted; the unit converts to a permanent failure.
    Exhausted,
    /// The failure kind is never retried automatically.
    NotRetryable,
}

/// Backoff and attempt-budget policy shared by all phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum automatic attempts before a transient failure converts
    /// to permanent.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for the first retry, in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Ceiling on the computed delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Jitter fraction (0.0-1.0) applied to the computed delay so that
    /// units failing from a shared cause do not retry in lockstep.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    2_000
}

fn default_max_delay() -> u64 {
    15 * 60 * 1_000
}

fn default_jitter() -> f64 {
    0.25
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Decides what to do with a unit that just failed.
    ///
    /// `attempts` is the number of attempts made so far, including the
    /// one that just failed.
    pub fn decide(&self, kind: FailureKind, attempts: u32) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::NotRetryable;
        }
        if attempts >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.backoff(attempts))
    }

    /// Computes the jittered exponential delay for the given attempt count.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        let raw = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);

        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            1.0
        };
        let delayed = (raw as f64 * factor).max(0.0) as u64;
        Duration::from_millis(delayed.min(self.max_delay_ms))
    }

    /// Absolute wall-clock time of the next eligible attempt.
    pub fn next_retry_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = self.backoff(attempts);
        now + chrono::Duration::milliseconds(delay.as_millis() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_without_jitter() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_transient_within_budget_retries() {
        let policy = policy_without_jitter();
        let decision = policy.decide(FailureKind::Transient, 1);
        assert_eq!(
            decision,
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_transient_exhausted() {
        let policy = policy_without_jitter();
        assert_eq!(policy.decide(FailureKind::Transient, 3), RetryDecision::Exhausted);
        assert_eq!(policy.decide(FailureKind::Transient, 7), RetryDecision::Exhausted);
    }

    #[test]
    fn test_non_retryable_kinds() {
        let policy = policy_without_jitter();
        assert_eq!(
            policy.decide(FailureKind::Permanent, 1),
            RetryDecision::NotRetryable
        );
        assert_eq!(
            policy.decide(FailureKind::CorruptInput, 1),
            RetryDecision::NotRetryable
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy_without_jitter();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        // 100 * 2^6 = 6400 caps at 1000
        assert_eq!(policy.backoff(7), Duration::from_millis(1_000));
    }

    #[test]
    fn test_backoff_jitter_stays_in_band() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: 0.5,
        };
        for _ in 0..50 {
            let delay = policy.backoff(1).as_millis() as u64;
            assert!((500..=1_500).contains(&delay), "delay {} out of band", delay);
        }
    }

    #[test]
    fn test_next_retry_at_is_in_the_future() {
        let policy = policy_without_jitter();
        let now = Utc::now();
        let at = policy.next_retry_at(1, now);
        assert!(at > now);
    }

    #[test]
    fn test_default_policy_deserialize() {
        let policy: RetryPolicy = toml::from_str("").unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_ms, 2_000);
    }
}
