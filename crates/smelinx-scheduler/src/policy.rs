//! Retry/backoff policy: pure arithmetic over the attempt count.

use std::time::Duration;

use chrono::{DateTime, Utc};
use smelinx_core::config::NotifyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    pub max_delay: Duration,
    /// Failure count at which the notice is canceled instead of retried.
    pub max_attempts: u32,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt { at: DateTime<Utc>, delay: Duration },
    Exhausted,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            max_attempts: 6,
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self {
            base: config.backoff_base(),
            max_delay: config.backoff_max(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// `min(base * 2^(attempts-1), max_delay)`. Attempt 0 is treated as 1.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1);
        2u32.checked_pow(exp)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Decide the outcome of failure number `attempts` (already incremented),
    /// observed at `failed_at`.
    pub fn decide(&self, attempts: u32, failed_at: DateTime<Utc>) -> RetryDecision {
        if attempts >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        let delay = self.delay_for(attempts);
        let at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| failed_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        RetryDecision::RetryAt { at, delay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            max_attempts,
        }
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let p = policy(100);
        let secs: Vec<u64> = (1..=8).map(|n| p.delay_for(n).as_secs()).collect();
        assert_eq!(secs, vec![60, 120, 240, 480, 960, 1920, 3600, 3600]);
        assert_eq!(p.delay_for(0), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_is_monotonic_and_never_overflows() {
        let p = policy(u32::MAX);
        let mut prev = Duration::ZERO;
        for n in 1..200 {
            let d = p.delay_for(n);
            assert!(d >= prev);
            assert!(d <= p.max_delay);
            prev = d;
        }
        assert_eq!(p.delay_for(u32::MAX), p.max_delay);
    }

    #[test]
    fn test_decide_exhaustion_boundary() {
        let p = policy(3);
        let t = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();

        assert_eq!(
            p.decide(1, t),
            RetryDecision::RetryAt {
                at: t + chrono::Duration::seconds(60),
                delay: Duration::from_secs(60)
            }
        );
        assert_eq!(
            p.decide(2, t),
            RetryDecision::RetryAt {
                at: t + chrono::Duration::seconds(120),
                delay: Duration::from_secs(120)
            }
        );
        assert_eq!(p.decide(3, t), RetryDecision::Exhausted);
        assert_eq!(p.decide(4, t), RetryDecision::Exhausted);
    }

    #[test]
    fn test_single_attempt_budget() {
        let t = Utc::now();
        assert_eq!(policy(1).decide(1, t), RetryDecision::Exhausted);
    }

    #[test]
    fn test_from_config() {
        let config = NotifyConfig {
            max_attempts: 0,
            backoff_base_secs: 5,
            backoff_max_secs: 50,
            ..Default::default()
        };
        let p = BackoffPolicy::from_config(&config);
        assert_eq!(p.base, Duration::from_secs(5));
        assert_eq!(p.max_delay, Duration::from_secs(50));
        assert_eq!(p.max_attempts, 1);
    }
}
