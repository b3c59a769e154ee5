//! # Backoff policy for resuming crashed supervisor loops.
//!
//! [`BackoffPolicy`] controls how resume delays grow after repeated supervisor
//! failures. The delay for attempt `n` grows from `first` by `factor` per
//! attempt in whole milliseconds, saturating at `max`, then jitter is applied.
//! The base delay is derived purely from the attempt number, so jitter output
//! never feeds back into later calculations. Factors at or below `1.0` keep
//! the delay constant at `first`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use thunkvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//! // 100ms × 2^10 = 102_400ms → capped at max=10s
//! assert_eq!(backoff.next(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
///
/// - [`BackoffPolicy::first`] — the initial delay;
/// - [`BackoffPolicy::factor`] — multiplicative growth factor (`>= 1.0` recommended);
/// - [`BackoffPolicy::max`] — the maximum delay cap;
/// - [`BackoffPolicy::jitter`] — randomization strategy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Initial delay before the first resume.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
    /// Jitter policy to prevent synchronized resumes.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 100ms delay, capped at 30s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for the given attempt number (0-indexed).
    ///
    /// The base grows from `first` by `factor` per attempt, saturating at
    /// `max`; jitter applies to the saturated base and never feeds back into
    /// later attempts.
    pub fn next(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }

    /// Millisecond-granularity growth with an early exit at the cap, so huge
    /// attempt numbers can neither overflow nor spin.
    fn base_delay(&self, attempt: u32) -> Duration {
        if self.factor <= 1.0 {
            return self.first.min(self.max);
        }
        let cap_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let mut delay_ms = u64::try_from(self.first.as_millis()).unwrap_or(u64::MAX);
        for _ in 0..attempt {
            if delay_ms >= cap_ms {
                return self.max;
            }
            // max(1) lets a sub-millisecond `first` still grow; ceil keeps
            // factors between 1 and 2 from stalling.
            let grown = (delay_ms.max(1) as f64 * self.factor).ceil();
            if !grown.is_finite() || grown >= cap_ms as f64 {
                return self.max;
            }
            delay_ms = grown as u64;
        }
        Duration::from_millis(delay_ms.min(cap_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(factor: f64, max: Duration) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(100),
            max,
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_attempt_zero_returns_first() {
        assert_eq!(
            policy(2.0, Duration::from_secs(30)).next(0),
            Duration::from_millis(100),
        );
    }

    #[test]
    fn test_exponential_growth() {
        let p = policy(2.0, Duration::from_secs(30));
        assert_eq!(p.next(1), Duration::from_millis(200));
        assert_eq!(p.next(2), Duration::from_millis(400));
        assert_eq!(p.next(3), Duration::from_millis(800));
    }

    #[test]
    fn test_constant_factor() {
        let p = policy(1.0, Duration::from_secs(30));
        for attempt in 0..8 {
            assert_eq!(p.next(attempt), Duration::from_millis(100));
        }
    }

    #[test]
    fn test_clamped_to_max() {
        assert_eq!(
            policy(2.0, Duration::from_secs(1)).next(10),
            Duration::from_secs(1),
        );
    }

    #[test]
    fn test_first_exceeding_max_is_clamped() {
        let p = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(p.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_attempt_saturates_at_max() {
        let p = policy(2.0, Duration::from_secs(30));
        assert_eq!(p.next(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_sub_millisecond_first_still_grows() {
        let p = BackoffPolicy {
            first: Duration::from_micros(100),
            max: Duration::from_secs(1),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        assert!(p.next(3) > Duration::ZERO);
        assert_eq!(p.next(40), Duration::from_secs(1));
    }

    #[test]
    fn test_shrinking_factor_stays_constant() {
        let p = policy(0.5, Duration::from_secs(30));
        for attempt in 0..8 {
            assert_eq!(p.next(attempt), Duration::from_millis(100));
        }
    }

    #[test]
    fn test_full_jitter_bounded_by_base() {
        let p = BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::Full,
        };
        for attempt in 0..12 {
            let base_ms = (100.0 * 2.0f64.powi(attempt)).min(30_000.0);
            assert!(p.next(attempt as u32) <= Duration::from_millis(base_ms as u64));
        }
    }
}
