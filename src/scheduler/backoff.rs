//! Exponential backoff for loops whose downstream is unavailable.

use std::time::Duration;

use serde::Serialize;

/// Delay after `retries` consecutive failures: `base * factor^(retries - 1)`,
/// capped at `max`.
///
/// Zero retries means no backoff. Factors below 1 are treated as 1 so the
/// delay never shrinks as failures accumulate.
pub fn retry_backoff(retries: u32, base: Duration, max: Duration, factor: f64) -> Duration {
    if retries == 0 {
        return Duration::ZERO;
    }
    let factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
    let max_secs = max.as_secs_f64();

    let mut backoff = base.as_secs_f64();
    let mut remaining = retries;
    while backoff < max_secs && remaining > 1 {
        backoff *= factor;
        remaining -= 1;
    }
    Duration::try_from_secs_f64(backoff.min(max_secs)).unwrap_or(max)
}

/// Backoff settings for one loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BackoffPolicy {
    pub factor: f64,
    pub max: Duration,
}

impl BackoffPolicy {
    pub const DISABLED: Self = Self { factor: 0.0, max: Duration::ZERO };

    pub fn new(factor: f64, max: Duration) -> Self {
        Self { factor, max }
    }

    /// Backoff applies only when both the factor and the cap are positive.
    pub fn is_enabled(&self) -> bool {
        self.factor > 0.0 && !self.max.is_zero()
    }

    pub fn delay(&self, failures: u32, base: Duration) -> Duration {
        retry_backoff(failures, base, self.max, self.factor)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::DISABLED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(1);
    const MAX: Duration = Duration::from_secs(60);

    #[test]
    fn zero_retries_is_no_delay() {
        assert_eq!(retry_backoff(0, BASE, MAX, 2.0), Duration::ZERO);
    }

    #[test]
    fn grows_geometrically_until_capped() {
        assert_eq!(retry_backoff(1, BASE, MAX, 2.0), Duration::from_secs(1));
        assert_eq!(retry_backoff(2, BASE, MAX, 2.0), Duration::from_secs(2));
        assert_eq!(retry_backoff(4, BASE, MAX, 2.0), Duration::from_secs(8));
        assert_eq!(retry_backoff(7, BASE, MAX, 2.0), MAX);
        assert_eq!(retry_backoff(1000, BASE, MAX, 2.0), MAX);
    }

    #[test]
    fn non_decreasing_and_bounded_for_any_factor() {
        for factor in [0.1, 0.5, 1.0, 1.5, 3.0, f64::NAN, f64::INFINITY] {
            let mut last = Duration::ZERO;
            for n in 0..64 {
                let d = retry_backoff(n, BASE, MAX, factor);
                assert!(d >= last, "factor {factor}: {d:?} < {last:?} at {n}");
                assert!(d <= MAX, "factor {factor}: {d:?} exceeds cap at {n}");
                last = d;
            }
        }
    }

    #[test]
    fn base_above_cap_is_clamped() {
        let d = retry_backoff(1, Duration::from_secs(120), MAX, 2.0);
        assert_eq!(d, MAX);
    }

    #[test]
    fn policy_requires_factor_and_cap() {
        assert!(!BackoffPolicy::DISABLED.is_enabled());
        assert!(!BackoffPolicy::new(2.0, Duration::ZERO).is_enabled());
        assert!(!BackoffPolicy::new(0.0, MAX).is_enabled());
        assert!(BackoffPolicy::new(1.5, MAX).is_enabled());
    }
}
