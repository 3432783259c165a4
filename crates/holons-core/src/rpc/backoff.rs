//! Reconnect backoff with exponential growth and additive jitter.
//!
//! The delay before reconnect attempt `n` (0-indexed) is
//! `min(min_delay * factor^n, max_delay)` plus up to `jitter` of that value.

use rand::Rng;
use std::time::Duration;

/// Backoff policy for the reconnect loop.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub min_delay: Duration,
    /// Cap on the un-jittered delay.
    pub max_delay: Duration,
    /// Exponential base (typically 2.0 for doubling).
    pub factor: f64,
    /// Fraction of the base delay added as random jitter, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(30_000),
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Un-jittered delay for the given attempt.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let multiplier = self.factor.powi(exponent);
        let delay_secs = self.min_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        // NaN or infinite only on a degenerate factor; fall back to the cap.
        if capped_secs.is_finite() {
            Duration::from_secs_f64(capped_secs.max(0.0))
        } else {
            self.max_delay
        }
    }

    /// Delay to sleep before the given attempt, jitter included.
    ///
    /// Always within `[base, base * (1 + jitter)]` and never below 1ms.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let sample: f64 = rand::rng().random();
        let jitter = base.mul_f64(self.jitter * sample);
        (base + jitter).max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> ReconnectPolicy {
        ReconnectPolicy::new()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(400))
            .with_jitter(0.0)
    }

    #[test]
    fn test_base_delay_doubles() {
        let policy = no_jitter();
        assert_eq!(policy.base_delay(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_base_delay_capped_at_max() {
        let policy = no_jitter();
        assert_eq!(policy.base_delay(3), Duration::from_millis(400));
        assert_eq!(policy.base_delay(60), Duration::from_millis(400));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_millis(400));
    }

    #[test]
    fn test_base_delay_is_monotonic() {
        let policy = ReconnectPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let current = policy.base_delay(attempt);
            assert!(current >= previous, "attempt {} went down", attempt);
            assert!(current <= policy.max_delay);
            previous = current;
        }
    }

    #[test]
    fn test_delay_within_jitter_bounds() {
        let policy = ReconnectPolicy::default().with_jitter(0.25);
        for attempt in 0..12 {
            let base = policy.base_delay(attempt);
            // Duration float conversions round to whole nanoseconds.
            let upper = base.mul_f64(1.25) + Duration::from_micros(1);
            for _ in 0..20 {
                let delay = policy.delay(attempt);
                assert!(
                    delay >= base && delay <= upper,
                    "Delay {:?} should be between {:?} and {:?}",
                    delay,
                    base,
                    upper
                );
            }
        }
    }

    #[test]
    fn test_delay_never_zero() {
        let policy = ReconnectPolicy::new()
            .with_min_delay(Duration::ZERO)
            .with_jitter(0.0);
        assert_eq!(policy.delay(0), Duration::from_millis(1));
    }
}
