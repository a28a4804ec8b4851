//! Exponential backoff with jitter for reconnect loops.

use std::time::Duration;

/// Backoff schedule: `base * 2^attempt`, capped at `max`, with ±`jitter`
/// applied as a fraction of the capped delay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound before jitter.
    pub max: Duration,
    /// Jitter fraction in `[0.0, 1.0]`.
    pub jitter: f64,
}

impl Backoff {
    /// Build from millisecond settings.
    pub fn from_millis(base_ms: u64, max_ms: u64, jitter: f64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms.max(base_ms)),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay before the 0-based retry `attempt`, without jitter.
    pub fn nominal(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let base_ms = self.base.as_millis() as u64;
        let ms = base_ms.saturating_mul(factor);
        Duration::from_millis(ms).min(self.max)
    }

    /// Delay before retry `attempt` with random jitter applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal(attempt);
        if self.jitter <= 0.0 {
            return nominal;
        }
        let spread = nominal.as_millis() as f64 * self.jitter;
        let offset = (rand::random::<f64>() * 2.0 - 1.0) * spread;
        let ms = (nominal.as_millis() as f64 + offset).max(0.0);
        Duration::from_millis(ms as u64)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_millis(500, 30_000, 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn nominal_doubles_until_cap() {
        let b = Backoff::from_millis(100, 1_000, 0.0);
        assert_eq!(b.nominal(0), Duration::from_millis(100));
        assert_eq!(b.nominal(1), Duration::from_millis(200));
        assert_eq!(b.nominal(3), Duration::from_millis(800));
        assert_eq!(b.nominal(4), Duration::from_millis(1_000));
        assert_eq!(b.nominal(60), Duration::from_millis(1_000));
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let b = Backoff::from_millis(100, 1_000, 0.0);
        assert_eq!(b.delay(2), b.nominal(2));
    }

    #[test]
    fn jitter_is_clamped() {
        let b = Backoff::from_millis(100, 50, 3.0);
        assert_eq!(b.jitter, 1.0);
        assert_eq!(b.max, Duration::from_millis(100));
    }

    proptest! {
        #[test]
        fn delay_stays_within_jitter_band(attempt in 0u32..40, jitter in 0.0f64..1.0) {
            let b = Backoff::from_millis(250, 10_000, jitter);
            let nominal = b.nominal(attempt).as_millis() as f64;
            let got = b.delay(attempt).as_millis() as f64;
            prop_assert!(got <= nominal * (1.0 + jitter) + 1.0);
            prop_assert!(got >= nominal * (1.0 - jitter) - 1.0);
        }
    }
}
