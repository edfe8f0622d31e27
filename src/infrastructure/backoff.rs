use rand::Rng;
use std::time::Duration;

/// Exponential backoff with an optional ceiling and an attempt budget.
///
/// `delay_for_attempt(n) = min(base * 2^n, max_delay)`. Jitter, when enabled, is drawn
/// from `[0, base/2)` and clipped so the result never exceeds `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    /// `None` leaves the delay uncapped.
    pub max_delay: Option<Duration>,
    pub max_attempts: u32,
    pub jitter: bool,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_delay: Option<Duration>, max_attempts: u32) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt may be scheduled after `attempts` have already been made.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the attempt numbered `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 2^attempt saturates instead of overflowing for large attempt numbers.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let exp_delay = self.base.checked_mul(multiplier).unwrap_or(Duration::MAX);
        let capped = match self.max_delay {
            Some(max) => exp_delay.min(max),
            None => exp_delay,
        };

        if !self.jitter {
            return capped;
        }

        let jitter_range_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX) / 2;
        let remaining_ms = match self.max_delay {
            Some(max) => u64::try_from(max.saturating_sub(capped).as_millis()).unwrap_or(0),
            None => jitter_range_ms,
        };
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::rng().random_range(0..jitter_limit_ms);
        capped.saturating_add(Duration::from_millis(jitter_ms))
    }
}
