//! Reconnect backoff policy
//!
//! Exponential backoff with cap: base, 2*base, 4*base, ... capped at max.
//! Optional symmetric jitter spreads reconnects from many clients.

use rand::Rng;
use std::time::Duration;

/// Largest shift applied to the base delay (2^16 * base is already past any sane cap)
const MAX_SHIFT: u32 = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,

    /// Fraction of the delay added or removed at random (0.0 disables)
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Un-jittered delay before reconnect attempt `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_SHIFT);
        let delay = self.base.saturating_mul(1u32 << shift);
        std::cmp::min(delay, self.max)
    }

    /// Delay with jitter applied, never above the cap
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter == 0.0 {
            return delay;
        }

        let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        std::cmp::min(delay.mul_f64(factor), self.max)
    }
}
