//! Exponential backoff policy for reconnect attempts.

use std::time::Duration;

use rand::Rng;

use courant_shared::constants::{
    RECONNECT_INITIAL_DELAY_MS, RECONNECT_MAX_DELAY_MS, RECONNECT_MULTIPLIER,
};

/// Pacing of repeated connection attempts while `Connecting`.
///
/// The delay before attempt `n` (1-based) is
/// `initial * multiplier^(n-1)`, capped at `max`, with an optional
/// symmetric jitter fraction applied last.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the second attempt (the first runs immediately).
    pub initial: Duration,
    /// Growth factor between consecutive attempts.
    pub multiplier: f64,
    /// Upper bound on the computed delay.
    pub max: Duration,
    /// Jitter fraction in `[0.0, 1.0)`; `0.1` spreads delays by ±10 %.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(RECONNECT_INITIAL_DELAY_MS),
            multiplier: RECONNECT_MULTIPLIER,
            max: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            jitter: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait after `failed_attempts` consecutive failures.
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }

        let exponent = failed_attempts.saturating_sub(1).min(31);
        let raw = self.initial.as_millis() as f64 * self.multiplier.powi(exponent as i32);
        let capped = raw.min(self.max.as_millis() as f64);

        let jittered = if self.jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            capped * (1.0 + spread)
        } else {
            capped
        };

        Duration::from_millis(jittered.max(0.0) as u64)
    }
}
