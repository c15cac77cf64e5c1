use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;

/// Exponential reconnect schedule capped by attempt count, not by delay.
///
/// Retry `n` (0-indexed) waits `base * 2^n`. Randomization is disabled so the
/// schedule is exact and reproducible.
pub struct ReconnectPolicy {
    base: Duration,
    max_attempts: u32,
    backoff: ExponentialBackoff,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        let mut backoff = ExponentialBackoff {
            current_interval: base,
            initial_interval: base,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: Self::delay_for(base, max_attempts),
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();

        Self {
            base,
            max_attempts,
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay for the next retry, advancing the schedule.
    ///
    /// Returns `None` once the schedule cannot produce another delay.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.backoff.next_backoff()
    }

    /// Restart the schedule at `base`.
    pub fn reset(&mut self) {
        self.backoff.reset();
    }

    /// Closed form of the schedule: `base * 2^attempt`, saturating.
    pub fn delay_for(base: Duration, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        base.saturating_mul(factor)
    }
}

impl Debug for ReconnectPolicy {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter
            .debug_struct("ReconnectPolicy")
            .field("base", &self.base)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
