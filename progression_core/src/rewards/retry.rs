//! Bounded retry policy for reward persistence.
//!
//! The schedule is a plain policy object and the waiting is behind a trait,
//! so the guard's retry behavior is testable without real time passing.

use std::time::Duration;

/// Bounded retry schedule with multiplicative backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total persist attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub base_delay: Duration,

    /// Factor applied to the delay after each failed attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// The delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Waits out retry delays. The only suspension point in the engine.
pub trait RetryScheduler {
    fn pause(&mut self, delay: Duration);
}

/// Production scheduler: blocks the cooperative turn for the delay.
#[derive(Debug, Default)]
pub struct ThreadScheduler;

impl RetryScheduler for ThreadScheduler {
    fn pause(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}
