//! Exponential backoff budget for backend reconnects

use std::time::Duration;

/// Reconnect attempts made since the last successful connection
///
/// `attempt` counts scheduled retries and never exceeds `ceiling`. Once it
/// reaches the ceiling, the next failure is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    attempt: u32,
    ceiling: u32,
    initial_delay: Duration,
}

impl RetryBudget {
    pub fn new(ceiling: u32, initial_delay: Duration) -> Self {
        Self {
            attempt: 0,
            ceiling,
            initial_delay,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.ceiling
    }

    /// Consume one retry and return the delay before it runs
    ///
    /// The delay is `initial_delay * 2^attempt` where `attempt` is the value
    /// before incrementing. Returns `None` when the ceiling has been reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(self.attempt));
        self.attempt += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
