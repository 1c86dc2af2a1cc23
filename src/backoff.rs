//! Reconnect delay
//!
//! Doubles from a base delay on each consecutive failed open, capped at a
//! maximum. A successful open resets the sequence.

use std::time::Duration;

/// Exponential backoff state
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    /// Number of failures recorded since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failure and return how long to wait before the next try
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        retry_delay(self.base, self.max, self.attempt)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Delay before retry number `attempt` (1-based)
///
/// `base * 2^(attempt - 1)`, saturating, capped at `max`. Attempt 0 waits
/// nothing.
pub fn retry_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let shift = attempt.saturating_sub(1).min(30);
    base.saturating_mul(1u32 << shift).min(max)
}
