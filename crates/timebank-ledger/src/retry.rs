//! Bounded retry with jittered exponential backoff for CAS loops.
//!
//! Constants: 5 attempts, 10ms base delay doubled per attempt, capped at
//! 100ms, with a uniform jitter multiplier in [0.5, 1.5) so colliding
//! writers spread out instead of re-colliding in lockstep.

use std::time::Duration;

use rand::Rng;

/// Retry discipline shared by every CAS loop in the ledger.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before giving up with `concurrency-conflict`.
    pub attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on the un-jittered delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// The jittered delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(10));
        let capped = exp.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        capped.mul_f64(jitter)
    }

    /// Sleep out the backoff for a failed attempt.
    pub fn pause(&self, attempt: u32) {
        std::thread::sleep(self.backoff(attempt));
    }
}
