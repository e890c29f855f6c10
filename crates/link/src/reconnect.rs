//! Reconnect policy with capped exponential back-off.

use std::time::Duration;

/// Controls how the link reconnects after a connection drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBackoff {
    /// Delay before the first reconnect attempt.
    pub min_delay: Duration,
    /// Maximum delay between attempts (cap).
    pub max_delay: Duration,
    /// Number of consecutive reconnects scheduled before giving up.
    /// `0` means unlimited retries.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            max_attempts: 20,
        }
    }
}

impl ReconnectBackoff {
    /// Delay for the given attempt number (1-indexed):
    /// `min(min_delay * 2^(attempt-1), max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let min_ms = self.min_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        Duration::from_millis(min_ms.saturating_mul(factor).min(max_ms))
    }

    /// Whether `attempts` already scheduled reconnects exhaust the bound.
    pub fn should_give_up(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}

/// Attempt counter driven by the connection manager.
#[derive(Debug, Clone)]
pub struct BackoffState {
    policy: ReconnectBackoff,
    attempts: u32,
}

impl BackoffState {
    pub fn new(policy: ReconnectBackoff) -> Self {
        Self { policy, attempts: 0 }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &ReconnectBackoff {
        &self.policy
    }

    pub fn exhausted(&self) -> bool {
        self.policy.should_give_up(self.attempts)
    }

    /// Count one more scheduled reconnect and return its delay.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.policy.delay_for_attempt(self.attempts)
    }

    /// Called on every successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
