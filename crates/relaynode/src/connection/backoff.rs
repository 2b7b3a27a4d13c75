//! Reconnect configuration and bounded exponential backoff.

use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Consecutive failures tolerated before the session fails.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            max_attempts: 20,
        }
    }
}

impl ReconnectConfig {
    /// Delay to wait after the given consecutive failure (1-based).
    ///
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Check if another attempt is allowed after `attempt` failures.
    #[must_use]
    pub const fn should_reconnect(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStep {
    /// Wait this long, then try again.
    Retry {
        /// Consecutive failures so far.
        attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Budget exhausted.
    Exhausted {
        /// Consecutive failures so far.
        attempts: u32,
    },
}

/// Consecutive-failure counter driving reconnect delays.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    /// Create a fresh counter.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Record one more failure and decide what happens next.
    pub fn fail(&mut self) -> BackoffStep {
        self.attempt = self.attempt.saturating_add(1);
        if self.config.should_reconnect(self.attempt) {
            BackoffStep::Retry {
                attempt: self.attempt,
                delay: self.config.delay_for_attempt(self.attempt),
            }
        } else {
            BackoffStep::Exhausted {
                attempts: self.attempt,
            }
        }
    }

    /// Forget previous failures after an authenticated connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures since the last success.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
