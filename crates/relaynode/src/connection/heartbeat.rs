//! Heartbeat liveness tracking.

use std::time::Duration;

use tokio::time::Instant;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub interval: Duration,
    /// Extra time past `interval` before the link is considered dead.
    pub grace: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            grace: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    /// Longest silence tolerated on a connected socket.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.interval + self.grace
    }
}

/// Tracks the last time the relay showed signs of life.
///
/// Owned by a single session; dropped with it when the session leaves
/// `Connected`, so no deadline outlives its socket.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    last_seen: Instant,
}

impl HeartbeatMonitor {
    /// Start tracking from now.
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            last_seen: Instant::now(),
        }
    }

    /// Record inbound traffic.
    pub fn record_liveness(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Instant at which silence becomes a timeout.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.last_seen + self.config.window()
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    /// Time since the last inbound traffic.
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.last_seen.elapsed()
    }
}
