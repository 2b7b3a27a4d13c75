//! Connection state types.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// State of the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected; initial state and the state after `stop()`.
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Socket open, waiting for the relay to accept our credential.
    Authenticating,
    /// Authenticated and serving frames.
    Connected,
    /// Waiting out a reconnect delay.
    Backoff,
    /// Retry budget exhausted; needs an explicit `start()`.
    Failed,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{
            Authenticating, Backoff, Connected, Connecting, Disconnected, Failed,
        };
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected | Failed, Connecting)
                | (Connecting, Authenticating | Backoff)
                | (Authenticating, Connected | Backoff)
                | (Connected, Backoff)
                | (Backoff, Connecting | Failed)
        )
    }

    /// Whether a session loop is expected to be running in this state.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Authenticating | Self::Connected | Self::Backoff
        )
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Backoff => "backoff",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic wrapper for connection state.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU32);

impl AtomicConnectionState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: ConnectionState) -> Self {
        Self(AtomicU32::new(state as u32))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        Self::decode(self.0.load(Ordering::SeqCst))
    }

    /// Store a new state unconditionally.
    pub fn store(&self, state: ConnectionState) {
        self.0.store(state as u32, Ordering::SeqCst);
    }

    /// Move to `next` if the transition table allows it from the current
    /// state. Returns the prior state on success.
    ///
    /// # Errors
    ///
    /// Returns the current state if the transition is not allowed.
    pub fn transition(&self, next: ConnectionState) -> Result<ConnectionState, ConnectionState> {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                Self::decode(raw)
                    .can_transition_to(next)
                    .then_some(next as u32)
            })
            .map(Self::decode)
            .map_err(Self::decode)
    }

    const fn decode(raw: u32) -> ConnectionState {
        match raw {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Authenticating,
            3 => ConnectionState::Connected,
            4 => ConnectionState::Backoff,
            _ => ConnectionState::Failed,
        }
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}
