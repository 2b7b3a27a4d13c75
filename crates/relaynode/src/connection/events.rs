//! Connection event types.

use std::time::Duration;

use super::ConnectionState;

/// Events broadcast by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The state machine moved.
    StateChanged {
        /// Prior state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
        /// What triggered the move.
        cause: String,
    },
    /// Authenticated; the relay assigned this id.
    Connected {
        /// Assigned client id.
        client_id: String,
    },
    /// Waiting before the next attempt.
    Reconnecting {
        /// Consecutive failures so far.
        attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// The relay refused our credential.
    AuthRejected {
        /// Reason given by the relay.
        reason: String,
    },
    /// Retry budget exhausted; an explicit `start()` is required.
    Failed {
        /// Consecutive failures.
        attempts: u32,
        /// Last error seen.
        last_error: String,
    },
    /// Stopped by the operator.
    Stopped,
}

impl ConnectionEvent {
    /// Whether the operator should be told about this event.
    #[must_use]
    pub const fn needs_attention(&self) -> bool {
        matches!(self, Self::AuthRejected { .. } | Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_variants() {
        let reconnecting = ConnectionEvent::Reconnecting {
            attempt: 3,
            delay: Duration::from_secs(4),
        };
        if let ConnectionEvent::Reconnecting { attempt, delay } = reconnecting {
            assert_eq!(attempt, 3);
            assert_eq!(delay, Duration::from_secs(4));
        } else {
            panic!("expected Reconnecting");
        }

        let changed = ConnectionEvent::StateChanged {
            from: ConnectionState::Connected,
            to: ConnectionState::Backoff,
            cause: "socket closed".to_string(),
        };
        assert!(!changed.needs_attention());
    }

    #[test]
    fn test_needs_attention() {
        assert!(ConnectionEvent::AuthRejected {
            reason: "invalid API key".to_string()
        }
        .needs_attention());
        assert!(ConnectionEvent::Failed {
            attempts: 21,
            last_error: "refused".to_string()
        }
        .needs_attention());
        assert!(!ConnectionEvent::Stopped.needs_attention());
    }
}
