//! Error types for relaynode.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors that can occur in node operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure: connect refused, socket closed, timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The relay refused the credential.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// Heartbeat liveness window elapsed.
    #[error("heartbeat timeout after {0:?}")]
    HeartbeatTimeout(std::time::Duration),

    /// A frame was sent while no authenticated connection exists.
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    /// State machine rejected a transition.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// State before the attempted transition.
        from: ConnectionState,
        /// Requested state.
        to: ConnectionState,
    },

    /// Host capability failure.
    #[error("host error: {0}")]
    Host(#[from] crate::host::HostError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] relay_proto::ProtoError),
}

impl RelayError {
    /// Whether this error came from the relay refusing our credential.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::AuthRejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = RelayError::Config("relay_url cannot be empty".to_string());
        assert_eq!(err.to_string(), "configuration error: relay_url cannot be empty");
    }

    #[test]
    fn test_auth_rejected_is_auth() {
        let err = RelayError::AuthRejected("invalid API key".to_string());
        assert!(err.is_auth());
        assert!(!RelayError::Transport("refused".to_string()).is_auth());
    }

    #[test]
    fn test_not_connected_display() {
        let err = RelayError::NotConnected(ConnectionState::Backoff);
        assert_eq!(err.to_string(), "not connected (state: backoff)");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = RelayError::InvalidTransition {
            from: ConnectionState::Disconnected,
            to: ConnectionState::Connected,
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition: disconnected -> connected"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RelayError = io_err.into();
        assert!(err.to_string().contains("io error"));
    }
}
