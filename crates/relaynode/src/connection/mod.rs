//! Relay connection lifecycle.
//!
//! [`ConnectionManager`] owns the one socket to the relay: it connects,
//! authenticates, heartbeats, and reconnects with bounded exponential
//! backoff. Everything else reaches the connection through a
//! [`RelayLink`], which only offers `send`, `is_connected` and
//! `client_id`.

mod backoff;
mod events;
mod heartbeat;
mod link;
mod manager;
mod state;

use std::time::Duration;

use relay_proto::AuthRequest;

pub use backoff::{Backoff, BackoffStep, ReconnectConfig};
pub use events::ConnectionEvent;
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use link::RelayLink;
pub use manager::ConnectionManager;
pub use state::{AtomicConnectionState, ConnectionState};

/// What the host reports about itself during authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    /// World identifier.
    pub world_id: String,
    /// World title.
    pub world_title: String,
    /// Game system identifier.
    pub system_id: String,
    /// Game system version.
    pub system_version: String,
    /// Host application version.
    pub host_version: String,
}

/// Settings for one manager instance. Immutable once the manager exists.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Credential sent in the auth frame.
    pub api_key: String,
    /// Display name sent in the auth frame.
    pub client_name: String,
    /// Identity sent in the auth frame.
    pub identity: ClientIdentity,
    /// Bound on socket open and on the auth handshake.
    pub connect_timeout: Duration,
    /// Heartbeat tuning.
    pub heartbeat: HeartbeatConfig,
    /// Reconnect tuning.
    pub reconnect: ReconnectConfig,
}

impl ConnectionConfig {
    /// Create a config with default tuning.
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            client_name: String::new(),
            identity: ClientIdentity::default(),
            connect_timeout: Duration::from_secs(10),
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// The auth frame body for this client.
    #[must_use]
    pub fn auth_request(&self) -> AuthRequest {
        AuthRequest {
            token: self.api_key.clone(),
            client_name: self.client_name.clone(),
            world_id: self.identity.world_id.clone(),
            world_title: self.identity.world_title.clone(),
            system_id: self.identity.system_id.clone(),
            system_version: self.identity.system_version.clone(),
            host_version: self.identity.host_version.clone(),
        }
    }
}
