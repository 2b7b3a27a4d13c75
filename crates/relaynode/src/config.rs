//! Node configuration.
//!
//! Mirrors the host module's settings screen:
//! - Relay endpoint and credential
//! - Heartbeat and reconnect tuning
//! - History buffer sizes
//! - Log level

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::{ClientIdentity, ConnectionConfig, HeartbeatConfig, ReconnectConfig};
use crate::error::RelayError;

/// Allowed range for the ping interval, in seconds.
pub const PING_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 5..=600;

/// Allowed range for the number of stored rolls.
pub const MAX_ROLLS_RANGE: std::ops::RangeInclusive<usize> = 5..=100;

/// Logging verbosity, as offered by the host settings screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything.
    Debug,
    /// Informational and above.
    Info,
    /// Warnings and errors.
    #[default]
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// `tracing` filter directive for this level.
    #[must_use]
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Decode the host's numeric setting (0 = debug .. 3 = error).
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Debug),
            1 => Some(Self::Info),
            2 => Some(Self::Warn),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

impl FromStr for LogLevel {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "0" => Ok(Self::Debug),
            "info" | "1" => Ok(Self::Info),
            "warn" | "2" => Ok(Self::Warn),
            "error" | "3" => Ok(Self::Error),
            other => Err(RelayError::Config(format!("unknown log level: {other}"))),
        }
    }
}

fn default_relay_url() -> String {
    "ws://localhost:3010".to_string()
}
const fn default_ping_interval() -> u64 {
    30
}
const fn default_heartbeat_grace() -> u64 {
    10
}
const fn default_max_attempts() -> u32 {
    20
}
const fn default_base_delay() -> u64 {
    1000
}
const fn default_max_delay() -> u64 {
    30_000
}
const fn default_connect_timeout() -> u64 {
    10
}
const fn default_max_rolls() -> usize {
    20
}
const fn default_max_chat() -> usize {
    100
}

/// Main node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay WebSocket URL. `http(s)://` is accepted and rewritten.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    /// API key presented during authentication.
    pub api_key: String,
    /// Optional display name for this client.
    #[serde(default)]
    pub custom_name: String,
    /// Seconds between heartbeat pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Extra seconds allowed past the ping interval before the link is dead.
    #[serde(default = "default_heartbeat_grace")]
    pub heartbeat_grace_secs: u64,
    /// Consecutive failed attempts tolerated before giving up.
    #[serde(default = "default_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Delay before the first reconnect attempt, in milliseconds.
    #[serde(default = "default_base_delay")]
    pub reconnect_base_delay_ms: u64,
    /// Upper bound on the reconnect delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub reconnect_max_delay_ms: u64,
    /// Timeout for opening the socket and for the auth handshake.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Capacity of the recent-rolls buffer.
    #[serde(default = "default_max_rolls")]
    pub max_rolls_stored: usize,
    /// Capacity of the recent-chat buffer.
    #[serde(default = "default_max_chat")]
    pub max_chat_messages_stored: usize,
    /// Logging verbosity.
    #[serde(default)]
    pub log_level: LogLevel,
    /// Optional JSON file seeding the in-memory host world.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_file: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            api_key: String::new(),
            custom_name: String::new(),
            ping_interval_secs: default_ping_interval(),
            heartbeat_grace_secs: default_heartbeat_grace(),
            reconnect_max_attempts: default_max_attempts(),
            reconnect_base_delay_ms: default_base_delay(),
            reconnect_max_delay_ms: default_max_delay(),
            connect_timeout_secs: default_connect_timeout(),
            max_rolls_stored: default_max_rolls(),
            max_chat_messages_stored: default_max_chat(),
            log_level: LogLevel::default(),
            world_file: None,
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RelayError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or fails validation.
    pub fn from_json(content: &str) -> Result<Self, RelayError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| RelayError::Config(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a JSON file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RelayError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RelayError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.relay_url.trim().is_empty() {
            return Err(RelayError::Config("relay_url cannot be empty".to_string()));
        }

        let scheme_ok = ["ws://", "wss://", "http://", "https://"]
            .iter()
            .any(|scheme| self.relay_url.starts_with(scheme));
        if !scheme_ok {
            return Err(RelayError::Config(
                "relay_url must start with ws://, wss://, http:// or https://".to_string(),
            ));
        }

        if self.api_key.trim().is_empty() {
            return Err(RelayError::Config("api_key cannot be empty".to_string()));
        }

        if !PING_INTERVAL_RANGE.contains(&self.ping_interval_secs) {
            return Err(RelayError::Config(format!(
                "ping_interval_secs must be between {} and {}",
                PING_INTERVAL_RANGE.start(),
                PING_INTERVAL_RANGE.end()
            )));
        }

        if self.reconnect_base_delay_ms == 0 {
            return Err(RelayError::Config(
                "reconnect_base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(RelayError::Config(
                "reconnect_max_delay_ms must not be below reconnect_base_delay_ms".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(RelayError::Config(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if !MAX_ROLLS_RANGE.contains(&self.max_rolls_stored) {
            return Err(RelayError::Config(format!(
                "max_rolls_stored must be between {} and {}",
                MAX_ROLLS_RANGE.start(),
                MAX_ROLLS_RANGE.end()
            )));
        }

        if self.max_chat_messages_stored == 0 {
            return Err(RelayError::Config(
                "max_chat_messages_stored must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The relay URL with an HTTP scheme rewritten to its WebSocket form.
    #[must_use]
    pub fn relay_endpoint(&self) -> String {
        let url = self.relay_url.trim();
        if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            url.to_string()
        }
    }

    /// Settings consumed by the connection manager.
    #[must_use]
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.relay_endpoint(),
            api_key: self.api_key.clone(),
            client_name: self.custom_name.clone(),
            identity: ClientIdentity::default(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(self.ping_interval_secs),
                grace: Duration::from_secs(self.heartbeat_grace_secs),
            },
            reconnect: ReconnectConfig {
                base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
                max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
                max_attempts: self.reconnect_max_attempts,
            },
        }
    }
}
