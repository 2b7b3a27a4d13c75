//! Control messages understood by the connection layer.
//!
//! Routed actions are opaque to the connection manager, but a handful of
//! frame types drive the connection itself: the authentication handshake
//! and the heartbeat pair. Those are modelled here as a tagged union so the
//! manager never pokes at untyped JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::frame::Frame;

/// Credentials and identity presented right after the socket opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// API key issued by the relay.
    pub token: String,
    /// Operator-chosen display name, may be empty.
    #[serde(default)]
    pub client_name: String,
    /// Host world identifier.
    #[serde(default)]
    pub world_id: String,
    /// Host world title.
    #[serde(default)]
    pub world_title: String,
    /// Host game system identifier.
    #[serde(default)]
    pub system_id: String,
    /// Host game system version.
    #[serde(default)]
    pub system_version: String,
    /// Host application version.
    #[serde(default)]
    pub host_version: String,
}

/// Frames consumed by the connection manager rather than the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Authentication request (client to relay).
    Auth(AuthRequest),
    /// Authentication accepted; the relay assigns a client id.
    AuthSuccess {
        /// Identifier assigned to this client.
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// Authentication rejected.
    AuthFailure {
        /// Human-readable reason.
        #[serde(default)]
        error: String,
    },
    /// Heartbeat probe.
    Ping,
    /// Heartbeat answer.
    Pong,
}

impl ControlMessage {
    /// Frame types that map onto a control message.
    pub const TYPES: [&'static str; 5] = ["auth", "auth-success", "auth-failure", "ping", "pong"];

    /// Create an auth message.
    #[must_use]
    pub fn auth(request: AuthRequest) -> Self {
        Self::Auth(request)
    }

    /// Create an auth success message.
    #[must_use]
    pub fn auth_success(client_id: impl Into<String>) -> Self {
        Self::AuthSuccess {
            client_id: client_id.into(),
        }
    }

    /// Create an auth failure message.
    #[must_use]
    pub fn auth_failure(error: impl Into<String>) -> Self {
        Self::AuthFailure {
            error: error.into(),
        }
    }

    /// Convert into an untyped frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_frame(&self) -> Result<Frame, ProtoError> {
        let value = serde_json::to_value(self).map_err(|e| ProtoError::Encoding(e.to_string()))?;
        Frame::from_value(value)
    }

    /// Interpret a frame as a control message.
    ///
    /// Returns `None` for routed action frames. A frame that claims a
    /// control type but has the wrong shape is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a control-typed frame fails to decode.
    pub fn from_frame(frame: &Frame) -> Result<Option<Self>, ProtoError> {
        if !Self::TYPES.contains(&frame.kind.as_str()) {
            return Ok(None);
        }
        let value = serde_json::to_value(frame).map_err(|e| ProtoError::Encoding(e.to_string()))?;
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ProtoError::Decoding(e.to_string()))
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}

/// WebSocket close codes used by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// Normal closure.
    Normal,
    /// Relay-side failure.
    InternalError,
    /// The client did not identify itself.
    NoClientId,
    /// Missing or invalid credential.
    NoAuth,
    /// No guild is connected for this key.
    NoConnectedGuild,
    /// Another connection already uses this identity.
    DuplicateConnection,
    /// The relay is shutting down.
    ServerShutdown,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    /// Decode a numeric close code.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            4000 => Self::InternalError,
            4001 => Self::NoClientId,
            4002 => Self::NoAuth,
            4003 => Self::NoConnectedGuild,
            4004 => Self::DuplicateConnection,
            4005 => Self::ServerShutdown,
            other => Self::Other(other),
        }
    }

    /// The numeric close code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::InternalError => 4000,
            Self::NoClientId => 4001,
            Self::NoAuth => 4002,
            Self::NoConnectedGuild => 4003,
            Self::DuplicateConnection => 4004,
            Self::ServerShutdown => 4005,
            Self::Other(code) => code,
        }
    }

    /// Whether the relay closed the socket because the credential was refused.
    #[must_use]
    pub const fn is_auth_rejection(self) -> bool {
        matches!(self, Self::NoClientId | Self::NoAuth)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::InternalError => "internal error",
            Self::NoClientId => "no client id",
            Self::NoAuth => "no auth",
            Self::NoConnectedGuild => "no connected guild",
            Self::DuplicateConnection => "duplicate connection",
            Self::ServerShutdown => "server shutdown",
            Self::Other(_) => "other",
        };
        write!(f, "{} ({})", name, self.as_u16())
    }
}
