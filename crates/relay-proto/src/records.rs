//! Records exchanged with the relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The user who authored a chat message or roll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User id, if known.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name, if known.
    #[serde(default)]
    pub name: Option<String>,
}

impl UserRef {
    /// Create a user reference.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
        }
    }

    /// Display name or `"unknown"`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unknown")
    }
}

/// A single die's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieResult {
    /// Face value rolled.
    pub result: u32,
    /// Whether the result counts toward the total.
    pub active: bool,
}

/// One dice term of a formula, e.g. the `3d6` in `3d6+2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieTerm {
    /// Number of faces on each die.
    pub faces: u32,
    /// Individual results.
    pub results: Vec<DieResult>,
}

/// A dice roll as recorded in the roll history and pushed as `roll-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollRecord {
    /// Record id; equals the originating chat message id.
    pub id: String,
    /// Originating chat message id.
    pub message_id: String,
    /// Author.
    #[serde(default)]
    pub user: UserRef,
    /// Speaker descriptor as provided by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<Value>,
    /// Flavor text.
    #[serde(default)]
    pub flavor: String,
    /// Evaluated total.
    pub roll_total: i64,
    /// Formula as entered.
    pub formula: String,
    /// Critical success flag.
    #[serde(default)]
    pub is_critical: bool,
    /// Critical failure flag.
    #[serde(default)]
    pub is_fumble: bool,
    /// Per-term dice results.
    #[serde(default)]
    pub dice: Vec<DieTerm>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// A non-roll chat message as recorded in the chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    /// Record id; equals the chat message id.
    pub id: String,
    /// Chat message id.
    pub message_id: String,
    /// Author.
    #[serde(default)]
    pub user: UserRef,
    /// Message HTML/text content.
    pub content: String,
    /// Flavor text.
    #[serde(default)]
    pub flavor: String,
    /// Normalized message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Speaker descriptor as provided by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<Value>,
    /// Whisper recipients.
    #[serde(default)]
    pub whisper: Vec<String>,
    /// Blind (GM-only) roll flag.
    #[serde(default)]
    pub blind: bool,
}

/// A search index hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Document uuid.
    pub uuid: String,
    /// Document name.
    pub name: String,
    /// Document type, e.g. `Actor` or `Item`.
    pub document_type: String,
    /// Image path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
    /// Containing folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}
