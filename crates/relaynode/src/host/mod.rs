//! Host capabilities consumed by the route handlers.
//!
//! The relay node exposes a host application's documents, dice and chat
//! log. [`Host`] is the seam; [`MemoryHost`] is the in-process
//! implementation used by the binary and the tests.

mod dice;
mod memory;

use std::future::Future;
use std::pin::Pin;

use relay_proto::{ChatRecord, RollRecord, SearchHit, UserRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub use dice::{Formula, MAX_DICE, MAX_FACES, RollOutcome};
pub use memory::{MemoryHost, WorldSeed};

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// Boxed future returned by [`Host`] methods.
pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = HostResult<T>> + Send + 'a>>;

/// Host capability failures.
#[derive(Debug, Error)]
pub enum HostError {
    /// No document with this uuid.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// The dice formula did not parse.
    #[error("invalid formula {0}")]
    InvalidFormula(String),

    /// Document data was rejected.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Seed data could not be loaded.
    #[error("failed to load world: {0}")]
    Seed(String),
}

/// What the host reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostInfo {
    /// World identifier.
    pub world_id: String,
    /// World title.
    pub world_title: String,
    /// Game system identifier.
    pub system_id: String,
    /// Game system title.
    pub system_title: String,
    /// Game system version.
    pub system_version: String,
    /// Host application version.
    pub host_version: String,
}

/// A message to post to the host chat log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewChatMessage {
    /// Message content.
    pub content: String,
    /// Speaker descriptor.
    pub speaker: Option<Value>,
    /// Normalized message type.
    pub message_type: String,
    /// Flavor text.
    pub flavor: String,
    /// Whisper recipients.
    pub whisper: Vec<String>,
    /// GM-only.
    pub blind: bool,
    /// Attached roll, making this a roll message.
    pub roll: Option<RollOutcome>,
}

/// A message in the host chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostChatMessage {
    /// Message id.
    pub id: String,
    /// Author.
    #[serde(default)]
    pub user: UserRef,
    /// Content.
    #[serde(default)]
    pub content: String,
    /// Flavor text.
    #[serde(default)]
    pub flavor: String,
    /// Message type as stored by the host.
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    /// Speaker descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<Value>,
    /// Whisper recipients.
    #[serde(default)]
    pub whisper: Vec<String>,
    /// GM-only.
    #[serde(default)]
    pub blind: bool,
    /// Attached roll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<RollOutcome>,
}

impl HostChatMessage {
    /// Whether this message carries a roll.
    #[must_use]
    pub const fn is_roll(&self) -> bool {
        self.roll.is_some()
    }

    /// History record for a non-roll message.
    #[must_use]
    pub fn to_chat_record(&self) -> ChatRecord {
        ChatRecord {
            id: self.id.clone(),
            message_id: self.id.clone(),
            user: self.user.clone(),
            content: self.content.clone(),
            flavor: self.flavor.clone(),
            message_type: self
                .message_type
                .clone()
                .unwrap_or_else(|| "player-chat".to_string()),
            timestamp: self.timestamp,
            speaker: self.speaker.clone(),
            whisper: self.whisper.clone(),
            blind: self.blind,
        }
    }

    /// History record for a roll message, `None` for plain chat.
    #[must_use]
    pub fn to_roll_record(&self) -> Option<RollRecord> {
        let roll = self.roll.as_ref()?;
        Some(RollRecord {
            id: self.id.clone(),
            message_id: self.id.clone(),
            user: self.user.clone(),
            speaker: self.speaker.clone(),
            flavor: self.flavor.clone(),
            roll_total: roll.total,
            formula: roll.formula.clone(),
            is_critical: roll.is_critical,
            is_fumble: roll.is_fumble,
            dice: roll.dice.clone(),
            timestamp: self.timestamp,
        })
    }
}

/// Capabilities the relay exposes.
pub trait Host: Send + Sync {
    /// World and system identity.
    fn info(&self) -> HostInfo;

    /// Search the document index.
    fn search<'a>(
        &'a self,
        query: &'a str,
        filter: Option<&'a str>,
        limit: usize,
    ) -> HostFuture<'a, Vec<SearchHit>>;

    /// Fetch a document by uuid.
    fn get_entity<'a>(&'a self, uuid: &'a str) -> HostFuture<'a, Value>;

    /// Create a document; returns it with its assigned uuid.
    fn create_entity<'a>(
        &'a self,
        entity_type: &'a str,
        data: Value,
        folder: Option<&'a str>,
    ) -> HostFuture<'a, Value>;

    /// Merge `data` into a document; returns the updated document.
    fn update_entity<'a>(&'a self, uuid: &'a str, data: Value) -> HostFuture<'a, Value>;

    /// Delete a document.
    fn delete_entity<'a>(&'a self, uuid: &'a str) -> HostFuture<'a, ()>;

    /// Evaluate a dice formula.
    fn evaluate_roll<'a>(&'a self, formula: &'a str) -> HostFuture<'a, RollOutcome>;

    /// Append to the chat log. Subscribers see the created message.
    fn create_chat_message(&self, message: NewChatMessage) -> HostFuture<'_, HostChatMessage>;

    /// The chat log, oldest first.
    fn chat_log(&self) -> Vec<HostChatMessage>;

    /// Chat messages created from now on.
    fn subscribe(&self) -> broadcast::Receiver<HostChatMessage>;
}
