//! Request payloads, one shape per routed action.
//!
//! Handlers receive these already validated: the router decodes the frame
//! body into the registered payload type before the handler runs.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn default_rolls_limit() -> usize {
    20
}

fn default_chat_limit() -> usize {
    50
}

fn default_sort() -> String {
    "timestamp".to_string()
}

// Missing, null, zero and negative limits all mean "use the default".
fn positive_limit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    let limit = Option::<i64>::deserialize(deserializer)?;
    Ok(limit
        .filter(|limit| *limit > 0)
        .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX)))
}

fn rolls_limit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    Ok(positive_limit(deserializer)?.unwrap_or_else(default_rolls_limit))
}

fn chat_limit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    Ok(positive_limit(deserializer)?.unwrap_or_else(default_chat_limit))
}

fn sort_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let sort = Option::<String>::deserialize(deserializer)?;
    Ok(sort.filter(|s| !s.is_empty()).unwrap_or_else(default_sort))
}

/// `roll`: evaluate a dice formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollRequest {
    /// Dice formula, e.g. `2d6+3`.
    pub formula: String,
    /// Flavor text for the chat card.
    #[serde(default)]
    pub flavor: Option<String>,
    /// Whether to post the roll to chat.
    #[serde(default)]
    pub create_chat_message: bool,
    /// Uuid of the speaking actor or token.
    #[serde(default)]
    pub speaker: Option<String>,
    /// Whisper recipients; a non-empty list makes the roll private.
    #[serde(default)]
    pub whisper: Vec<String>,
}

/// `rolls`: list recent rolls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollsRequest {
    /// Maximum number of rolls returned.
    #[serde(default = "default_rolls_limit", deserialize_with = "rolls_limit")]
    pub limit: usize,
    /// Empty the roll history first.
    #[serde(default)]
    pub clear: bool,
    /// Empty and repopulate from the host chat log first.
    #[serde(default)]
    pub refresh: bool,
}

impl Default for RollsRequest {
    fn default() -> Self {
        Self {
            limit: default_rolls_limit(),
            clear: false,
            refresh: false,
        }
    }
}

/// Sort direction for list requests.
///
/// Only `desc` (or no value) sorts newest first; any other value sorts
/// oldest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest first.
    Asc,
    /// Newest first.
    #[default]
    Desc,
}

impl<'de> Deserialize<'de> for SortOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let order = Option::<String>::deserialize(deserializer)?;
        Ok(match order.as_deref() {
            None | Some("" | "desc") => Self::Desc,
            Some(_) => Self::Asc,
        })
    }
}

/// Body of an incoming chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatContent {
    /// Message text.
    pub message: String,
    /// Speaker alias.
    #[serde(default)]
    pub speaker: Option<String>,
    /// Requested message type; normalized before use.
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    /// Flavor text.
    #[serde(default)]
    pub flavor: Option<String>,
}

/// `chat`: post a message to the host chat log.
///
/// Relays send the content either flat or nested under `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatRequest {
    /// `{"message": {"message": "...", ...}}`
    Nested {
        /// The content.
        message: ChatContent,
    },
    /// `{"message": "...", ...}`
    Flat(ChatContent),
}

impl ChatRequest {
    /// The message content regardless of envelope shape.
    #[must_use]
    pub fn content(&self) -> &ChatContent {
        match self {
            Self::Nested { message } | Self::Flat(message) => message,
        }
    }

    /// Consume into the message content.
    #[must_use]
    pub fn into_content(self) -> ChatContent {
        match self {
            Self::Nested { message } | Self::Flat(message) => message,
        }
    }
}

/// `chat-messages`: list recent chat messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessagesRequest {
    /// Maximum number of messages returned.
    #[serde(default = "default_chat_limit", deserialize_with = "chat_limit")]
    pub limit: usize,
    /// Sort key; only `timestamp` sorts, anything else keeps buffer order.
    #[serde(default = "default_sort", deserialize_with = "sort_key")]
    pub sort: String,
    /// Sort direction.
    #[serde(default)]
    pub order: SortOrder,
    /// Rebuild the history from the host chat log first.
    #[serde(default)]
    pub refresh: bool,
}

impl Default for ChatMessagesRequest {
    fn default() -> Self {
        Self {
            limit: default_chat_limit(),
            sort: default_sort(),
            order: SortOrder::Desc,
            refresh: false,
        }
    }
}

/// `search`: query the host search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text.
    pub query: String,
    /// Restrict hits to one document type.
    #[serde(default)]
    pub filter: Option<String>,
}

/// `get-entity` and `delete-entity`: address a document by uuid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Document uuid.
    pub uuid: String,
}

/// `create-entity`: create a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntityRequest {
    /// Document type, e.g. `Actor`.
    pub entity_type: String,
    /// Initial document data; must contain a `name`.
    pub data: Value,
    /// Optional folder to place the document in.
    #[serde(default)]
    pub folder: Option<String>,
}

/// `update-entity`: merge fields into an existing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEntityRequest {
    /// Document uuid.
    pub uuid: String,
    /// Fields to merge.
    pub data: Value,
}
