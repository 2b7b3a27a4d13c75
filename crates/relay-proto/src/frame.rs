//! The wire frame envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtoError;

/// Suffix appended to an action name to form its reply type.
pub const RESULT_SUFFIX: &str = "-result";

/// A single message unit exchanged with the relay.
///
/// On the wire a frame is a flat JSON object:
///
/// ```json
/// {"type": "roll", "requestId": "abc", "formula": "1d20"}
/// ```
///
/// `type` and `requestId` are lifted into their own fields; every other
/// member lands in [`Frame::body`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Discriminator used for routing.
    #[serde(rename = "type")]
    pub kind: String,
    /// Correlation token shared by a request and its reply.
    #[serde(
        rename = "requestId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<String>,
    /// Action-specific members.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Frame {
    /// Create an empty frame of the given type.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            request_id: None,
            body: Map::new(),
        }
    }

    /// Create the reply frame for `action`, carrying the request's id.
    #[must_use]
    pub fn result(action: &str, request_id: Option<String>) -> Self {
        Self {
            kind: reply_type(action),
            request_id,
            body: Map::new(),
        }
    }

    /// Create the generic failure reply for `action`.
    #[must_use]
    pub fn failure(action: &str, request_id: Option<String>, error: impl Into<String>) -> Self {
        Self::result(action, request_id)
            .with("success", false)
            .with("error", error.into())
    }

    /// Attach a correlation token.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set a body member. Values that fail to serialize become `null`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.body.insert(key.into(), value);
        self
    }

    /// Get a body member.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// The body as a JSON object value.
    #[must_use]
    pub fn data(&self) -> Value {
        Value::Object(self.body.clone())
    }

    /// Consume the frame, returning the body as a JSON object value.
    #[must_use]
    pub fn into_data(self) -> Value {
        Value::Object(self.body)
    }

    /// Whether this frame is the reply to a request with the given id.
    #[must_use]
    pub fn answers(&self, request_id: &str) -> bool {
        self.request_id.as_deref() == Some(request_id)
    }

    /// Parse and validate an inbound frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object, if `type` is
    /// missing or empty, or if `requestId` is not a string or number.
    pub fn parse(text: &str) -> Result<Self, ProtoError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtoError::Decoding(e.to_string()))?;
        Self::from_value(value)
    }

    /// Validate an already-decoded JSON value as a frame.
    ///
    /// Numeric request ids are accepted and normalized to strings.
    ///
    /// # Errors
    ///
    /// See [`Frame::parse`].
    pub fn from_value(value: Value) -> Result<Self, ProtoError> {
        let Value::Object(mut body) = value else {
            return Err(ProtoError::Validation("frame must be a JSON object".to_string()));
        };

        let kind = match body.remove("type") {
            Some(Value::String(kind)) if !kind.trim().is_empty() => kind,
            Some(Value::String(_)) => {
                return Err(ProtoError::Validation("frame type is empty".to_string()));
            }
            Some(_) => {
                return Err(ProtoError::Validation("frame type must be a string".to_string()));
            }
            None => return Err(ProtoError::MissingField("type")),
        };

        let request_id = match body.remove("requestId") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => {
                return Err(ProtoError::Validation(
                    "requestId must be a string".to_string(),
                ));
            }
        };

        Ok(Self {
            kind,
            request_id,
            body,
        })
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }
}

/// The reply type for an action, e.g. `roll` -> `roll-result`.
#[must_use]
pub fn reply_type(action: &str) -> String {
    format!("{action}{RESULT_SUFFIX}")
}
