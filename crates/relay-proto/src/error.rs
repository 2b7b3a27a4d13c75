//! Error types for the relay-proto crate.

use thiserror::Error;

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a frame.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a frame.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Frame was well-formed JSON but carried an unexpected shape.
    #[error("validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = ProtoError::MissingField("type");
        assert_eq!(err.to_string(), "missing required field: type");
    }

    #[test]
    fn test_decoding_display() {
        let err = ProtoError::Decoding("expected value at line 1".to_string());
        assert!(err.to_string().starts_with("decoding error"));
    }
}
