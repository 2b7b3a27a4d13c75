//! # relay-proto
//!
//! Protocol definitions for host-to-relay communication.
//!
//! Every message on the wire is a JSON object with a `type` discriminator,
//! an optional `requestId` correlation token, and an action-specific body.
//! [`Frame`] is the untyped envelope; [`ControlMessage`] covers the frames
//! the connection layer itself understands, and [`payloads`] holds one
//! concrete request shape per routed action.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod frame;
pub mod messages;
pub mod payloads;
pub mod records;

pub use error::ProtoError;
pub use frame::Frame;
pub use messages::{AuthRequest, CloseCode, ControlMessage};
pub use records::{ChatRecord, DieResult, DieTerm, RollRecord, SearchHit, UserRef};

/// Milliseconds since the Unix epoch, the timestamp unit used on the wire.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
