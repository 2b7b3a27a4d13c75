//! relaynode - host-to-relay bridge.
//!
//! Keeps one authenticated WebSocket session to a relay server and exposes
//! the host's documents, dice and chat log as remotely invocable actions.
//!
//! - [`connection`]: lifecycle, heartbeat and bounded reconnect backoff
//! - [`router`]: name-keyed handler registry with failure containment
//! - [`routes`]: the domain route sets (ping, roll, chat, search, entity)
//! - [`module`]: wires everything together at startup and shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod host;
pub mod module;
pub mod router;
pub mod routes;

pub use config::{LogLevel, RelayConfig};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, RelayLink};
pub use error::RelayError;
pub use history::{ChatHistory, HistoryBuffer, RollHistory};
pub use host::{Host, HostError, MemoryHost};
pub use module::{ClientInfo, RelayModule};
pub use router::{ActionRouter, CallContext, HandlerError, Registration, RouteSet};
