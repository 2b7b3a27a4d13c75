//! The narrow handle handlers use to talk to the relay.

use std::sync::Arc;

use parking_lot::RwLock;
use relay_proto::Frame;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use super::{AtomicConnectionState, ConnectionEvent, ConnectionState};
use crate::error::RelayError;

const EVENT_CAPACITY: usize = 64;

/// State shared between the manager, its session task and every link.
///
/// Only the manager and its session task write to it.
#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicConnectionState,
    client_id: RwLock<Option<String>>,
    last_error: RwLock<Option<String>>,
    outbound: RwLock<Option<mpsc::UnboundedSender<Frame>>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: AtomicConnectionState::default(),
            client_id: RwLock::new(None),
            last_error: RwLock::new(None),
            outbound: RwLock::new(None),
            events,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state.load()
    }

    /// Apply a checked transition, logging and broadcasting it.
    pub(crate) fn transition(
        &self,
        to: ConnectionState,
        cause: &str,
    ) -> Result<ConnectionState, RelayError> {
        let from = self
            .state
            .transition(to)
            .map_err(|from| RelayError::InvalidTransition { from, to })?;
        self.announce(from, to, cause);
        Ok(from)
    }

    /// Set the state regardless of the transition table. Used by `stop()`.
    pub(crate) fn force(&self, to: ConnectionState, cause: &str) {
        let from = self.state.load();
        self.state.store(to);
        if from != to {
            self.announce(from, to, cause);
        }
    }

    fn announce(&self, from: ConnectionState, to: ConnectionState, cause: &str) {
        info!(%from, %to, cause, "connection state changed");
        self.emit(ConnectionEvent::StateChanged {
            from,
            to,
            cause: cause.to_string(),
        });
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn install_outbound(&self, tx: mpsc::UnboundedSender<Frame>) {
        *self.outbound.write() = Some(tx);
    }

    pub(crate) fn clear_outbound(&self) {
        self.outbound.write().take();
    }

    pub(crate) fn set_client_id(&self, client_id: String) {
        *self.client_id.write() = Some(client_id);
    }

    pub(crate) fn client_id(&self) -> Option<String> {
        self.client_id.read().clone()
    }

    pub(crate) fn set_last_error(&self, error: String) {
        *self.last_error.write() = Some(error);
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

/// Cloneable handle onto the single relay connection.
///
/// Exposes only the queries and the send capability; the lifecycle stays
/// with [`ConnectionManager`](super::ConnectionManager).
#[derive(Debug, Clone)]
pub struct RelayLink {
    shared: Arc<Shared>,
}

impl RelayLink {
    pub(crate) const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Snapshot of the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether an authenticated socket is up right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Identifier assigned by the relay on the last successful auth.
    #[must_use]
    pub fn client_id(&self) -> Option<String> {
        self.shared.client_id()
    }

    /// Queue a frame for the socket.
    ///
    /// Frames sent through one link are written in call order.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotConnected`] when no authenticated session
    /// is up. The failure is logged; callers can ignore it.
    pub fn send(&self, frame: Frame) -> Result<(), RelayError> {
        let state = self.state();
        if state != ConnectionState::Connected {
            debug!(frame_type = %frame.kind, %state, "dropping frame, not connected");
            return Err(RelayError::NotConnected(state));
        }

        let outbound = self.shared.outbound.read();
        let Some(tx) = outbound.as_ref() else {
            debug!(frame_type = %frame.kind, "dropping frame, session closing");
            return Err(RelayError::NotConnected(state));
        };

        tx.send(frame).map_err(|rejected| {
            debug!(frame_type = %rejected.0.kind, "dropping frame, session closed");
            RelayError::NotConnected(self.state())
        })
    }

    /// Subscribe to connection events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.subscribe()
    }
}

#[cfg(test)]
impl RelayLink {
    /// A link in `Connected` state whose frames land in the returned receiver.
    pub(crate) fn loopback() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let shared = Arc::new(Shared::new());
        let (tx, rx) = mpsc::unbounded_channel();
        shared.install_outbound(tx);
        shared.set_client_id("test-client".to_string());
        shared.state.store(ConnectionState::Connected);
        (Self::new(shared), rx)
    }

    /// A link that has never connected.
    pub(crate) fn disconnected() -> Self {
        Self::new(Arc::new(Shared::new()))
    }
}
