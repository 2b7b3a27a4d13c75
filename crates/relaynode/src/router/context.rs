//! Per-call context handed to handlers.

use relay_proto::Frame;
use tracing::debug;

use crate::connection::RelayLink;

/// Everything a handler invocation may touch: the link for replies and
/// the request's correlation token.
///
/// Built fresh for every dispatched frame and moved into the handler.
#[derive(Debug, Clone)]
pub struct CallContext {
    link: RelayLink,
    action: String,
    request_id: Option<String>,
}

impl CallContext {
    pub(crate) const fn new(link: RelayLink, action: String, request_id: Option<String>) -> Self {
        Self {
            link,
            action,
            request_id,
        }
    }

    /// The action this call was routed by.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Correlation token of the request, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// The connection link.
    #[must_use]
    pub const fn link(&self) -> &RelayLink {
        &self.link
    }

    /// Whether replies can currently be delivered.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Identifier assigned to this client by the relay.
    #[must_use]
    pub fn client_id(&self) -> Option<String> {
        self.link.client_id()
    }

    /// An empty `<action>-result` frame carrying this call's request id.
    #[must_use]
    pub fn result(&self) -> Frame {
        Frame::result(&self.action, self.request_id.clone())
    }

    /// Send a reply, filling in the request id if the frame has none.
    ///
    /// Returns whether the frame was queued.
    pub fn reply(&self, mut frame: Frame) -> bool {
        if frame.request_id.is_none() {
            frame.request_id.clone_from(&self.request_id);
        }
        self.send(frame)
    }

    /// Send a frame as is. Returns whether it was queued.
    pub fn send(&self, frame: Frame) -> bool {
        match self.link.send(frame) {
            Ok(()) => true,
            Err(e) => {
                debug!(action = %self.action, error = %e, "reply not delivered");
                false
            }
        }
    }
}
