//! Connection manager: the session loop behind [`RelayLink`].

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_proto::{CloseCode, ControlMessage, Frame};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::link::Shared;
use super::{
    Backoff, BackoffStep, ConnectionConfig, ConnectionEvent, ConnectionState, HeartbeatMonitor,
    RelayLink,
};
use crate::error::RelayError;
use crate::router::ActionRouter;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Owns the single relay connection.
///
/// `start()` spawns a session task that runs until `stop()` or until the
/// retry budget is spent. Inbound frames that are not connection control
/// go to the [`ActionRouter`].
pub struct ConnectionManager {
    shared: Arc<Shared>,
    router: Arc<ActionRouter>,
    config: Arc<ConnectionConfig>,
    session: Mutex<Option<Session>>,
}

struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Why a session ended.
enum SessionEnd {
    Cancelled,
    Lost(RelayError),
}

impl ConnectionManager {
    /// Create a manager. Nothing happens until [`start`](Self::start).
    #[must_use]
    pub fn new(config: ConnectionConfig, router: Arc<ActionRouter>) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            router,
            config: Arc::new(config),
            session: Mutex::new(None),
        }
    }

    /// Begin connecting. Returns `false` if a session is already running.
    ///
    /// This is also the only way out of [`ConnectionState::Failed`], and
    /// works as soon as [`ConnectionEvent::Failed`] is observed.
    pub fn start(&self) -> bool {
        let mut session = self.session.lock();
        // A worker that reached Failed may still be unwinding after
        // announcing it; that one does not block a restart.
        let running = session
            .as_ref()
            .is_some_and(|s| !s.task.is_finished() && self.state() != ConnectionState::Failed);
        if running {
            debug!("start ignored, session already running");
            return false;
        }
        if let Some(stale) = session.take() {
            stale.cancel.cancel();
            stale.task.abort();
        }

        let cancel = CancellationToken::new();
        let worker = Worker {
            shared: Arc::clone(&self.shared),
            router: Arc::clone(&self.router),
            config: Arc::clone(&self.config),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());
        *session = Some(Session { cancel, task });
        true
    }

    /// Close the socket, cancel every timer and settle in `Disconnected`.
    ///
    /// Handler tasks already dispatched keep running; their sends fail.
    pub async fn stop(&self) {
        let session = self.session.lock().take();
        if let Some(Session { cancel, task }) = session {
            cancel.cancel();
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(error = %e, "connection task panicked");
                }
            }
        }
        self.shared.clear_outbound();
        self.shared.force(ConnectionState::Disconnected, "stopped");
        self.shared.emit(ConnectionEvent::Stopped);
    }

    /// Handle for handlers and observers.
    #[must_use]
    pub fn link(&self) -> RelayLink {
        RelayLink::new(Arc::clone(&self.shared))
    }

    /// Subscribe to connection events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.subscribe()
    }

    /// Snapshot of the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether an authenticated socket is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Identifier assigned by the relay, if any.
    #[must_use]
    pub fn client_id(&self) -> Option<String> {
        self.shared.client_id()
    }

    /// Most recent connection failure.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error()
    }

    /// Settings this manager was built with.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct Worker {
    shared: Arc<Shared>,
    router: Arc<ActionRouter>,
    config: Arc<ConnectionConfig>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        let mut backoff = Backoff::new(self.config.reconnect.clone());
        self.transition(ConnectionState::Connecting, "start");

        loop {
            let err = match self.session(&mut backoff).await {
                SessionEnd::Cancelled => return,
                SessionEnd::Lost(err) => err,
            };

            self.shared.clear_outbound();
            let cause = err.to_string();
            self.shared.set_last_error(cause.clone());

            if let RelayError::AuthRejected(reason) = &err {
                error!(auth = true, reason = %reason, "relay rejected credential, check api_key");
                self.shared.emit(ConnectionEvent::AuthRejected {
                    reason: reason.clone(),
                });
            } else {
                warn!(error = %err, "relay connection lost");
            }
            self.transition(ConnectionState::Backoff, &cause);

            match backoff.fail() {
                BackoffStep::Retry { attempt, delay } => {
                    info!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "reconnecting"
                    );
                    self.shared
                        .emit(ConnectionEvent::Reconnecting { attempt, delay });
                    tokio::select! {
                        () = self.cancel.cancelled() => return,
                        () = tokio::time::sleep(delay) => {}
                    }
                    self.transition(ConnectionState::Connecting, "backoff elapsed");
                }
                BackoffStep::Exhausted { attempts } => {
                    self.transition(ConnectionState::Failed, "retry budget exhausted");
                    error!(
                        attempts,
                        last_error = %cause,
                        "giving up on relay connection, restart required"
                    );
                    self.shared.emit(ConnectionEvent::Failed {
                        attempts,
                        last_error: cause,
                    });
                    return;
                }
            }
        }
    }

    fn transition(&self, to: ConnectionState, cause: &str) {
        if let Err(e) = self.shared.transition(to, cause) {
            warn!(error = %e, "ignoring transition");
        }
    }

    /// One connect, authenticate and serve cycle.
    async fn session(&self, backoff: &mut Backoff) -> SessionEnd {
        let timeout = self.config.connect_timeout;
        let connect = tokio::select! {
            () = self.cancel.cancelled() => return SessionEnd::Cancelled,
            result = tokio::time::timeout(
                timeout,
                tokio_tungstenite::connect_async(self.config.url.as_str()),
            ) => result,
        };

        let ws = match connect {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                return SessionEnd::Lost(RelayError::Transport(format!("connect failed: {e}")));
            }
            Err(_) => {
                return SessionEnd::Lost(RelayError::Transport(format!(
                    "connect timed out after {timeout:?}"
                )));
            }
        };

        self.transition(ConnectionState::Authenticating, "socket open");
        let (mut write, mut read) = ws.split();

        let auth = tokio::select! {
            () = self.cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            result = tokio::time::timeout(timeout, self.authenticate(&mut write, &mut read)) => result,
        };

        let client_id = match auth {
            Ok(Ok(client_id)) => client_id,
            Ok(Err(e)) => return SessionEnd::Lost(e),
            Err(_) => {
                return SessionEnd::Lost(RelayError::Transport(format!(
                    "authentication timed out after {timeout:?}"
                )));
            }
        };

        backoff.reset();
        self.shared.set_client_id(client_id.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.install_outbound(tx);
        self.transition(ConnectionState::Connected, "authenticated");
        info!(client_id = %client_id, url = %self.config.url, "connected to relay");
        self.shared.emit(ConnectionEvent::Connected { client_id });

        self.serve(write, read, rx).await
    }

    async fn authenticate(
        &self,
        write: &mut WsSink,
        read: &mut WsSource,
    ) -> Result<String, RelayError> {
        let auth = ControlMessage::auth(self.config.auth_request()).to_json()?;
        write
            .send(Message::Text(auth.into()))
            .await
            .map_err(|e| RelayError::Transport(format!("failed to send auth: {e}")))?;

        while let Some(message) = read.next().await {
            let message =
                message.map_err(|e| RelayError::Transport(format!("read failed: {e}")))?;
            match message {
                Message::Text(text) => {
                    let frame = match Frame::parse(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "dropping malformed frame during auth");
                            continue;
                        }
                    };
                    match ControlMessage::from_frame(&frame) {
                        Ok(Some(ControlMessage::AuthSuccess { client_id })) => return Ok(client_id),
                        Ok(Some(ControlMessage::AuthFailure { error })) => {
                            let reason = if error.is_empty() {
                                "rejected by relay".to_string()
                            } else {
                                error
                            };
                            return Err(RelayError::AuthRejected(reason));
                        }
                        Ok(_) => debug!(frame_type = %frame.kind, "ignoring frame before auth"),
                        Err(e) => warn!(error = %e, "dropping malformed control frame"),
                    }
                }
                Message::Ping(payload) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| RelayError::Transport(format!("write failed: {e}")))?;
                }
                Message::Close(frame) => return Err(close_error(frame.as_ref(), true)),
                _ => {}
            }
        }

        Err(RelayError::Transport(
            "connection closed during authentication".to_string(),
        ))
    }

    async fn serve(
        &self,
        mut write: WsSink,
        mut read: WsSource,
        mut outbound: mpsc::UnboundedReceiver<Frame>,
    ) -> SessionEnd {
        let heartbeat = self.config.heartbeat;
        let mut monitor = HeartbeatMonitor::new(heartbeat);
        let mut ping = tokio::time::interval_at(Instant::now() + heartbeat.interval, heartbeat.interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let link = RelayLink::new(Arc::clone(&self.shared));

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let close = CloseFrame {
                        code: WsCloseCode::Normal,
                        reason: "client stopping".into(),
                    };
                    let _ = write.send(Message::Close(Some(close))).await;
                    return SessionEnd::Cancelled;
                }

                _ = ping.tick() => {
                    let probe = match ControlMessage::Ping.to_frame() {
                        Ok(frame) => frame,
                        Err(e) => return SessionEnd::Lost(e.into()),
                    };
                    if let Err(e) = write_frame(&mut write, &probe).await {
                        return SessionEnd::Lost(e);
                    }
                    debug!("heartbeat ping sent");
                }

                () = tokio::time::sleep_until(monitor.deadline()) => {
                    return SessionEnd::Lost(RelayError::HeartbeatTimeout(monitor.silence()));
                }

                Some(frame) = outbound.recv() => {
                    if let Err(e) = write_frame(&mut write, &frame).await {
                        return SessionEnd::Lost(e);
                    }
                }

                message = read.next() => {
                    let message = match message {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => {
                            return SessionEnd::Lost(RelayError::Transport(format!("read failed: {e}")));
                        }
                        None => {
                            return SessionEnd::Lost(RelayError::Transport(
                                "connection closed".to_string(),
                            ));
                        }
                    };
                    monitor.record_liveness();

                    match message {
                        Message::Text(text) => self.on_text(text.as_str(), &link),
                        Message::Ping(payload) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                return SessionEnd::Lost(RelayError::Transport(format!("write failed: {e}")));
                            }
                        }
                        Message::Close(frame) => {
                            return SessionEnd::Lost(close_error(frame.as_ref(), false));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Parse one inbound text frame and hand it to the router unless the
    /// connection layer consumes it.
    fn on_text(&self, text: &str, link: &RelayLink) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match frame.kind.as_str() {
            "pong" => debug!("heartbeat pong received"),
            "auth-success" | "auth-failure" => {
                debug!(frame_type = %frame.kind, "ignoring late auth frame");
            }
            _ => {
                // Detached; completion is not tracked here.
                let _ = self.router.dispatch(frame, link);
            }
        }
    }
}

async fn write_frame(write: &mut WsSink, frame: &Frame) -> Result<(), RelayError> {
    let json = match frame.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!(frame_type = %frame.kind, error = %e, "dropping unencodable frame");
            return Ok(());
        }
    };
    write
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| RelayError::Transport(format!("write failed: {e}")))
}

/// Classify a close frame. 4001/4002 while authenticating mean the relay
/// refused us.
fn close_error(frame: Option<&CloseFrame>, authenticating: bool) -> RelayError {
    let Some(frame) = frame else {
        return RelayError::Transport("closed by relay".to_string());
    };
    let code = CloseCode::from_u16(u16::from(frame.code));
    let reason = frame.reason.as_str();
    if authenticating && code.is_auth_rejection() {
        let reason = if reason.is_empty() {
            code.to_string()
        } else {
            format!("{reason} ({})", code.as_u16())
        };
        RelayError::AuthRejected(reason)
    } else {
        RelayError::Transport(format!("closed by relay: {code} {reason}").trim_end().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(code: u16, reason: &str) -> CloseFrame {
        CloseFrame {
            code: WsCloseCode::from(code),
            reason: reason.to_string().into(),
        }
    }

    #[test]
    fn test_close_no_auth_during_handshake_is_auth() {
        let err = close_error(Some(&close(4002, "")), true);
        assert!(err.is_auth());
    }

    #[test]
    fn test_close_no_client_id_during_handshake_is_auth() {
        let err = close_error(Some(&close(4001, "missing id")), true);
        assert!(matches!(err, RelayError::AuthRejected(ref r) if r.contains("missing id")));
    }

    #[test]
    fn test_close_no_auth_after_connect_is_transport() {
        let err = close_error(Some(&close(4002, "")), false);
        assert!(!err.is_auth());
    }

    #[test]
    fn test_close_shutdown_is_transport() {
        let err = close_error(Some(&close(4005, "restarting")), true);
        assert!(matches!(err, RelayError::Transport(ref m) if m.contains("restarting")));
    }

    #[test]
    fn test_close_without_frame() {
        let err = close_error(None, true);
        assert!(matches!(err, RelayError::Transport(_)));
    }

    #[tokio::test]
    async fn test_new_manager_is_disconnected() {
        let router = Arc::new(ActionRouter::new());
        let manager = ConnectionManager::new(ConnectionConfig::new("ws://127.0.0.1:1", "k"), router);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
        assert!(manager.client_id().is_none());
        assert!(!manager.link().is_connected());
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let router = Arc::new(ActionRouter::new());
        let manager = ConnectionManager::new(ConnectionConfig::new("ws://127.0.0.1:1", "k"), router);
        let mut events = manager.subscribe();
        manager.stop().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Stopped);
    }
}
