//! Action router.
//!
//! Maps a frame's `type` to the handler registered under that name and
//! runs it as a detached task. Handler failures are contained here: an
//! `Err` or a panic is logged, and if the request had a `requestId` the
//! caller gets a `{type: "<action>-result", success: false, error}` reply.
//!
//! Routes are registered before the router is shared; dispatch only reads
//! the table.

mod context;
mod handler;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use relay_proto::Frame;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use context::CallContext;
pub use handler::{Handler, HandlerError, HandlerFuture, HandlerResult};

use crate::connection::RelayLink;
use handler::{FnHandler, TypedHandler};

/// Outcome of registering a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The action was new.
    Inserted,
    /// A previous handler for the action was replaced.
    Replaced,
}

/// A named bundle of routes contributed by one domain module.
pub struct RouteSet {
    name: String,
    routes: Vec<(String, Arc<dyn Handler>)>,
}

impl RouteSet {
    /// Start an empty set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: Vec::new(),
        }
    }

    /// Add a handler over the raw frame body.
    #[must_use]
    pub fn route<F, Fut>(mut self, action: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Arc<dyn Handler> = Arc::new(FnHandler(f));
        self.routes.push((action.into(), handler));
        self
    }

    /// Add a handler whose body is decoded into `T` first.
    #[must_use]
    pub fn route_typed<T, F, Fut>(mut self, action: impl Into<String>, f: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Arc<dyn Handler> = Arc::new(TypedHandler::new(f));
        self.routes.push((action.into(), handler));
        self
    }

    /// Set name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Actions in this set, in registration order.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(action, _)| action.as_str())
    }
}

impl std::fmt::Debug for RouteSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSet")
            .field("name", &self.name)
            .field("actions", &self.actions().collect::<Vec<_>>())
            .finish()
    }
}

/// Name-keyed handler registry and dispatcher.
#[derive(Default)]
pub struct ActionRouter {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl ActionRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `action`.
    ///
    /// A second registration for the same action replaces the first and
    /// is logged at `warn`.
    pub fn register(&mut self, action: impl Into<String>, handler: Arc<dyn Handler>) -> Registration {
        let action = action.into();
        if self.routes.insert(action.clone(), handler).is_some() {
            warn!(action = %action, "handler replaced by duplicate registration");
            Registration::Replaced
        } else {
            debug!(action = %action, "handler registered");
            Registration::Inserted
        }
    }

    /// Register a handler over the raw frame body.
    pub fn route<F, Fut>(&mut self, action: impl Into<String>, f: F) -> Registration
    where
        F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(action, Arc::new(FnHandler(f)))
    }

    /// Register a handler whose body is decoded into `T` first.
    ///
    /// A body that does not decode produces the failure reply without
    /// calling `f`.
    pub fn route_typed<T, F, Fut>(&mut self, action: impl Into<String>, f: F) -> Registration
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(action, Arc::new(TypedHandler::new(f)))
    }

    /// Register every route of a set. Returns the actions that replaced an
    /// existing handler.
    pub fn mount(&mut self, set: RouteSet) -> Vec<String> {
        let RouteSet { name, routes } = set;
        let count = routes.len();
        let mut replaced = Vec::new();
        for (action, handler) in routes {
            if self.register(action.clone(), handler) == Registration::Replaced {
                replaced.push(action);
            }
        }
        info!(set = %name, routes = count, "route set mounted");
        replaced
    }

    /// Whether a handler exists for `action`.
    #[must_use]
    pub fn contains(&self, action: &str) -> bool {
        self.routes.contains_key(action)
    }

    /// Registered actions, sorted.
    #[must_use]
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<_> = self.routes.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }

    /// Number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no actions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route one inbound frame.
    ///
    /// Unknown actions are logged and dropped without a reply and `None` is
    /// returned. Otherwise the handler runs on its own task and the task's
    /// handle is returned; callers that don't need completion drop it.
    pub fn dispatch(&self, frame: Frame, link: &RelayLink) -> Option<JoinHandle<()>> {
        let Some(handler) = self.routes.get(frame.kind.as_str()) else {
            warn!(action = %frame.kind, "no handler registered, dropping frame");
            return None;
        };
        let handler = Arc::clone(handler);

        let Frame {
            kind: action,
            request_id,
            body,
        } = frame;
        debug!(action = %action, request_id = ?request_id, "dispatching");

        let ctx = CallContext::new(link.clone(), action.clone(), request_id.clone());
        let link = link.clone();

        Some(tokio::spawn(async move {
            let call = async move { handler.call(Value::Object(body), ctx).await };
            let error = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            error!(action = %action, request_id = ?request_id, error = %error, "handler failed");
            if let Some(request_id) = request_id {
                let reply = Frame::failure(&action, Some(request_id), error);
                if let Err(e) = link.send(reply) {
                    debug!(action = %action, error = %e, "failure reply not delivered");
                }
            }
        }))
    }
}

impl std::fmt::Debug for ActionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRouter")
            .field("actions", &self.actions())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("handler panicked: {detail}")
}
