//! The handler contract.

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::CallContext;

/// Error returned by a handler. Its message becomes the failure reply.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a handler.
pub type HandlerResult = Result<(), HandlerError>;

/// Boxed future returned by [`Handler::call`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// One action's implementation.
///
/// Handlers reply through the [`CallContext`]; the return value only
/// reports failure. An `Err` (or a panic) is turned into the generic
/// `<action>-result` failure reply when the request carried a `requestId`.
pub trait Handler: Send + Sync + 'static {
    /// Run the handler on a frame body.
    fn call(&self, data: Value, ctx: CallContext) -> HandlerFuture;
}

/// Adapter from a plain async closure over the raw body.
pub(crate) struct FnHandler<F>(pub(crate) F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, data: Value, ctx: CallContext) -> HandlerFuture {
        Box::pin((self.0)(data, ctx))
    }
}

/// Adapter that decodes the body into `T` before calling the closure.
pub(crate) struct TypedHandler<T, F> {
    f: F,
    _payload: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> TypedHandler<T, F> {
    pub(crate) const fn new(f: F) -> Self {
        Self {
            f,
            _payload: std::marker::PhantomData,
        }
    }
}

impl<T, F, Fut> Handler for TypedHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, data: Value, ctx: CallContext) -> HandlerFuture {
        match serde_json::from_value::<T>(data) {
            Ok(payload) => Box::pin((self.f)(payload, ctx)),
            Err(e) => {
                let message = format!("invalid {} payload: {e}", ctx.action());
                Box::pin(async move { Err(message.into()) })
            }
        }
    }
}
