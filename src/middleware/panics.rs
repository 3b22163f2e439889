use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use super::Middleware;
use crate::context::{Canceled, RequestContext};
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, HandlerResult};
use crate::request::Request;

/// Fault boundary around the rest of the chain.
///
/// A panic below this layer is caught and returned as an untrusted
/// [`PanicError`], so the worker keeps serving. A request that is cancelled or
/// runs past its deadline stops here with an untrusted [`Canceled`].
///
/// Faults in layers outside this one (logging, metrics) are not caught.
#[derive(Clone, Copy, Debug, Default)]
pub struct Panics;

impl Middleware for Panics {
    fn name(&self) -> &'static str {
        "panics"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(PanicsHandler { next })
    }
}

struct PanicsHandler {
    next: BoxedHandler,
}

impl ErasedHandler for PanicsHandler {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, req: Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let cancellation = ctx.cancellation().clone();
            // The call itself runs inside the guard so a panic raised before the
            // inner future exists is caught too.
            let guarded = AssertUnwindSafe(async move { self.next.call(ctx, req).await }).catch_unwind();

            tokio::select! {
                biased;
                outcome = guarded => match outcome {
                    Ok(result) => result,
                    Err(payload) => Err(Error::untrusted(PanicError::new(payload))),
                },
                () = cancellation.cancelled() => Err(Error::untrusted(Canceled)),
            }
        })
    }
}

/// A panic recovered from a handler.
#[derive(Debug)]
pub struct PanicError {
    message: String,
    backtrace: Backtrace,
}

impl PanicError {
    fn new(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast_ref::<&'static str>() {
                Some(s) => (*s).to_owned(),
                None => "non-string panic payload".to_owned(),
            },
        };
        Self { message, backtrace: Backtrace::force_capture() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Captured where the panic was recovered.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PANIC [{}] TRACE [{}]", self.message, self.backtrace)
    }
}

impl std::error::Error for PanicError {}
