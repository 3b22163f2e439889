use std::sync::Arc;

use tracing::info;

use super::Middleware;
use crate::context::RequestContext;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, HandlerResult};
use crate::request::Request;

/// Logs a start and a completion line for every request, whatever the
/// outcome.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Middleware for Logger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(LoggerHandler { next })
    }
}

struct LoggerHandler {
    next: BoxedHandler,
}

impl ErasedHandler for LoggerHandler {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, req: Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.path().to_owned();
            let remote_addr = req.remote_addr().map(|a| a.to_string()).unwrap_or_default();

            info!(
                trace_id = %ctx.trace_id(),
                method = %method,
                path = %path,
                remote_addr = %remote_addr,
                "request started"
            );

            let result = self.next.call(ctx, req).await;

            // Without an Errors layer inside us the status may still be unset.
            let status = ctx
                .status()
                .or_else(|| result.as_ref().ok().map(|r| r.status_code()))
                .map_or(0, |s| s.as_u16());

            info!(
                trace_id = %ctx.trace_id(),
                method = %method,
                path = %path,
                remote_addr = %remote_addr,
                status,
                elapsed_ms = ctx.elapsed().as_millis() as u64,
                "request completed"
            );

            result
        })
    }
}
