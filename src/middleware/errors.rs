use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use super::Middleware;
use crate::context::RequestContext;
use crate::error::{Error, ErrorResponse};
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, HandlerResult};
use crate::request::Request;
use crate::response::{IntoResponse, Json};

const DATA_VALIDATION: &str = "data validation error";

/// Turns every error from the inner chain into a JSON error response.
///
/// | Error | Status | Body |
/// |---|---|---|
/// | `Validation` | 400 | `data validation error` + field list |
/// | `Trusted` | as given | the trusted message |
/// | `Untrusted` | 500 | `Internal Server Error` |
/// | `Shutdown` | 500 | `Internal Server Error`, and the error is re-returned |
///
/// Everything except a shutdown-class error is absorbed here: the request
/// counts as handled. A shutdown-class error is returned unchanged so the
/// [`Router`](crate::Router) can signal the process to drain.
#[derive(Clone, Copy, Debug, Default)]
pub struct Errors;

impl Middleware for Errors {
    fn name(&self) -> &'static str {
        "errors"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(ErrorsHandler { next })
    }
}

struct ErrorsHandler {
    next: BoxedHandler,
}

impl ErasedHandler for ErrorsHandler {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, req: Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let err = match self.next.call(ctx, req).await {
                Ok(resp) => {
                    ctx.set_status(resp.status_code());
                    return Ok(resp);
                }
                Err(err) => err,
            };

            error!(trace_id = %ctx.trace_id(), error = %err, "request failed");

            let (status, body) = classify(&err);
            ctx.set_status(status);

            if err.is_shutdown() {
                return Err(err);
            }
            Ok((status, Json(body)).into_response())
        })
    }
}

/// Maps an error to the status and body the client sees.
///
/// Untrusted text never leaves this function.
pub fn classify(err: &Error) -> (StatusCode, ErrorResponse) {
    match err {
        Error::Validation(fields) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse {
                error: DATA_VALIDATION.to_owned(),
                field: serde_json::to_string(fields).ok(),
            },
        ),
        Error::Trusted { message, status } => (*status, ErrorResponse::new(message.clone())),
        Error::Untrusted(_) | Error::Shutdown { .. } => internal(),
    }
}

fn internal() -> (StatusCode, ErrorResponse) {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    (status, ErrorResponse::new(status.canonical_reason().unwrap_or("Internal Server Error")))
}
