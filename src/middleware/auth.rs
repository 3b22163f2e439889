use std::sync::Arc;

use http::StatusCode;
use http::header::AUTHORIZATION;
use tracing::debug;

use super::Middleware;
use crate::auth::{AuthError, AuthHandle};
use crate::context::{Canceled, RequestContext};
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, HandlerResult};
use crate::request::Request;

const BEARER_FORMAT: &str = "expected authorization header format: Bearer <token>";

// ── Authenticate ──────────────────────────────────────────────────────────────

/// Requires `Authorization: Bearer <token>` and stores the validated
/// [`Claims`](crate::auth::Claims) in the request context.
///
/// Reads the current authenticator from the [`AuthHandle`] on every request,
/// so a rotation applies to the next request without rebuilding routes.
#[derive(Clone, Debug)]
pub struct Authenticate {
    auth: Arc<AuthHandle>,
}

impl Authenticate {
    pub fn new(auth: Arc<AuthHandle>) -> Self {
        Self { auth }
    }
}

impl Middleware for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(AuthenticateHandler { auth: self.auth.clone(), next })
    }
}

struct AuthenticateHandler {
    auth: Arc<AuthHandle>,
    next: BoxedHandler,
}

impl ErasedHandler for AuthenticateHandler {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, req: Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let token = bearer_token(&req)?;

            let auth = self.auth.current();
            let cancellation = ctx.cancellation().clone();
            let claims = tokio::select! {
                validated = auth.validate_token(token) => validated.map_err(reject)?,
                () = cancellation.cancelled() => return Err(Error::untrusted(Canceled)),
            };

            debug!(trace_id = %ctx.trace_id(), subject = %claims.subject, "authenticated");
            ctx.set_claims(claims);
            self.next.call(ctx, req).await
        })
    }
}

/// Extracts the token from `Bearer <token>`. The scheme is case-insensitive.
fn bearer_token(req: &Request) -> Result<&str, Error> {
    let header = req.header(AUTHORIZATION).unwrap_or_default();
    let parts: Vec<&str> = header.split(' ').collect();
    match parts.as_slice() {
        [scheme, token] if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => Ok(*token),
        _ => Err(Error::trusted(StatusCode::UNAUTHORIZED, BEARER_FORMAT)),
    }
}

fn reject(err: AuthError) -> Error {
    if err.is_internal() {
        Error::untrusted(err)
    } else {
        Error::trusted(StatusCode::UNAUTHORIZED, err.to_string())
    }
}

// ── Authorize ─────────────────────────────────────────────────────────────────

/// Lets the request through only if its claims hold at least one of the
/// required roles. Must run inside [`Authenticate`].
///
/// An empty role list admits nobody.
#[derive(Clone, Debug)]
pub struct Authorize {
    roles: Arc<[String]>,
}

impl Authorize {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { roles: roles.into_iter().map(Into::into).collect() }
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}

impl Middleware for Authorize {
    fn name(&self) -> &'static str {
        "authorize"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(AuthorizeHandler { roles: self.roles.clone(), next })
    }
}

struct AuthorizeHandler {
    roles: Arc<[String]>,
    next: BoxedHandler,
}

impl ErasedHandler for AuthorizeHandler {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, req: Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let Some(claims) = ctx.claims() else {
                return Err(Error::trusted(
                    StatusCode::FORBIDDEN,
                    "you are not authorized for that action, no claims",
                ));
            };

            if !claims.authorized(&self.roles[..]) {
                return Err(Error::trusted(
                    StatusCode::FORBIDDEN,
                    format!(
                        "you are not authorized for that action, claims[{:?}] roles[{:?}]",
                        claims.roles, self.roles
                    ),
                ));
            }

            self.next.call(ctx, req).await
        })
    }
}
