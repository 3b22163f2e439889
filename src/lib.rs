//! # warden
//!
//! The request-lifecycle core of a small HTTP service: a fixed middleware
//! pipeline, RS256 token authentication with key rotation, and an error
//! classifier that can ask the process to shut down.
//!
//! ## Request lifecycle
//!
//! ```text
//! Router ─ RequestContext::new ─▶ Logger ─▶ Errors ─▶ Metrics ─▶ Panics ─▶ Authenticate ─▶ Authorize ─▶ handler
//!                                                                                                        │
//! Router ◀── shutdown-class error? fire Shutdown ◀── Logger ◀── Errors classifies ◀──────── Result ◀─────┘
//! ```
//!
//! - Handlers return `Result<impl IntoResponse, Error>`; only the
//!   [`Errors`](middleware::Errors) layer turns an error into a response.
//! - [`Error::Untrusted`] text is logged but never sent to the client.
//! - A panic below [`Panics`](middleware::Panics) becomes an untrusted error
//!   and the worker keeps serving.
//! - [`Error::Shutdown`] is answered with a 500 and then fires the router's
//!   [`Shutdown`](shutdown::Shutdown) channel, which makes [`Server::serve`]
//!   drain and return.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use warden::auth::{AuthHandle, Authenticator, KeyStore, ROLE_ADMIN};
//! use warden::middleware::{self, Authenticate, Authorize, Metrics, Middleware};
//! use warden::{Error, Json, Method, Request, RequestContext, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keys = Arc::new(KeyStore::from_dir("fixtures/keys")?);
//!     let auth = Arc::new(AuthHandle::new(Authenticator::new("54bb2165-71e1-41a6-af3e-7da4a0e1e2c1", keys).await?));
//!
//!     let router = Router::new()
//!         .with_stack(middleware::standard(Metrics::new()))
//!         .handle(
//!             Method::GET,
//!             "v1",
//!             "/users/{page}/{rows}",
//!             list_users,
//!             [Authenticate::new(auth).into_layer(), Authorize::new([ROLE_ADMIN]).into_layer()],
//!         );
//!
//!     Server::bind(([0, 0, 0, 0], 3000)).serve(router).await?;
//!     Ok(())
//! }
//!
//! async fn list_users(ctx: RequestContext, req: Request) -> Result<Json<Vec<String>>, Error> {
//!     let page = req.param("page").unwrap_or("1");
//!     let subject = ctx.claims().map(|c| c.subject.clone()).unwrap_or_default();
//!     Ok(Json(vec![format!("page {page} for {subject}")]))
//! }
//! ```

mod context;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod auth;
pub mod config;
pub mod health;
pub mod middleware;
pub mod shutdown;

#[cfg(test)]
mod testing;

pub use context::{CancelGuard, Canceled, Cancellation, RequestContext, cancellation};
pub use error::{BoxError, Error, ErrorResponse, FieldError, FieldErrors, ServeError};
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, HandlerResult};
pub use http::{Method, StatusCode};
pub use request::Request;
pub use response::{IntoResponse, Json, Response};
pub use router::{Router, TRACE_ID_HEADER};
pub use server::Server;
