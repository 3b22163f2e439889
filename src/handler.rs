//! Handler trait and type erasure.
//!
//! # Two kinds of handler
//!
//! Business handlers are plain async functions:
//!
//! ```text
//! async fn name(ctx: RequestContext, req: Request) -> Result<impl IntoResponse, Error>
//! ```
//!
//! They receive a snapshot of the [`RequestContext`] by value. Middleware
//! layers need to write to the context (status, claims), so they implement
//! [`ErasedHandler`] directly and receive it by `&mut`.
//!
//! Both end up behind the same pointer type:
//!
//! ```text
//! async fn list_users(ctx, req) { … }            ← user writes this
//!        ↓ router.handle(.., list_users, ..)
//! Arc::new(FnHandler(list_users))                ← Handler blanket impl
//!        ↓ middleware::compose(layers, handler)
//! Arc<LoggerHandler { next: Arc<ErrorsHandler { next: … } }>>
//!        ↓ at request time
//! handler.call(&mut ctx, req)                    ← one vtable call per layer
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future borrowing for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every link in the chain produces.
pub type HandlerResult = Result<Response, Error>;

/// Object-safe dispatch interface shared by business handlers and middleware.
///
/// Middleware authors implement this for the handler their
/// [`Middleware::wrap`](crate::middleware::Middleware::wrap) returns.
pub trait ErasedHandler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, req: Request) -> BoxFuture<'a, HandlerResult>;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid business handler.
///
/// Automatically satisfied for any function or closure with the signature:
///
/// ```text
/// Fn(RequestContext, Request) -> impl Future<Output = Result<impl IntoResponse, Error>>
/// ```
///
/// The trait is sealed; only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a typed business handler into the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, req: Request) -> BoxFuture<'a, HandlerResult> {
        let fut = (self.0)(ctx.clone(), req);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    }
}
