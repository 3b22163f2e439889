//! Route table and per-request dispatch.
//!
//! One radix tree per HTTP method. Every registered handler is wrapped once,
//! at registration, in `global(extra(handler))`; the request path then costs a
//! tree lookup plus one vtable call per layer.
//!
//! ```text
//! Request ──▶ lookup(method, path) ──▶ RequestContext::new() ──▶ chain.call(&mut ctx, req)
//!                                                                      │
//!                        Ok(resp) ◀───────────────────────────────────┤
//!  Err(shutdown-class) ──▶ Shutdown::signal ──▶ 500 envelope ◀─────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http::header::HeaderName;
use http::{HeaderValue, Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::error;

use crate::context::{self, RequestContext};
use crate::error::ErrorResponse;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{self, Layer, Middleware};
use crate::request::Request;
use crate::response::{IntoResponse, Json, Response};
use crate::shutdown::{self, Shutdown};

/// Response header echoing the request's trace id.
pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

/// The application router.
///
/// Build it once at startup and hand it to [`Server::serve`](crate::Server::serve).
/// Global middleware applies to routes registered *after* it is installed, so
/// set the stack first:
///
/// ```rust,no_run
/// use warden::middleware::{self, Metrics};
/// use warden::{Error, Method, Request, RequestContext, Router};
///
/// async fn list_users(_ctx: RequestContext, _req: Request) -> Result<&'static str, Error> {
///     Ok("[]")
/// }
///
/// let router = Router::new()
///     .with_stack(middleware::standard(Metrics::new()))
///     .handle(Method::GET, "v1", "/users/{page}/{rows}", list_users, []);
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    global: Vec<Layer>,
    shutdown: Shutdown,
    request_timeout: Option<Duration>,
}

impl Router {
    /// An empty router with its own shutdown channel. Subscribe through
    /// [`shutdown`](Router::shutdown).
    pub fn new() -> Self {
        let (shutdown, _) = shutdown::channel();
        Self { routes: HashMap::new(), global: Vec::new(), shutdown, request_timeout: None }
    }

    /// Uses an externally owned shutdown channel instead of the router's own.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Appends one global layer.
    pub fn with_middleware(mut self, layer: impl Middleware) -> Self {
        self.global.push(layer.into_layer());
        self
    }

    /// Appends a list of global layers, first outermost.
    pub fn with_stack(mut self, layers: impl IntoIterator<Item = Layer>) -> Self {
        self.global.extend(layers);
        self
    }

    /// Cancels every request still running after `timeout`.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Registers `handler` for `method` at `/{group}{path}`, wrapped as
    /// `global(extra(handler))`. An empty `group` registers `path` as is.
    ///
    /// Path parameters use `{name}` syntax and reach the handler through
    /// [`Request::param`].
    ///
    /// # Panics
    ///
    /// Panics if the path is not a valid route or conflicts with one already
    /// registered for the same method.
    pub fn handle(
        mut self,
        method: Method,
        group: &str,
        path: &str,
        handler: impl Handler,
        extra: impl IntoIterator<Item = Layer>,
    ) -> Self {
        let extra: Vec<Layer> = extra.into_iter().collect();
        let chain = middleware::compose(&self.global, middleware::compose(&extra, handler.into_boxed_handler()));

        let full_path = if group.is_empty() { path.to_owned() } else { format!("/{group}{path}") };
        self.routes
            .entry(method)
            .or_default()
            .insert(full_path.as_str(), chain)
            .unwrap_or_else(|e| panic!("invalid route `{full_path}`: {e}"));
        self
    }

    /// Registers `handler` at `path` with only the global layers.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.handle(method, "", path, handler, [])
    }

    /// The channel fired when a shutdown-class error escapes a chain.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        Some((handler, params))
    }

    /// Runs one request through its chain and produces its response.
    ///
    /// Anything the chain returns as an error at this point is shutdown-class
    /// (the Errors layer absorbs everything else): the shutdown channel fires
    /// and the client gets the generic 500 envelope.
    pub async fn route(&self, req: Request) -> Response {
        let (_guard, cancellation) = context::cancellation(self.request_timeout);
        let mut ctx = RequestContext::new().with_cancellation(cancellation);

        let mut resp = match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => match handler.call(&mut ctx, req.with_params(params)).await {
                Ok(resp) => resp,
                Err(err) => {
                    error!(trace_id = %ctx.trace_id(), error = %err, "request chain returned an error, shutting down");
                    self.shutdown.signal(err.to_string());
                    let (status, body) = middleware::classify(&err);
                    (status, Json(body)).into_response()
                }
            },
            None => {
                let status = StatusCode::NOT_FOUND;
                (status, Json(ErrorResponse::new(status.canonical_reason().unwrap_or("Not Found")))).into_response()
            }
        };

        if let Ok(value) = HeaderValue::from_str(ctx.trace_id()) {
            resp.headers_mut().insert(TRACE_ID_HEADER, value);
        }
        resp
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::Error;
    use crate::handler::{BoxFuture, ErasedHandler, HandlerResult};
    use crate::middleware::{Errors, Logger, Metrics, Panics};

    async fn echo_params(_ctx: RequestContext, req: Request) -> Result<String, Error> {
        Ok(format!("{}/{}", req.param("page").unwrap_or("-"), req.param("rows").unwrap_or("-")))
    }

    async fn integrity(_ctx: RequestContext, _req: Request) -> Result<Response, Error> {
        Err(Error::shutdown("ledger checksum mismatch"))
    }

    async fn sleepy(_ctx: RequestContext, _req: Request) -> Result<Response, Error> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Response::status(StatusCode::OK))
    }

    fn body(resp: &Response) -> serde_json::Value {
        serde_json::from_slice(resp.body()).unwrap()
    }

    #[tokio::test]
    async fn group_prefixes_path_and_params_reach_handler() {
        let router = Router::new().handle(Method::GET, "v1", "/users/{page}/{rows}", echo_params, []);

        let resp = router.route(Request::new(Method::GET, "/v1/users/2/25")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"2/25");

        let resp = router.route(Request::new(Method::GET, "/users/2/25")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_routes_get_json_404() {
        let router = Router::new().on(Method::GET, "/healthz", echo_params);

        let resp = router.route(Request::new(Method::POST, "/healthz")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(body(&resp), serde_json::json!({ "error": "Not Found" }));
        assert!(resp.headers().contains_key(TRACE_ID_HEADER));
    }

    #[tokio::test]
    async fn every_response_carries_a_distinct_trace_id() {
        let router = Router::new().on(Method::GET, "/", echo_params);
        let a = router.route(Request::new(Method::GET, "/")).await;
        let b = router.route(Request::new(Method::GET, "/")).await;
        assert_ne!(a.headers()[TRACE_ID_HEADER], b.headers()[TRACE_ID_HEADER]);
    }

    #[tokio::test]
    async fn shutdown_errors_fire_the_channel_once() {
        let router = Router::new()
            .with_stack(middleware::standard(Metrics::new()))
            .on(Method::POST, "/ledger", integrity);
        let mut listener = router.shutdown().subscribe();

        let resp = router.route(Request::new(Method::POST, "/ledger")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&resp), serde_json::json!({ "error": "Internal Server Error" }));

        let reason = listener.recv().await.unwrap();
        assert!(reason.contains("ledger checksum mismatch"));

        // A second offender does not re-fire.
        router.route(Request::new(Method::POST, "/ledger")).await;
        assert!(!router.shutdown().signal("again"));
    }

    #[tokio::test]
    async fn absorbed_errors_do_not_shut_down() {
        let router = Router::new()
            .with_middleware(Logger)
            .with_middleware(Errors)
            .with_middleware(Panics)
            .on(Method::GET, "/boom", |_: RequestContext, _: Request| async {
                if true {
                    panic!("boom");
                }
                Ok::<_, Error>(StatusCode::OK)
            });

        let resp = router.route(Request::new(Method::GET, "/boom")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!router.shutdown().is_signalled());
    }

    #[tokio::test(start_paused = true)]
    async fn request_timeout_cancels_slow_handlers() {
        let router = Router::new()
            .with_stack(middleware::standard(Metrics::new()))
            .request_timeout(Duration::from_secs(1))
            .on(Method::GET, "/slow", sleepy);

        let resp = router.route(Request::new(Method::GET, "/slow")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!router.shutdown().is_signalled());
    }

    struct Tag {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    struct TagHandler {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
        next: BoxedHandler,
    }

    impl Middleware for Tag {
        fn name(&self) -> &'static str {
            self.name
        }

        fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
            Arc::new(TagHandler { name: self.name, seen: self.seen.clone(), next })
        }
    }

    impl ErasedHandler for TagHandler {
        fn call<'a>(&'a self, ctx: &'a mut RequestContext, req: Request) -> BoxFuture<'a, HandlerResult> {
            self.seen.lock().unwrap().push(self.name);
            self.next.call(ctx, req)
        }
    }

    #[tokio::test]
    async fn global_layers_wrap_route_layers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tag = |name| Tag { name, seen: seen.clone() };

        let router = Router::new()
            .with_middleware(tag("global-1"))
            .with_middleware(tag("global-2"))
            .handle(
                Method::GET,
                "",
                "/",
                echo_params,
                [tag("extra-1").into_layer(), tag("extra-2").into_layer()],
            );

        router.route(Request::new(Method::GET, "/")).await;
        assert_eq!(*seen.lock().unwrap(), ["global-1", "global-2", "extra-1", "extra-2"]);
    }
}
