//! HTTP server and graceful shutdown.
//!
//! The server stops accepting connections when either of two things happens:
//!
//! - the process receives **SIGTERM** (Kubernetes, `kill`) or **SIGINT** (Ctrl-C);
//! - the router's [`Shutdown`](crate::shutdown::Shutdown) channel fires because
//!   a request chain returned a shutdown-class error.
//!
//! It then asks every open connection to finish its in-flight request and
//! close, waits for them, and returns from [`Server::serve`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::{ErrorResponse, ServeError};
use crate::request::Request;
use crate::response::{IntoResponse, Json};
use crate::router::Router;

enum Binding {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server. Speaks HTTP/1.1 and HTTP/2, whichever the client picks.
pub struct Server {
    binding: Binding,
}

impl Server {
    /// Binds to `addr` when [`serve`](Server::serve) is called.
    ///
    /// ```rust,no_run
    /// use warden::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 3000));
    /// ```
    pub fn bind(addr: impl Into<SocketAddr>) -> Self {
        Self { binding: Binding::Addr(addr.into()) }
    }

    /// Serves on a listener that is already bound. Useful when the port is
    /// chosen by the OS.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { binding: Binding::Listener(listener) }
    }

    /// Accepts connections and dispatches them through `router` until a
    /// shutdown is requested, then drains.
    pub async fn serve(self, router: Router) -> Result<(), ServeError> {
        let listener = match self.binding {
            Binding::Addr(addr) => TcpListener::bind(addr).await?,
            Binding::Listener(listener) => listener,
        };
        let addr = listener.local_addr()?;

        let mut app_shutdown = router.shutdown().subscribe();
        let router = Arc::new(router);

        info!(%addr, "warden listening");

        // Tells open connections to finish their current request and close.
        let (drain_tx, drain_rx) = watch::channel(false);
        let mut tasks = tokio::task::JoinSet::new();

        let os_shutdown = os_signal();
        tokio::pin!(os_shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut os_shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                Some(reason) = app_shutdown.recv() => {
                    warn!(%reason, in_flight = tasks.len(), "application requested shutdown, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let mut drain = drain_rx.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req, remote_addr).await }
                        });

                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, svc);
                        tokio::pin!(conn);

                        let result = tokio::select! {
                            res = conn.as_mut() => res,
                            _ = drain.changed() => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };
                        if let Err(e) = result {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drain_tx.send_replace(true);
        while tasks.join_next().await.is_some() {}

        info!("warden stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads the body, routes the request and converts the answer for hyper.
/// Every failure is answered here, so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            let status = StatusCode::BAD_REQUEST;
            let envelope = ErrorResponse::new("unable to read request body");
            return Ok((status, Json(envelope)).into_response().into_inner());
        }
    };

    let response = router.route(Request::from_parts(parts, body, remote_addr)).await;
    Ok(response.into_inner())
}

// ── OS signals ────────────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT. A handler that cannot be installed
/// is logged and never fires.
async fn os_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
