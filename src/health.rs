//! Built-in health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/v1/liveness` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/v1/readiness` | Can it serve traffic? Failure → pulled from the load balancer. |
//!
//! Both answer `{"status": "ok", "build": "<build>"}` and are registered
//! without auth layers:
//!
//! ```rust,no_run
//! use warden::{Method, Router, health};
//!
//! let router = Router::new()
//!     .handle(Method::GET, "v1", "/liveness", health::liveness("1.4.2"), [])
//!     .handle(Method::GET, "v1", "/readiness", health::readiness("1.4.2"), []);
//! ```
//!
//! A service that must gate readiness on a dependency registers its own
//! handler instead.

use serde::Serialize;

use crate::context::RequestContext;
use crate::error::Error;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::Json;

#[derive(Clone, Debug, Serialize)]
struct Status {
    status: &'static str,
    build: String,
}

/// Liveness probe. Has no dependencies: if the process can answer, it is alive.
pub fn liveness(build: &str) -> impl Handler + use<> {
    probe(build.to_owned())
}

/// Readiness probe.
pub fn readiness(build: &str) -> impl Handler + use<> {
    probe(build.to_owned())
}

fn probe(build: String) -> impl Handler {
    move |_: RequestContext, _: Request| {
        let body = Status { status: "ok", build: build.clone() };
        async move { Ok::<_, Error>(Json(body)) }
    }
}
