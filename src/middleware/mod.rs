//! Middleware layer.
//!
//! A middleware turns one handler into another. Applying `[m1, m2, …, mn]`
//! around a handler `h` yields `m1(m2(…mn(h)))`: `m1` runs first on the way in
//! and last on the way out.
//!
//! Each layer may read or write the [`RequestContext`](crate::RequestContext),
//! fail with an [`Error`](crate::Error) without calling the next layer, or call
//! through and observe the result.
//!
//! # Order
//!
//! The global order is fixed and [`standard`] builds it:
//!
//! ```text
//! Logger → Errors → Metrics → Panics → [route layers: Authenticate → Authorize] → handler
//! ```
//!
//! - `Logger` is outermost so the latency it reports includes error handling.
//! - `Errors` sits directly inside `Logger` so the status is final before the
//!   completion line is written.
//! - `Panics` sits inside `Errors` so a recovered panic is classified like any
//!   other failure. It only guards what runs inside it.
//! - `Authenticate` must precede `Authorize`.

mod auth;
mod errors;
mod logger;
mod metrics;
mod panics;

use std::sync::Arc;

use crate::handler::BoxedHandler;

pub use auth::{Authenticate, Authorize};
pub use errors::{Errors, classify};
pub use logger::Logger;
pub use self::metrics::{Metrics, MetricsSnapshot};
pub use panics::{PanicError, Panics};

/// A handler-to-handler transformation.
pub trait Middleware: Send + Sync + 'static {
    /// Short name for logs and debugging.
    fn name(&self) -> &'static str;

    /// Returns a handler that runs this layer around `next`.
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;

    fn into_layer(self) -> Layer
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

/// A shared middleware, as stored by the [`Router`](crate::Router).
pub type Layer = Arc<dyn Middleware>;

/// Wraps `handler` in `layers`, first layer outermost.
pub fn compose(layers: &[Layer], handler: BoxedHandler) -> BoxedHandler {
    layers.iter().rev().fold(handler, |next, layer| layer.wrap(next))
}

/// The global stack every route runs inside, in its required order.
pub fn standard(metrics: Metrics) -> Vec<Layer> {
    vec![
        Logger.into_layer(),
        Errors.into_layer(),
        metrics.into_layer(),
        Panics.into_layer(),
    ]
}
