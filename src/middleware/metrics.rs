use std::fmt;
use std::sync::Arc;

use metrics::{Counter, counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;

use super::Middleware;
use crate::context::RequestContext;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, HandlerResult};
use crate::request::Request;
use crate::response::{Json, Response};

const REQUESTS_TOTAL: &str = "requests_total";
const ERRORS_TOTAL: &str = "errors_total";
const PANICS_TOTAL: &str = "panics_total";

/// Request counters kept in a Prometheus recorder.
///
/// Each `Metrics` owns its recorder instead of installing a global one, so
/// several routers can live in one process. Clones share the same counters:
/// one clone sits in the middleware stack while another backs the handlers
/// that report it.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

struct Inner {
    handle: PrometheusHandle,
    requests: Counter,
    errors: Counter,
    panics: Counter,
}

/// A point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub panics: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Metrics").field(&self.snapshot()).finish()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let (requests, errors, panics) = metrics::with_local_recorder(&recorder, || {
            describe_counter!(REQUESTS_TOTAL, "Requests that went through the chain");
            describe_counter!(ERRORS_TOTAL, "Requests that ended in an error");
            describe_counter!(PANICS_TOTAL, "Handler panics recovered by the fault boundary");
            (counter!(REQUESTS_TOTAL), counter!(ERRORS_TOTAL), counter!(PANICS_TOTAL))
        });

        Self { inner: Arc::new(Inner { handle, requests, errors, panics }) }
    }

    /// The counters in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.inner.handle.render()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let rendered = self.render();
        let read = |name: &str| {
            rendered
                .lines()
                .filter_map(|line| line.split_once(' '))
                .find(|(metric, _)| *metric == name)
                .and_then(|(_, value)| value.trim().parse::<u64>().ok())
                .unwrap_or(0)
        };
        MetricsSnapshot { requests: read(REQUESTS_TOTAL), errors: read(ERRORS_TOTAL), panics: read(PANICS_TOTAL) }
    }

    /// A handler that answers with the current snapshot as JSON.
    pub fn handler(&self) -> impl Handler + use<> {
        let metrics = self.clone();
        move |_: RequestContext, _: Request| {
            let snapshot = metrics.snapshot();
            async move { Ok::<_, Error>(Json(snapshot)) }
        }
    }

    /// A handler that answers with [`render`](Self::render), for scrapers.
    pub fn prometheus(&self) -> impl Handler + use<> {
        let metrics = self.clone();
        move |_: RequestContext, _: Request| {
            let body = metrics.render();
            async move { Ok::<_, Error>(Response::text(body)) }
        }
    }

    fn record(&self, result: &HandlerResult) {
        self.inner.requests.increment(1);
        if let Err(err) = result {
            self.inner.errors.increment(1);
            if err.is_panic() {
                self.inner.panics.increment(1);
            }
        }
    }
}

impl Middleware for Metrics {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(MetricsHandler { metrics: self.clone(), next })
    }
}

struct MetricsHandler {
    metrics: Metrics,
    next: BoxedHandler,
}

impl ErasedHandler for MetricsHandler {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, req: Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let result = self.next.call(ctx, req).await;
            self.metrics.record(&result);
            result
        })
    }
}
