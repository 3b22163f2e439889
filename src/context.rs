//! Per-request state threaded through the middleware chain.
//!
//! A [`RequestContext`] is created by the [`Router`](crate::Router) for every
//! request, handed by `&mut` to each middleware layer, and dropped when the
//! response is sent. It is never shared between requests.

use std::time::{Duration, Instant};

use http::StatusCode;
use tokio::sync::watch;

use crate::auth::Claims;
use crate::error::Error;

/// Values scoped to one in-flight request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    trace_id: String,
    started_at: Instant,
    status: Option<StatusCode>,
    claims: Option<Claims>,
    cancellation: Cancellation,
}

impl RequestContext {
    /// A fresh context: new trace id, clock started now, never cancelled.
    pub fn new() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            started_at: Instant::now(),
            status: None,
            claims: None,
            cancellation: Cancellation::never(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The final status, once the response has been decided.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Validated claims. `None` until [`Authenticate`](crate::middleware::Authenticate) succeeds.
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn set_claims(&mut self, claims: Claims) {
        self.claims = Some(claims);
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Fails with [`Canceled`] if the request has been aborted or has run past
    /// its deadline. Long-running handlers call this between steps.
    pub fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancellation.is_cancelled() {
            return Err(Error::untrusted(Canceled));
        }
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Returned when a request is abandoned before its handler finished.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, thiserror::Error)]
#[error("request context canceled")]
pub struct Canceled;

/// Read side of a request's cancellation state.
///
/// Cancelled when the owning [`CancelGuard`] is cancelled or dropped, or when
/// the optional deadline passes. Cheap to clone into spawned sub-tasks.
#[derive(Clone, Debug)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
    deadline: Option<tokio::time::Instant>,
}

impl Cancellation {
    /// A cancellation that never fires.
    pub fn never() -> Self {
        Self { rx: None, deadline: None }
    }

    pub fn is_cancelled(&self) -> bool {
        if self.deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            return true;
        }
        match &self.rx {
            // A closed channel means the guard is gone.
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
            None => false,
        }
    }

    /// Resolves once the request is cancelled. Pends forever otherwise.
    pub async fn cancelled(&self) {
        let signalled = async {
            match self.rx.clone() {
                Some(mut rx) => {
                    let _ = rx.wait_for(|cancelled| *cancelled).await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = signalled => {}
                () = tokio::time::sleep_until(deadline) => {}
            },
            None => signalled.await,
        }
    }
}

/// Write side of a [`Cancellation`]. Cancels on drop.
#[derive(Debug)]
pub struct CancelGuard(watch::Sender<bool>);

impl CancelGuard {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Creates a linked guard/cancellation pair, optionally bounded by `timeout`.
pub fn cancellation(timeout: Option<Duration>) -> (CancelGuard, Cancellation) {
    let (tx, rx) = watch::channel(false);
    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
    (CancelGuard(tx), Cancellation { rx: Some(rx), deadline })
}
