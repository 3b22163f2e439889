//! Application-level shutdown signal.
//!
//! The [`Router`](crate::Router) holds a [`Shutdown`] and fires it when a
//! shutdown-class error escapes the middleware chain. The
//! [`Server`](crate::Server) holds the matching [`ShutdownListener`] and drains
//! when it fires, exactly as it would on `SIGINT`/`SIGTERM`.
//!
//! The signal fires at most once. Later signals are ignored and the first
//! reason is kept, so concurrent failures never block or panic.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

/// Creates a linked sender/listener pair.
pub fn channel() -> (Shutdown, ShutdownListener) {
    let (tx, rx) = watch::channel(None);
    (Shutdown { tx: Arc::new(tx) }, ShutdownListener { rx })
}

/// Fires the shutdown signal. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Shutdown {
    /// Requests shutdown. Returns `true` for the call that actually fired.
    pub fn signal(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let fired = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason.clone());
            true
        });
        if fired {
            warn!(%reason, "shutdown requested");
        }
        fired
    }

    pub fn is_signalled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// A new listener. It observes a signal fired before it was created.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener { rx: self.tx.subscribe() }
    }
}

/// Waits for the shutdown signal.
#[derive(Clone, Debug)]
pub struct ShutdownListener {
    rx: watch::Receiver<Option<String>>,
}

impl ShutdownListener {
    /// Resolves with the reason once shutdown is signalled.
    ///
    /// Returns `None` if every [`Shutdown`] was dropped without firing.
    pub async fn recv(&mut self) -> Option<String> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        }
    }

    /// The reason, if shutdown has already been signalled.
    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_signal_wins() {
        let (shutdown, mut listener) = channel();
        assert!(!shutdown.is_signalled());
        assert!(listener.reason().is_none());

        assert!(shutdown.signal("integrity check failed"));
        assert!(!shutdown.signal("second failure"));

        assert!(shutdown.is_signalled());
        assert_eq!(listener.recv().await.as_deref(), Some("integrity check failed"));
        assert_eq!(listener.reason().as_deref(), Some("integrity check failed"));
    }

    #[tokio::test]
    async fn late_subscribers_see_the_signal() {
        let (shutdown, _listener) = channel();
        shutdown.signal("boom");
        let mut late = shutdown.subscribe();
        assert_eq!(late.recv().await.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn dropped_sender_resolves_to_none() {
        let (shutdown, mut listener) = channel();
        drop(shutdown);
        assert_eq!(listener.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_signals_fire_once() {
        let (shutdown, mut listener) = channel();
        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let shutdown = shutdown.clone();
                tokio::spawn(async move { shutdown.signal(format!("failure {i}")) })
            })
            .collect();

        let mut fired = 0;
        for task in tasks {
            if task.await.unwrap() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert!(listener.recv().await.is_some_and(|r| r.starts_with("failure ")));
    }
}
