//! Cooperative cancellation scopes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

/// A cancellation scope shared by every task of a simulation run.
///
/// Triggering a signal wakes every task waiting on it. A child signal is
/// also triggered by its parent (and transitively by all ancestors), but
/// triggering a child leaves the parent untouched.
///
/// ```text
/// process signal ──► run signal (child) ──► broadcaster, truck tasks
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
    parent: Option<Arc<ShutdownSignal>>,
}

impl ShutdownSignal {
    /// Creates an untriggered root signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            parent: None,
        }
    }

    /// Creates a signal that is also triggered when `self` is.
    pub fn child(&self) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Raises the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true if this signal or any ancestor has been raised.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow() || self.parent.as_ref().is_some_and(|p| p.is_triggered())
    }

    /// Resolves once this signal or any ancestor is raised.
    ///
    /// Resolves immediately if that already happened. Create the future
    /// once per task and poll it by reference inside loops.
    pub fn triggered(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut rx = self.tx.subscribe();
            match &self.parent {
                None => {
                    let _ = rx.wait_for(|raised| *raised).await;
                }
                Some(parent) => {
                    tokio::select! {
                        _ = rx.wait_for(|raised| *raised) => {}
                        _ = parent.triggered() => {}
                    }
                }
            }
        })
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
