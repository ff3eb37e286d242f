//! Core environment context trait for Orbit simulations.

use crate::task::TaskHandle;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for runtime interaction.
///
/// The simulation manager never calls the async runtime directly for
/// clocks or task creation; it goes through this trait so the same engine
/// code runs wherever a context is provided.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `tokio::spawn`
#[async_trait]
pub trait OrbitContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// Used for tick latency and update duration measurements.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Spawns a named background task and returns a handle that can be
    /// awaited for its completion.
    fn spawn<F>(&self, name: &str, future: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static;
}
