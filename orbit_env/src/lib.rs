//! Orbit Environment Abstraction Layer
//!
//! This crate isolates the fleet simulator from the async runtime it runs on:
//! - Time (`now()`, `sleep()`)
//! - Task creation (`spawn()` returning a joinable [`TaskHandle`])
//! - Cancellation ([`ShutdownSignal`] scopes with parent/child linking)
//!
//! # Example
//!
//! ```ignore
//! use orbit_env::{OrbitContext, ShutdownSignal, TokioContext};
//!
//! let ctx = TokioContext::shared();
//! let shutdown = ShutdownSignal::new();
//! let run = shutdown.child();
//!
//! let handle = ctx.spawn("worker", async move {
//!     run.triggered().await;
//! });
//!
//! shutdown.trigger();
//! handle.join().await?;
//! ```

mod context;
mod error;
mod shutdown;
mod task;
mod tokio_impl;

pub use context::OrbitContext;
pub use error::EnvError;
pub use shutdown::ShutdownSignal;
pub use task::TaskHandle;
pub use tokio_impl::TokioContext;
