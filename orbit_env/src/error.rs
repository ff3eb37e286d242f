//! Error types for the Orbit environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A background task panicked before completing
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// A background task was aborted
    #[error("Task cancelled: {0}")]
    TaskCancelled(String),
}

impl EnvError {
    /// Creates a panicked-task error.
    pub fn panicked(task: impl std::fmt::Display) -> Self {
        Self::TaskPanicked(task.to_string())
    }
}
