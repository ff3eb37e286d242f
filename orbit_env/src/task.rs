//! Handles to spawned background tasks.

use crate::error::EnvError;
use tokio::task::JoinHandle;

/// A spawned task that can be awaited for completion.
#[derive(Debug)]
pub struct TaskHandle {
    /// Name used for the task's tracing span
    name: String,

    inner: JoinHandle<()>,
}

impl TaskHandle {
    pub(crate) fn new(name: &str, inner: JoinHandle<()>) -> Self {
        Self {
            name: name.to_string(),
            inner,
        }
    }

    /// Returns the task's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true once the task has run to completion.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Waits for the task to exit.
    ///
    /// # Returns
    /// * `Ok(())` - The task returned normally
    /// * `Err(EnvError::TaskPanicked)` - The task panicked
    /// * `Err(EnvError::TaskCancelled)` - The task was aborted before finishing
    pub async fn join(self) -> Result<(), EnvError> {
        self.inner.await.map_err(|e| {
            if e.is_panic() {
                EnvError::panicked(&self.name)
            } else {
                EnvError::TaskCancelled(self.name.clone())
            }
        })
    }
}
