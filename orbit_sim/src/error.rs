//! Error types for the simulation manager.

use orbit_core::BoundsError;
use thiserror::Error;

/// Errors reported by the simulation manager and its configuration helpers.
///
/// Lifecycle misuse leaves the simulation untouched; the caller can retry
/// with the right sequencing.
#[derive(Debug, Error)]
pub enum SimError {
    /// `start` called while the simulation is running
    #[error("Simulation already started")]
    AlreadyStarted,

    /// Reconfiguration requested while the simulation is stopped
    #[error("Simulation not started")]
    NotStarted,

    /// Bounding box text could not be parsed
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// Bounding box parsed but failed validation
    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
