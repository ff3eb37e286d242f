//! Orbit Core - Navigation and Routing for Fleet Simulation
//!
//! This library holds the pure parts of the fleet simulator:
//! 1. **Geo kernel**: great-circle distance, bearing and snap-to-target stepping
//! 2. **Route state machine**: waypoint legs that advance, loop or reshuffle
//! 3. **Metrics**: an explicit collector for tick and update timings

pub mod geo;
pub mod route;
pub mod metrics;

// Re-export key types for convenience
pub use geo::{BoundingBox, BoundsError, Point};
pub use route::{Advance, RouteState};
pub use metrics::{MetricsSnapshot, SimMetrics};
