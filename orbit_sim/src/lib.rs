//! Orbit fleet simulator.
//!
//! Moves a fleet of trucks along randomized multi-waypoint routes, one
//! concurrent task per truck, all driven by a single fixed-interval tick.
//!
//! # Core Principle: One Seed, One Fleet
//!
//! Every random draw (start, end, speed, intermediate waypoints and
//! reshuffles) comes from one RNG seeded from the configuration:
//! - **Initial state**: two managers with equal configs build equal fleets
//! - **Reconfiguration**: the RNG is reseeded and the fleet rebuilt
//! - **Ticks**: a truck that misses a tick simply waits for the next one
//!
//! # Usage
//!
//! ```ignore
//! use orbit_sim::{SimConfig, SimulationManager};
//! use orbit_env::ShutdownSignal;
//!
//! let manager = SimulationManager::new(SimConfig {
//!     num_trucks: 100,
//!     seed: 42,
//!     ..Default::default()
//! });
//!
//! let shutdown = ShutdownSignal::new();
//! manager.start(&shutdown).await?;
//! let trucks = manager.snapshot();
//! manager.stop().await;
//! ```

mod config;
mod error;
mod exporter;
mod manager;
mod registry;

pub use config::{
    parse_bounding_box, ConfigUpdate, SimConfig, DEFAULT_END, DEFAULT_NUM_TRUCKS, DEFAULT_SEED,
    DEFAULT_SPEED_MAX, DEFAULT_SPEED_MIN, DEFAULT_START, DEFAULT_TICK_INTERVAL,
    MAX_WAYPOINTS_PER_ROUTE, MIN_WAYPOINTS_PER_ROUTE,
};
pub use error::SimError;
pub use exporter::{FleetFrame, SimEvent, SimExport};
pub use manager::SimulationManager;
pub use registry::{truck_id, Registry, Truck, TruckStatus};
