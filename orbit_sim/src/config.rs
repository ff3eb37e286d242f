//! Simulation configuration, normalization and partial updates.

use crate::error::SimError;
use orbit_core::{BoundingBox, Point};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_NUM_TRUCKS: usize = 2000;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_SPEED_MIN: f64 = 10.0;
pub const DEFAULT_SPEED_MAX: f64 = 25.0;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const MIN_WAYPOINTS_PER_ROUTE: usize = 2;
pub const MAX_WAYPOINTS_PER_ROUTE: usize = 1024;

/// Start candidate used when none are configured (Seattle).
pub const DEFAULT_START: Point = Point::new(47.6062, -122.3321);

/// End candidate used when none are configured (San Francisco).
pub const DEFAULT_END: Point = Point::new(37.7749, -122.4194);

/// Configuration for a simulation run.
///
/// Consumed when trucks are created. Two managers built from identical
/// configurations produce identical initial fleets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of trucks to spawn
    pub num_trucks: usize,

    /// Master seed for determinism
    pub seed: u64,

    /// Lower bound of the sampled speed, m/s
    pub speed_min: f64,

    /// Upper bound of the sampled speed, m/s
    pub speed_max: f64,

    /// Candidate route origins, sampled uniformly
    pub start_points: Vec<Point>,

    /// Candidate route destinations, sampled uniformly
    pub end_points: Vec<Point>,

    /// Waypoints per route including start and end
    pub waypoints_per_route: usize,

    /// Regions for intermediate waypoints; inferred from the
    /// start/end candidates when empty
    pub route_bounds: Vec<BoundingBox>,

    /// Repeat each route forever instead of reshuffling it
    pub loop_routes: bool,

    /// Time between ticks
    #[serde(rename = "tick_interval_ms", with = "duration_ms")]
    pub tick_interval: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_trucks: DEFAULT_NUM_TRUCKS,
            seed: DEFAULT_SEED,
            speed_min: DEFAULT_SPEED_MIN,
            speed_max: DEFAULT_SPEED_MAX,
            start_points: vec![DEFAULT_START],
            end_points: vec![DEFAULT_END],
            waypoints_per_route: MIN_WAYPOINTS_PER_ROUTE,
            route_bounds: Vec::new(),
            loop_routes: false,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl SimConfig {
    /// Replaces malformed values with safe defaults.
    ///
    /// A configuration never fails to start: zero counts, zero seeds,
    /// unusable speed ranges, short routes and zero intervals all fall back
    /// to the documented defaults. Oversized routes are capped at
    /// [`MAX_WAYPOINTS_PER_ROUTE`].
    pub fn normalized(mut self) -> Self {
        if self.num_trucks == 0 {
            self.num_trucks = DEFAULT_NUM_TRUCKS;
        }
        if self.seed == 0 {
            self.seed = DEFAULT_SEED;
        }
        if !self.speed_min.is_finite() || self.speed_min <= 0.0 {
            self.speed_min = DEFAULT_SPEED_MIN;
        }
        if !self.speed_max.is_finite() || self.speed_max < self.speed_min {
            self.speed_min = DEFAULT_SPEED_MIN;
            self.speed_max = DEFAULT_SPEED_MAX;
        }
        if self.start_points.is_empty() {
            self.start_points = vec![DEFAULT_START];
        }
        if self.end_points.is_empty() {
            self.end_points = vec![DEFAULT_END];
        }
        self.waypoints_per_route = self
            .waypoints_per_route
            .clamp(MIN_WAYPOINTS_PER_ROUTE, MAX_WAYPOINTS_PER_ROUTE);
        if self.tick_interval.is_zero() {
            self.tick_interval = DEFAULT_TICK_INTERVAL;
        }
        self
    }

    /// Returns a copy with the supplied fields of `update` merged in.
    ///
    /// A bounding box replaces all configured route bounds.
    pub fn with_update(&self, update: &ConfigUpdate) -> Self {
        let mut merged = self.clone();
        if let Some(n) = update.num_trucks {
            merged.num_trucks = n;
        }
        if let Some(interval) = update.tick_interval {
            merged.tick_interval = interval;
        }
        if let Some(bbox) = update.bounding_box {
            merged.route_bounds = vec![bbox];
        }
        merged
    }

    /// Region intermediate waypoints are drawn from when none are configured.
    pub fn inferred_bounds(&self) -> BoundingBox {
        let candidates: Vec<Point> = self
            .start_points
            .iter()
            .chain(self.end_points.iter())
            .copied()
            .collect();
        BoundingBox::from_points(&candidates)
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// A partial configuration change. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    pub num_trucks: Option<usize>,
    pub tick_interval: Option<Duration>,
    pub bounding_box: Option<BoundingBox>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.num_trucks.is_none() && self.tick_interval.is_none() && self.bounding_box.is_none()
    }
}

/// Parses `minLat,minLon,maxLat,maxLon` and validates the result.
pub fn parse_bounding_box(text: &str) -> Result<BoundingBox, SimError> {
    let parts = text
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SimError::InvalidBoundingBox(format!("{text:?}: {e}")))?;

    let &[min_lat, min_lon, max_lat, max_lon] = &parts[..] else {
        return Err(SimError::InvalidBoundingBox(format!(
            "{text:?}: expected minLat,minLon,maxLat,maxLon"
        )));
    };

    let bbox = BoundingBox::new(min_lat, max_lat, min_lon, max_lon);
    bbox.validate()?;
    Ok(bbox)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
