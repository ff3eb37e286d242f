//! Fleet registry - the authoritative truck state behind one lock.
//!
//! Trucks, their routes and the shared seeded RNG live together in a single
//! `RwLock`. Snapshots take the read side; each truck update takes the write
//! side for that one truck only. The lock is never held across an `.await`.

use crate::config::SimConfig;
use orbit_core::{Advance, Point, RouteState};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Observable lifecycle state of a truck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruckStatus {
    /// Driving toward a waypoint
    EnRoute,

    /// Route is degenerate; the truck stays put
    Idle,
}

/// A simulated truck as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Truck {
    /// Stable identifier, `entity-NNNN`
    pub id: String,

    pub lat: f64,
    pub lon: f64,

    /// Constant speed in m/s, sampled at creation
    pub speed: f64,

    /// Label of the waypoint currently being approached
    pub current_route: String,

    pub status: TruckStatus,
}

impl Truck {
    pub fn position(&self) -> Point {
        Point::new(self.lat, self.lon)
    }
}

/// Formats the identifier of the `index`-th truck (0-based).
pub fn truck_id(index: usize) -> String {
    format!("entity-{:04}", index + 1)
}

struct FleetState {
    trucks: HashMap<String, Truck>,
    routes: HashMap<String, RouteState>,
    rng: ChaCha8Rng,
}

/// Thread-safe map of truck id to truck and route state.
pub struct Registry {
    state: RwLock<FleetState>,
}

impl Registry {
    /// Creates an empty registry whose RNG is seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            state: RwLock::new(FleetState {
                trucks: HashMap::new(),
                routes: HashMap::new(),
                rng: ChaCha8Rng::seed_from_u64(seed),
            }),
        }
    }

    // A panic mid-update cannot leave a truck half-written, so poisoning is
    // recovered rather than propagated.
    fn read(&self) -> RwLockReadGuard<'_, FleetState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FleetState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restarts the shared RNG from `seed`.
    pub fn reseed(&self, seed: u64) {
        self.write().rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Discards the current fleet and spawns a new one from `config`.
    ///
    /// Trucks are built in id order, each drawing start, end, speed and
    /// route from the shared RNG, so equal seeds give equal fleets.
    /// `config` is normalized first. Returns the new ids in order.
    pub fn populate(&self, config: &SimConfig) -> Vec<String> {
        let config = config.clone().normalized();
        let mut guard = self.write();
        let FleetState { trucks, routes, rng } = &mut *guard;

        trucks.clear();
        routes.clear();
        trucks.reserve(config.num_trucks);
        routes.reserve(config.num_trucks);

        let inferred = config.inferred_bounds();
        let mut ids = Vec::with_capacity(config.num_trucks);

        for index in 0..config.num_trucks {
            let start = config.start_points[rng.gen_range(0..config.start_points.len())];
            let end = config.end_points[rng.gen_range(0..config.end_points.len())];
            let speed = config.speed_min + rng.gen::<f64>() * (config.speed_max - config.speed_min);
            let bounds = match config.route_bounds.len() {
                0 => inferred,
                1 => config.route_bounds[0],
                n => config.route_bounds[rng.gen_range(0..n)],
            };
            let route = RouteState::generate(
                rng,
                start,
                end,
                config.waypoints_per_route,
                &bounds,
                config.loop_routes,
            );

            let id = truck_id(index);
            let truck = Truck {
                id: id.clone(),
                lat: start.lat,
                lon: start.lon,
                speed,
                current_route: route.label(),
                status: if route.is_idle() { TruckStatus::Idle } else { TruckStatus::EnRoute },
            };

            trucks.insert(id.clone(), truck);
            routes.insert(id.clone(), route);
            ids.push(id);
        }

        ids
    }

    /// Advances one truck by `dt_secs`. Returns false for an unknown id.
    pub fn advance(&self, id: &str, dt_secs: f64) -> bool {
        let mut guard = self.write();
        let FleetState { trucks, routes, rng } = &mut *guard;

        let (Some(truck), Some(route)) = (trucks.get_mut(id), routes.get_mut(id)) else {
            return false;
        };

        match route.advance(rng, truck.position(), truck.speed, dt_secs) {
            Advance::Idle => truck.status = TruckStatus::Idle,
            Advance::Moved { position, reached } => {
                truck.lat = position.lat;
                truck.lon = position.lon;
                truck.status = TruckStatus::EnRoute;
                // Label only changes when a leg completes
                if reached {
                    truck.current_route = route.label();
                }
            }
        }
        true
    }

    /// Copies every truck, ordered by id.
    pub fn snapshot(&self) -> Vec<Truck> {
        let mut trucks: Vec<Truck> = self.read().trucks.values().cloned().collect();
        trucks.sort_by(|a, b| a.id.cmp(&b.id));
        trucks
    }

    /// Returns a copy of one truck's route.
    pub fn route(&self, id: &str) -> Option<RouteState> {
        self.read().routes.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().trucks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
