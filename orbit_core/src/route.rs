//! Route state machine - waypoint sequencing for a single truck.
//!
//! A route is an ordered list of waypoints and the index of the one being
//! approached. Reaching the final waypoint either loops back to the first
//! or reshuffles the tour so the truck keeps driving forever.

use crate::geo::{self, BoundingBox, Point};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result of advancing a route by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advance {
    /// Route is degenerate; position unchanged
    Idle,

    /// Moved toward (or onto) the current waypoint
    Moved {
        position: Point,
        /// True when the step landed on a waypoint
        reached: bool,
    },
}

/// Per-truck route progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteState {
    /// Ordered waypoints; fewer than two means the truck cannot move
    waypoints: Vec<Point>,

    /// Index of the waypoint currently being approached
    leg: usize,

    /// Repeat the same ordered tour instead of reshuffling
    looping: bool,
}

impl RouteState {
    /// Creates a route that starts at `waypoints[0]` heading for the next one.
    ///
    /// Consecutive duplicate waypoints are collapsed, so a route whose start
    /// and end coincide with nothing in between is degenerate.
    pub fn new(mut waypoints: Vec<Point>, looping: bool) -> Self {
        waypoints.dedup();
        Self {
            waypoints,
            leg: 1,
            looping,
        }
    }

    /// Builds `start -> intermediates -> end` for a route of `waypoints_per_route`
    /// stops, drawing the `waypoints_per_route - 2` intermediate stops from `bounds`.
    pub fn generate<R: Rng + ?Sized>(
        rng: &mut R,
        start: Point,
        end: Point,
        waypoints_per_route: usize,
        bounds: &BoundingBox,
        looping: bool,
    ) -> Self {
        let intermediate = waypoints_per_route.saturating_sub(2);
        let mut waypoints = Vec::with_capacity(intermediate + 2);
        waypoints.push(start);
        waypoints.extend(geo::random_points_in_bounds(rng, bounds, intermediate));
        waypoints.push(end);
        Self::new(waypoints, looping)
    }

    pub fn waypoints(&self) -> &[Point] {
        &self.waypoints
    }

    pub fn leg(&self) -> usize {
        self.leg
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// A route needs at least two waypoints to produce motion.
    pub fn is_idle(&self) -> bool {
        self.waypoints.len() < 2
    }

    /// Leg index clamped into the waypoint range.
    fn clamped_leg(&self) -> usize {
        self.leg.min(self.waypoints.len().saturating_sub(1))
    }

    /// Waypoint currently being approached, or the final one if the index
    /// has run past the end.
    pub fn target(&self) -> Option<Point> {
        self.waypoints.get(self.clamped_leg()).copied()
    }

    /// Label shown to observers for the active leg.
    pub fn label(&self) -> String {
        self.target().map(|p| p.label()).unwrap_or_default()
    }

    /// Moves `position` one tick along the route.
    ///
    /// `rng` is only drawn from when a non-looping route completes and
    /// its waypoints are reshuffled.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        position: Point,
        speed: f64,
        dt_secs: f64,
    ) -> Advance {
        if self.is_idle() {
            return Advance::Idle;
        }

        let leg = self.clamped_leg();
        let (next, reached) = geo::step(position, self.waypoints[leg], speed, dt_secs);

        if reached {
            if leg + 1 < self.waypoints.len() {
                self.leg = leg + 1;
            } else if self.is_looping() {
                self.leg = 0;
            } else {
                self.reshuffle(rng, next);
            }
        } else {
            self.leg = leg;
        }

        Advance::Moved { position: next, reached }
    }

    /// Starts a new tour from `position` over the remaining waypoints in random order.
    fn reshuffle<R: Rng + ?Sized>(&mut self, rng: &mut R, position: Point) {
        let last = self.waypoints.len() - 1;
        let mut rest: Vec<Point> = self.waypoints[..last].to_vec();
        rest.shuffle(rng);

        self.waypoints.clear();
        self.waypoints.push(position);
        self.waypoints.extend(rest);
        self.leg = if self.waypoints.len() > 1 { 1 } else { 0 };

        debug!(waypoints = self.waypoints.len(), "route reshuffled");
    }
}
