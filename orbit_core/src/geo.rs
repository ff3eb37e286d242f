//! The navigation kernel - spherical earth geometry for fleet movement.
//!
//! Everything here is a pure function over [`Point`] values. Positions are
//! never interpolated linearly in raw degrees: longitude wraps at the
//! antimeridian and a degree of longitude shrinks toward the poles, so every
//! step is taken along a great circle.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean earth radius used for all distance calculations, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in degrees, positive north
    pub lat: f64,

    /// Longitude in degrees, positive east
    pub lon: f64,
}

impl Point {
    /// Creates a point from latitude and longitude in degrees.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Short human-readable label, three decimals per axis.
    pub fn label(&self) -> String {
        format!("{:.3},{:.3}", self.lat, self.lon)
    }
}

/// Errors raised when validating a caller-supplied bounding box.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundsError {
    /// Minimum is not strictly below maximum on some axis
    #[error("Invalid bounding box extents: lat [{min_lat}, {max_lat}], lon [{min_lon}, {max_lon}]")]
    InvalidExtents {
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    },

    /// Latitude outside ±90 or longitude outside ±180
    #[error("Bounding box out of range")]
    OutOfRange,
}

/// A rectangular latitude/longitude region.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub const fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self { min_lat, max_lat, min_lon, max_lon }
    }

    /// Returns the tightest box containing every point.
    ///
    /// An empty slice yields the zero box.
    pub fn from_points(points: &[Point]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };

        points[1..].iter().fold(
            Self::new(first.lat, first.lat, first.lon, first.lon),
            |b, p| Self {
                min_lat: b.min_lat.min(p.lat),
                max_lat: b.max_lat.max(p.lat),
                min_lon: b.min_lon.min(p.lon),
                max_lon: b.max_lon.max(p.lon),
            },
        )
    }

    /// Checks that the box is non-empty and lies on the globe.
    ///
    /// The simulation itself accepts any box; this is for callers that take
    /// a box from the outside world before handing it to the manager.
    pub fn validate(&self) -> Result<(), BoundsError> {
        if !(self.min_lat < self.max_lat) || !(self.min_lon < self.max_lon) {
            return Err(BoundsError::InvalidExtents {
                min_lat: self.min_lat,
                max_lat: self.max_lat,
                min_lon: self.min_lon,
                max_lon: self.max_lon,
            });
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 || self.min_lon < -180.0 || self.max_lon > 180.0 {
            return Err(BoundsError::OutOfRange);
        }
        Ok(())
    }

    /// Returns true if the point lies inside the box (edges inclusive).
    pub fn contains(&self, p: Point) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }
}

/// Great-circle (haversine) distance between two points, in meters.
pub fn distance(a: Point, b: Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial compass bearing from `a` toward `b`, in degrees within [0, 360).
///
/// Coincident points have no direction; the result is 0. Check
/// [`distance`] first if that matters.
pub fn bearing(a: Point, b: Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    let deg = y.atan2(x).to_degrees();
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Advances from `current` toward `target` at `speed` m/s for `dt_secs`.
///
/// Returns the new position and whether the target was reached. When the
/// distance coverable this step is at least the remaining distance the
/// result is exactly `target`, so a waypoint is never overshot no matter
/// how large the step.
pub fn step(current: Point, target: Point, speed: f64, dt_secs: f64) -> (Point, bool) {
    let remaining = distance(current, target);
    if remaining == 0.0 {
        return (target, true);
    }

    let travel = speed * dt_secs;
    if travel >= remaining {
        return (target, true);
    }

    (destination(current, bearing(current, target), travel), false)
}

/// Point reached by travelling `meters` from `start` along `bearing_deg`.
pub fn destination(start: Point, bearing_deg: f64, meters: f64) -> Point {
    let angular = meters / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = start.lat.to_radians();
    let lon1 = start.lon.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Point::new(lat2.to_degrees(), normalize_lon(lon2.to_degrees()))
}

/// Wraps a longitude into [-180, 180).
fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Samples `count` points uniformly inside `bounds`.
///
/// An axis with zero span is widened to one degree so the stream never
/// collapses onto a single coordinate.
pub fn random_points_in_bounds<R: Rng + ?Sized>(
    rng: &mut R,
    bounds: &BoundingBox,
    count: usize,
) -> Vec<Point> {
    let mut lat_span = bounds.max_lat - bounds.min_lat;
    let mut lon_span = bounds.max_lon - bounds.min_lon;
    if lat_span == 0.0 {
        lat_span = 1.0;
    }
    if lon_span == 0.0 {
        lon_span = 1.0;
    }

    (0..count)
        .map(|_| {
            let lat = bounds.min_lat + rng.gen::<f64>() * lat_span;
            let lon = bounds.min_lon + rng.gen::<f64>() * lon_span;
            Point::new(lat, lon)
        })
        .collect()
}
