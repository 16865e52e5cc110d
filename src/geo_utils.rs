//! # Geographic Utilities
//!
//! Distance and heading computations shared by the reconciler, the animator and
//! the path arrow placer.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`bearing_degrees`] | Initial great-circle bearing, normalized to `[0, 360)` |
//! | [`polyline_length`] | Total length of a path in meters |
//! | [`lerp`] | Independent linear interpolation of latitude and longitude |
//!
//! ## Example
//!
//! ```rust
//! use vehicle_tracker::{GpsPoint, geo_utils};
//!
//! let market_st = GpsPoint::new(37.7749, -122.4194);
//! let ferry_building = GpsPoint::new(37.7955, -122.3937);
//!
//! let dist = geo_utils::haversine_distance(&market_st, &ferry_building);
//! let heading = geo_utils::bearing_degrees(&market_st, &ferry_building);
//! assert!(dist > 3000.0 && dist < 3500.0);
//! assert!(heading > 0.0 && heading < 90.0); // north-east
//! ```
//!
//! ## Algorithm Notes
//!
//! Distances use the haversine formula on a sphere of radius 6,371,000 m.
//! Bearings are the initial bearing of the great circle from `from` to `to`,
//! measured clockwise from north.
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees).

use geo::{Bearing, Haversine, Point};
use crate::GpsPoint;

/// Earth radius used by [`haversine_distance`], in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface. The result is
/// symmetric and zero for identical points.
///
/// # Example
///
/// ```rust
/// use vehicle_tracker::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lng = (p2.longitude - p1.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    EARTH_RADIUS_METERS * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Calculate the total length of a path in meters.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// paths return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Direction Functions
// =============================================================================

/// Initial bearing from `from` to `to` in degrees clockwise from north.
///
/// The result is always in `[0, 360)`. Identical points have no defined
/// direction; this returns `0.0` for them and callers treat it as "no heading
/// change".
///
/// # Example
///
/// ```rust
/// use vehicle_tracker::{GpsPoint, geo_utils};
///
/// let origin = GpsPoint::new(10.0, 20.0);
/// let north = GpsPoint::new(10.001, 20.0);
/// let west = GpsPoint::new(10.0, 19.999);
///
/// assert!(geo_utils::bearing_degrees(&origin, &north) < 1e-6);
/// assert!((geo_utils::bearing_degrees(&origin, &west) - 270.0).abs() < 0.01);
/// assert_eq!(geo_utils::bearing_degrees(&origin, &origin), 0.0);
/// ```
pub fn bearing_degrees(from: &GpsPoint, to: &GpsPoint) -> f64 {
    if from == to {
        return 0.0;
    }

    let origin = Point::new(from.longitude, from.latitude);
    let destination = Point::new(to.longitude, to.latitude);
    normalize_degrees(Haversine::bearing(origin, destination))
}

/// Wrap an angle in degrees into `[0, 360)`.
#[inline]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

// =============================================================================
// Interpolation
// =============================================================================

/// Interpolate latitude and longitude independently.
///
/// `t = 0.0` yields `start`, `t = 1.0` yields `end`. Values outside `[0, 1]`
/// extrapolate; callers clamp first.
#[inline]
pub fn lerp(start: &GpsPoint, end: &GpsPoint, t: f64) -> GpsPoint {
    GpsPoint::new(
        start.latitude + (end.latitude - start.latitude) * t,
        start.longitude + (end.longitude - start.longitude) * t,
    )
}

// =============================================================================
// Unit Tests
// =============================================================================
