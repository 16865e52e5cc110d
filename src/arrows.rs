//! Direction arrows along a trip path.
//!
//! Walks the path segment by segment, accumulating real-world distance. Once
//! `spacing_meters` has been covered, the next segment gets an arrow at its
//! start vertex pointing along it, and the accumulator resets. Arrows always
//! sit on path vertices and a segment carries at most one; a trailing stretch
//! shorter than the spacing gets none.

use log::warn;

use crate::geo_utils::{bearing_degrees, haversine_distance};
use crate::GpsPoint;

/// Default distance between arrows.
pub const DEFAULT_ARROW_SPACING_METERS: f64 = 1000.0;

/// Where to draw one arrow and which way it points.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ArrowPlacement {
    pub position: GpsPoint,
    /// Degrees clockwise from north, `[0, 360)`
    pub bearing: f64,
}

/// Compute arrow placements for `path`.
///
/// Pure function of its input: calling it twice on the same path gives the
/// same arrows. Non-positive or non-finite spacing yields no arrows.
///
/// # Example
///
/// ```rust
/// use vehicle_tracker::{GpsPoint, place_arrows};
///
/// // ~3.3 km due north along a meridian
/// let path: Vec<GpsPoint> = (0..=30).map(|i| GpsPoint::new(i as f64 * 0.001, 0.0)).collect();
///
/// let arrows = place_arrows(&path, 1000.0);
/// assert_eq!(arrows.len(), 3);
/// assert!(arrows.iter().all(|a| a.bearing < 1e-6));
/// ```
pub fn place_arrows(path: &[GpsPoint], spacing_meters: f64) -> Vec<ArrowPlacement> {
    if !(spacing_meters.is_finite() && spacing_meters > 0.0) {
        warn!("[Arrows] Invalid spacing {}m, no arrows placed", spacing_meters);
        return Vec::new();
    }

    let mut arrows = Vec::new();
    let mut accumulated = 0.0;

    for segment in path.windows(2) {
        let (start, end) = (&segment[0], &segment[1]);

        // The segment that triggers an arrow does not count toward the next one
        if accumulated >= spacing_meters {
            arrows.push(ArrowPlacement {
                position: *start,
                bearing: bearing_degrees(start, end),
            });
            accumulated = 0.0;
        } else {
            accumulated += haversine_distance(start, end);
        }
    }

    arrows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::polyline_length;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    /// Straight east-west line along the equator, `n` steps of `step` degrees.
    fn equator_path(n: usize, step: f64) -> Vec<GpsPoint> {
        (0..=n).map(|i| GpsPoint::new(0.0, i as f64 * step)).collect()
    }

    #[test]
    fn test_short_path_has_no_arrows() {
        let path = equator_path(5, 0.001); // ~556m
        assert!(polyline_length(&path) < 1000.0);
        assert!(place_arrows(&path, 1000.0).is_empty());
    }

    #[test]
    fn test_empty_and_single_point() {
        assert!(place_arrows(&[], 1000.0).is_empty());
        assert!(place_arrows(&[GpsPoint::new(1.0, 1.0)], 1000.0).is_empty());
    }

    #[test]
    fn test_arrows_sit_on_vertices() {
        // 40 segments of ~111m: 9 segments reach 1000m, the 10th carries the arrow
        let path = equator_path(40, 0.001);
        let arrows = place_arrows(&path, 1000.0);

        let positions: Vec<GpsPoint> = arrows.iter().map(|a| a.position).collect();
        assert_eq!(positions, vec![path[9], path[19], path[29], path[39]]);
        for arrow in &arrows {
            assert!(path.contains(&arrow.position));
            assert!(approx_eq(arrow.bearing, 90.0, 1e-6));
        }
    }

    #[test]
    fn test_long_segment_carries_at_most_one_arrow() {
        // Three ~5.56km segments heading east
        let path = equator_path(3, 0.05);
        let arrows = place_arrows(&path, 1000.0);
        assert_eq!(arrows.len(), 1);
        assert_eq!(arrows[0].position, path[1]);

        // A single segment never has distance behind it
        assert!(place_arrows(&path[..2], 1000.0).is_empty());
    }

    #[test]
    fn test_bearing_follows_segment() {
        // East for ~1.1km, then north for ~1.1km
        let path = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 0.01),
            GpsPoint::new(0.01, 0.01),
        ];
        let arrows = place_arrows(&path, 1000.0);
        assert_eq!(arrows.len(), 1);
        assert_eq!(arrows[0].position, path[1]);
        assert!(arrows[0].bearing < 1e-6 || arrows[0].bearing > 359.999);
    }

    #[test]
    fn test_deterministic() {
        let path = equator_path(50, 0.001);
        assert_eq!(place_arrows(&path, 800.0), place_arrows(&path, 800.0));
    }

    #[test]
    fn test_invalid_spacing() {
        let path = equator_path(50, 0.001);
        assert!(place_arrows(&path, 0.0).is_empty());
        assert!(place_arrows(&path, -5.0).is_empty());
        assert!(place_arrows(&path, f64::NAN).is_empty());
    }
}
