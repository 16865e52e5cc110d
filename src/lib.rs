//! # Vehicle Tracker
//!
//! Reconciliation and animation engine for live transit vehicle maps.
//!
//! This library provides:
//! - Snapshot reconciliation: diff each feed snapshot against the vehicles on
//!   screen and create, move or remove markers accordingly
//! - Smooth, cancelable marker animation with an ease-in-out curve
//! - Route-group selection filtering and a timed auto-play sequencer
//! - Direction arrows placed along a trip path at fixed real-world spacing
//!
//! Rendering and transport are supplied by the host through the traits in
//! [`surface`] and [`feed`].
//!
//! ## Features
//!
//! - **`runtime`** - Enable the async refresh loop (tokio)
//! - **`http`** - Enable the HTTP feed client (implies `runtime`)
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Instant;
//! use vehicle_tracker::{GpsPoint, Tracker, TrackerConfig, Vehicle, ReconcileMode};
//! use vehicle_tracker::surface::RecordingSurface;
//!
//! let mut tracker = Tracker::new(TrackerConfig::default(), RecordingSurface::new());
//!
//! let snapshot = vec![
//!     Vehicle::new("bus-7", "trip-1")
//!         .with_route("N", "Ocean Beach")
//!         .with_location(GpsPoint::new(37.7665, -122.4333)),
//! ];
//!
//! let report = tracker.apply_snapshot(&snapshot, ReconcileMode::Incremental, Instant::now());
//! assert_eq!(report.created.len(), 1);
//! assert_eq!(tracker.surface().marker_count(), 1);
//! ```

use std::fmt;

pub mod geo_utils;

pub mod animator;
pub use animator::{
    ease_in_out, AnimationState, FrameId, FrameOutcome, FrameQueue, FrameScheduler,
    PositionAnimator, DEFAULT_SLIDE_DURATION,
};

pub mod surface;
pub use surface::{MarkerSurface, PathRenderer};

pub mod reconciler;
pub use reconciler::{ReconcileMode, ReconcileReport, Reconciler, TrackedVehicle};

pub mod selection;
pub use selection::{SelectionChange, SelectionMode, SelectionState};

pub mod arrows;
pub use arrows::{place_arrows, ArrowPlacement, DEFAULT_ARROW_SPACING_METERS};

pub mod autoplay;
pub use autoplay::{AutoPlayInterval, AutoPlaySequencer, ParseIntervalError};

pub mod places;
pub use places::Place;

pub mod feed;
pub use feed::{FeedError, FeedSnapshot, TripPath, VehicleFeed};

pub mod tracker;
pub use tracker::{ApplicationState, Tracker, TrackerConfig};

// HTTP module for the vehicle feed
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::FeedClient;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("VehicleTrackerRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use vehicle_tracker::GpsPoint;
/// let point = GpsPoint::new(40.7698, -73.9620); // Manhattan
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Stable identity of a tracked vehicle.
///
/// The feed reuses vehicle ids across trips, so the key combines both: the
/// same bus starting a new trip is a new tracked vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleKey(String);

impl VehicleKey {
    pub fn new(vehicle_id: &str, trip_id: &str) -> Self {
        Self(format!("{}{}", vehicle_id, trip_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Vehicles sharing a group key run the same route in the same direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub headsign: String,
    pub short_label: String,
}

impl GroupKey {
    pub fn new(headsign: impl Into<String>, short_label: impl Into<String>) -> Self {
        Self { headsign: headsign.into(), short_label: short_label.into() }
    }
}

/// One vehicle as reported by the feed.
///
/// Colors and labels are presentational and passed through to the marker
/// surface untouched.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Vehicle {
    pub vehicle_id: String,
    pub trip_id: String,
    /// Last reported location; vehicles without one are never displayed
    pub location: Option<GpsPoint>,
    /// Route color as a hex string without `#`
    pub route_color: String,
    pub text_color: String,
    pub route_short_name: String,
    pub route_long_name: String,
    pub headsign: String,
    /// Bearing reported by the feed, if any
    pub bearing: Option<f64>,
}

impl Vehicle {
    pub fn new(vehicle_id: impl Into<String>, trip_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            trip_id: trip_id.into(),
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: GpsPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_route(mut self, short_name: impl Into<String>, headsign: impl Into<String>) -> Self {
        self.route_short_name = short_name.into();
        self.headsign = headsign.into();
        self
    }

    pub fn with_colors(mut self, route_color: impl Into<String>, text_color: impl Into<String>) -> Self {
        self.route_color = route_color.into();
        self.text_color = text_color.into();
        self
    }

    pub fn key(&self) -> VehicleKey {
        VehicleKey::new(&self.vehicle_id, &self.trip_id)
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.headsign.clone(), self.route_short_name.clone())
    }

    /// Whether this vehicle belongs to `group`.
    pub fn in_group(&self, group: &GroupKey) -> bool {
        self.headsign == group.headsign && self.route_short_name == group.short_label
    }

    /// Displayable position: present and within WGS84 range.
    pub fn position(&self) -> Option<GpsPoint> {
        self.location.filter(GpsPoint::is_valid)
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::debug;

    /// Great-circle distance in meters.
    #[uniffi::export]
    pub fn ffi_distance_meters(from: GpsPoint, to: GpsPoint) -> f64 {
        geo_utils::haversine_distance(&from, &to)
    }

    /// Initial bearing in degrees, `[0, 360)`.
    #[uniffi::export]
    pub fn ffi_bearing_degrees(from: GpsPoint, to: GpsPoint) -> f64 {
        geo_utils::bearing_degrees(&from, &to)
    }

    /// Eased animation progress for a host-driven animation loop.
    #[uniffi::export]
    pub fn ffi_ease_in_out(progress: f64) -> f64 {
        ease_in_out(progress.clamp(0.0, 1.0))
    }

    /// Arrow placements along a trip path.
    #[uniffi::export]
    pub fn ffi_place_arrows(path: Vec<GpsPoint>, spacing_meters: f64) -> Vec<ArrowPlacement> {
        init_logging();
        let arrows = place_arrows(&path, spacing_meters);
        debug!("[VehicleTrackerRust] {} arrows for {} path points", arrows.len(), path.len());
        arrows
    }

    /// Stable tracking key for a vehicle/trip pair.
    #[uniffi::export]
    pub fn ffi_vehicle_key(vehicle_id: String, trip_id: String) -> String {
        VehicleKey::new(&vehicle_id, &trip_id).as_str().to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
