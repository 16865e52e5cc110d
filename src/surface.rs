//! Rendering contracts the engine drives.
//!
//! The map widget itself lives outside this crate. The engine only ever calls
//! the primitives below: markers are opaque handles, paths and arrows are
//! fire-and-forget draw calls.
//!
//! [`RecordingSurface`] is an in-memory implementation that keeps every marker
//! and draw call around so hosts without a map (tests, demos, headless replay)
//! can inspect what would have been rendered.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::arrows::ArrowPlacement;
use crate::{GpsPoint, Vehicle};

/// Point markers on a 2D projected map.
pub trait MarkerSurface {
    /// Opaque reference to one placed marker.
    type Handle: Copy + Eq + Hash + Debug;

    /// Place a new marker for `vehicle` at `position`. Markers start visible.
    fn create_marker(&mut self, vehicle: &Vehicle, position: GpsPoint) -> Self::Handle;

    /// Move an existing marker.
    fn move_marker(&mut self, handle: Self::Handle, position: GpsPoint);

    /// Remove a marker from the map. The handle is dead afterwards.
    fn remove_marker(&mut self, handle: Self::Handle);

    /// Show or hide a marker without removing it.
    fn set_marker_visible(&mut self, handle: Self::Handle, visible: bool);

    /// Refresh a marker's presentation after its vehicle attributes or heading
    /// changed. Surfaces that render nothing attribute-dependent can ignore it.
    fn update_marker(&mut self, _handle: Self::Handle, _vehicle: &Vehicle, _heading: Option<f64>) {}
}

/// Trip path polyline plus its direction arrows.
pub trait PathRenderer {
    fn draw_path(&mut self, points: &[GpsPoint], color: &str);
    fn clear_path(&mut self);
    fn place_arrow_marker(&mut self, arrow: &ArrowPlacement, color: &str);
    fn clear_arrows(&mut self);
}

/// Handle issued by [`RecordingSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u64);

/// Last known state of a marker placed on a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMarker {
    pub label: String,
    pub color: String,
    pub position: GpsPoint,
    pub visible: bool,
    pub heading: Option<f64>,
}

/// Counters for every primitive call, used to assert on churn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    pub created: u32,
    pub moved: u32,
    pub removed: u32,
    pub visibility_changes: u32,
}

/// In-memory [`MarkerSurface`] + [`PathRenderer`].
#[derive(Debug, Default)]
pub struct RecordingSurface {
    next_id: u64,
    markers: HashMap<MarkerId, RecordedMarker>,
    stats: SurfaceStats,
    path: Option<(Vec<GpsPoint>, String)>,
    arrows: Vec<ArrowPlacement>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, id: MarkerId) -> Option<&RecordedMarker> {
        self.markers.get(&id)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn visible_count(&self) -> usize {
        self.markers.values().filter(|m| m.visible).count()
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats
    }

    /// Currently drawn path and its color, if any.
    pub fn path(&self) -> Option<(&[GpsPoint], &str)> {
        self.path.as_ref().map(|(points, color)| (points.as_slice(), color.as_str()))
    }

    pub fn arrows(&self) -> &[ArrowPlacement] {
        &self.arrows
    }
}

impl MarkerSurface for RecordingSurface {
    type Handle = MarkerId;

    fn create_marker(&mut self, vehicle: &Vehicle, position: GpsPoint) -> MarkerId {
        self.next_id += 1;
        let id = MarkerId(self.next_id);
        self.markers.insert(
            id,
            RecordedMarker {
                label: vehicle.route_short_name.clone(),
                color: vehicle.route_color.clone(),
                position,
                visible: true,
                heading: vehicle.bearing,
            },
        );
        self.stats.created += 1;
        id
    }

    fn move_marker(&mut self, handle: MarkerId, position: GpsPoint) {
        if let Some(marker) = self.markers.get_mut(&handle) {
            marker.position = position;
            self.stats.moved += 1;
        }
    }

    fn remove_marker(&mut self, handle: MarkerId) {
        if self.markers.remove(&handle).is_some() {
            self.stats.removed += 1;
        }
    }

    fn set_marker_visible(&mut self, handle: MarkerId, visible: bool) {
        if let Some(marker) = self.markers.get_mut(&handle) {
            marker.visible = visible;
            self.stats.visibility_changes += 1;
        }
    }

    fn update_marker(&mut self, handle: MarkerId, vehicle: &Vehicle, heading: Option<f64>) {
        if let Some(marker) = self.markers.get_mut(&handle) {
            marker.label = vehicle.route_short_name.clone();
            marker.color = vehicle.route_color.clone();
            marker.heading = heading.or(vehicle.bearing);
        }
    }
}

impl PathRenderer for RecordingSurface {
    fn draw_path(&mut self, points: &[GpsPoint], color: &str) {
        self.path = Some((points.to_vec(), color.to_string()));
    }

    fn clear_path(&mut self) {
        self.path = None;
    }

    fn place_arrow_marker(&mut self, arrow: &ArrowPlacement, _color: &str) {
        self.arrows.push(*arrow);
    }

    fn clear_arrows(&mut self) {
        self.arrows.clear();
    }
}
