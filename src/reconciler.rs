//! # Snapshot Reconciliation
//!
//! Turns each feed snapshot into marker side effects.
//!
//! ## Algorithm
//! 1. Skip vehicles without a displayable position; they neither create a
//!    marker nor keep an existing one alive.
//! 2. Unknown keys get a new marker at the reported position (no animation).
//! 3. Known keys get their attributes replaced wholesale. If the position
//!    changed, the heading is recomputed from the previous snapshot's position
//!    and the marker slides to the new one.
//! 4. Tracked keys missing from the snapshot have their animator stopped and
//!    their marker removed.
//!
//! Reconciling the same snapshot twice is a no-op the second time: no markers
//! are created or removed and no slide is restarted.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::animator::{FrameId, FrameOutcome, FrameScheduler, PositionAnimator, DEFAULT_SLIDE_DURATION};
use crate::geo_utils::bearing_degrees;
use crate::selection::SelectionState;
use crate::surface::MarkerSurface;
use crate::{GpsPoint, Vehicle, VehicleKey};

/// How a snapshot is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    /// Diff against tracked vehicles, animating the ones that moved.
    #[default]
    Incremental,
    /// Drop every tracked vehicle first, then place the snapshot without animation.
    Replace,
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub created: Vec<VehicleKey>,
    /// Known vehicles that started sliding to a new position
    pub moved: Vec<VehicleKey>,
    /// Known vehicles whose position did not change
    pub unchanged: usize,
    pub removed: Vec<VehicleKey>,
    /// Vehicles ignored for lacking a usable position (or duplicated in the snapshot)
    pub skipped: usize,
    /// Vehicles dropped up front by [`ReconcileMode::Replace`]
    pub cleared: usize,
}

impl ReconcileReport {
    /// True when no marker was created, moved or removed.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.moved.is_empty() && self.removed.is_empty() && self.cleared == 0
    }
}

/// One vehicle currently on the map.
#[derive(Debug)]
pub struct TrackedVehicle<H> {
    vehicle: Vehicle,
    animator: PositionAnimator<H>,
    /// Position reported by the previous snapshot (not the animated point)
    last_known_position: GpsPoint,
    heading: Option<f64>,
    visible: bool,
}

impl<H: Copy> TrackedVehicle<H> {
    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn animator(&self) -> &PositionAnimator<H> {
        &self.animator
    }

    pub fn last_known_position(&self) -> GpsPoint {
        self.last_known_position
    }

    /// Heading computed from the last two distinct reported positions.
    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn marker(&self) -> Option<H> {
        self.animator.marker()
    }
}

/// Owner of every [`TrackedVehicle`]. The only code that creates or destroys them.
#[derive(Debug)]
pub struct Reconciler<H> {
    tracked: HashMap<VehicleKey, TrackedVehicle<H>>,
    slide_duration: Duration,
    last_updated_at: Option<Instant>,
}

impl<H: Copy + Debug> Default for Reconciler<H> {
    fn default() -> Self {
        Self::new(DEFAULT_SLIDE_DURATION)
    }
}

impl<H: Copy + Debug> Reconciler<H> {
    pub fn new(slide_duration: Duration) -> Self {
        Self {
            tracked: HashMap::new(),
            slide_duration,
            last_updated_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn get(&self, key: &VehicleKey) -> Option<&TrackedVehicle<H>> {
        self.tracked.get(key)
    }

    pub fn contains(&self, key: &VehicleKey) -> bool {
        self.tracked.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VehicleKey, &TrackedVehicle<H>)> {
        self.tracked.iter()
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.tracked.values().map(|t| &t.vehicle)
    }

    /// Completion time of the last reconciliation pass.
    pub fn last_updated_at(&self) -> Option<Instant> {
        self.last_updated_at
    }

    /// Whether the last update is older than `threshold`. Never-updated state
    /// is not stale: there is nothing on screen to replace.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        self.last_updated_at
            .map(|at| now.saturating_duration_since(at) > threshold)
            .unwrap_or(false)
    }

    /// Apply one snapshot. See the module docs for the algorithm.
    ///
    /// New vehicles that do not belong to the active selection are hidden
    /// immediately, so they never flash onto the map. Known vehicles whose
    /// attributes changed have their visibility re-evaluated the same way.
    pub fn reconcile<S, F>(
        &mut self,
        snapshot: &[Vehicle],
        mode: ReconcileMode,
        selection: &SelectionState,
        surface: &mut S,
        frames: &mut F,
        now: Instant,
    ) -> ReconcileReport
    where
        S: MarkerSurface<Handle = H>,
        F: FrameScheduler,
    {
        let mut report = ReconcileReport::default();

        if mode == ReconcileMode::Replace {
            report.cleared = self.clear(surface, frames);
        }

        let mut incoming: HashSet<VehicleKey> = HashSet::with_capacity(snapshot.len());

        for vehicle in snapshot {
            let Some(position) = vehicle.position() else {
                report.skipped += 1;
                continue;
            };

            let key = vehicle.key();
            if !incoming.insert(key.clone()) {
                debug!("[Reconciler] Duplicate {} in snapshot, keeping first", key);
                report.skipped += 1;
                continue;
            }

            match self.tracked.get_mut(&key) {
                Some(record) => {
                    let attributes_changed = record.vehicle != *vehicle;
                    record.vehicle = vehicle.clone();

                    if position == record.last_known_position {
                        report.unchanged += 1;
                    } else {
                        let heading = bearing_degrees(&record.last_known_position, &position);
                        record.heading = Some(heading);
                        record.last_known_position = position;
                        record.animator.slide_to(position, self.slide_duration, now, frames);
                        report.moved.push(key);
                    }

                    if attributes_changed {
                        let visible = !selection.hides(&record.vehicle);
                        if let Some(marker) = record.animator.marker() {
                            surface.update_marker(marker, &record.vehicle, record.heading);
                            // Headsign or route may have moved it in or out of the selected group
                            if visible != record.visible {
                                surface.set_marker_visible(marker, visible);
                            }
                        }
                        record.visible = visible;
                    }
                }
                None => {
                    let marker = surface.create_marker(vehicle, position);
                    let visible = !selection.hides(vehicle);
                    if !visible {
                        surface.set_marker_visible(marker, false);
                    }

                    self.tracked.insert(
                        key.clone(),
                        TrackedVehicle {
                            vehicle: vehicle.clone(),
                            animator: PositionAnimator::new(key.clone(), marker, position),
                            last_known_position: position,
                            heading: None,
                            visible,
                        },
                    );
                    report.created.push(key);
                }
            }
        }

        let gone: Vec<VehicleKey> = self
            .tracked
            .keys()
            .filter(|key| !incoming.contains(*key))
            .cloned()
            .collect();
        for key in gone {
            if let Some(mut record) = self.tracked.remove(&key) {
                if let Some(marker) = record.animator.stop(frames) {
                    surface.remove_marker(marker);
                }
                report.removed.push(key);
            }
        }

        self.last_updated_at = Some(now);

        info!(
            "[Reconciler] {:?}: {} created, {} moved, {} unchanged, {} removed, {} skipped, {} cleared ({} tracked)",
            mode,
            report.created.len(),
            report.moved.len(),
            report.unchanged,
            report.removed.len(),
            report.skipped,
            report.cleared,
            self.tracked.len()
        );

        report
    }

    /// Stop every animator and remove every marker. Returns how many were dropped.
    pub fn clear<S, F>(&mut self, surface: &mut S, frames: &mut F) -> usize
    where
        S: MarkerSurface<Handle = H>,
        F: FrameScheduler,
    {
        let count = self.tracked.len();
        for (_, mut record) in self.tracked.drain() {
            if let Some(marker) = record.animator.stop(frames) {
                surface.remove_marker(marker);
            }
        }
        count
    }

    /// Deliver a frame callback to the animator for `key`.
    pub fn on_frame<S, F>(
        &mut self,
        key: &VehicleKey,
        frame: FrameId,
        now: Instant,
        surface: &mut S,
        frames: &mut F,
    ) -> FrameOutcome
    where
        S: MarkerSurface<Handle = H>,
        F: FrameScheduler,
    {
        match self.tracked.get_mut(key) {
            Some(record) => record.animator.on_frame(frame, now, surface, frames),
            None => FrameOutcome::Ignored,
        }
    }

    /// Set every marker's visibility from `visible_if`. Only markers whose
    /// visibility actually changes are touched. Returns the number changed.
    pub fn apply_visibility<S, P>(&mut self, surface: &mut S, visible_if: P) -> usize
    where
        S: MarkerSurface<Handle = H>,
        P: Fn(&Vehicle) -> bool,
    {
        let mut changed = 0;
        for record in self.tracked.values_mut() {
            let visible = visible_if(&record.vehicle);
            if visible == record.visible {
                continue;
            }
            if let Some(marker) = record.animator.marker() {
                surface.set_marker_visible(marker, visible);
            }
            record.visible = visible;
            changed += 1;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animator::FrameQueue;
    use crate::surface::{MarkerId, RecordingSurface};
    use crate::GroupKey;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn vehicle(id: &str, lat: f64, lng: f64) -> Vehicle {
        Vehicle::new(id, "")
            .with_route("1", "Downtown")
            .with_location(GpsPoint::new(lat, lng))
    }

    struct Harness {
        reconciler: Reconciler<MarkerId>,
        surface: RecordingSurface,
        frames: FrameQueue,
        selection: SelectionState,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                reconciler: Reconciler::default(),
                surface: RecordingSurface::new(),
                frames: FrameQueue::new(),
                selection: SelectionState::default(),
                now: Instant::now(),
            }
        }

        fn apply(&mut self, snapshot: &[Vehicle], mode: ReconcileMode) -> ReconcileReport {
            self.now += Duration::from_secs(60);
            self.reconciler.reconcile(
                snapshot,
                mode,
                &self.selection,
                &mut self.surface,
                &mut self.frames,
                self.now,
            )
        }
    }

    #[test]
    fn test_creates_markers_for_new_vehicles() {
        let mut h = Harness::new();
        let report = h.apply(&[vehicle("A", 10.0, 20.0), vehicle("B", 11.0, 21.0)], ReconcileMode::Incremental);

        assert_eq!(report.created.len(), 2);
        assert_eq!(h.reconciler.len(), 2);
        assert_eq!(h.surface.marker_count(), 2);
        // New markers are placed, not animated
        assert!(h.frames.is_empty());
        assert_eq!(h.reconciler.get(&VehicleKey::new("A", "")).and_then(|t| t.heading()), None);
    }

    #[test]
    fn test_positionless_vehicles_are_skipped() {
        let mut h = Harness::new();
        h.apply(&[vehicle("A", 10.0, 20.0)], ReconcileMode::Incremental);

        // A loses its position: it no longer counts as present and is removed
        let report = h.apply(&[Vehicle::new("A", ""), Vehicle::new("B", "")], ReconcileMode::Incremental);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.removed, vec![VehicleKey::new("A", "")]);
        assert!(h.reconciler.is_empty());
        assert_eq!(h.surface.marker_count(), 0);
    }

    #[test]
    fn test_moving_vehicle_slides_and_gets_heading() {
        let mut h = Harness::new();
        h.apply(&[vehicle("A", 10.0, 20.0)], ReconcileMode::Incremental);
        let report = h.apply(&[vehicle("A", 10.001, 20.0)], ReconcileMode::Incremental);

        assert_eq!(report.moved, vec![VehicleKey::new("A", "")]);
        assert!(report.created.is_empty());
        assert_eq!(h.reconciler.len(), 1);
        assert_eq!(h.frames.len(), 1);

        let record = h.reconciler.get(&VehicleKey::new("A", "")).unwrap();
        let expected = bearing_degrees(&GpsPoint::new(10.0, 20.0), &GpsPoint::new(10.001, 20.0));
        assert!(approx_eq(record.heading().unwrap(), expected, 1e-9));
        assert!(record.heading().unwrap() < 1e-6); // due north
        assert_eq!(record.last_known_position(), GpsPoint::new(10.001, 20.0));
        assert_eq!(record.animator().animation().unwrap().end_point, GpsPoint::new(10.001, 20.0));
    }

    #[test]
    fn test_identical_snapshot_is_idempotent() {
        let mut h = Harness::new();
        let snapshot = vec![vehicle("A", 10.0, 20.0), vehicle("B", 11.0, 21.0)];
        h.apply(&snapshot, ReconcileMode::Incremental);
        h.apply(&[vehicle("A", 10.5, 20.0), vehicle("B", 11.0, 21.0)], ReconcileMode::Incremental);
        let stats_before = h.surface.stats();
        let frames_before = h.frames.len();

        let report = h.apply(&[vehicle("A", 10.5, 20.0), vehicle("B", 11.0, 21.0)], ReconcileMode::Incremental);

        assert!(report.is_noop());
        assert_eq!(report.unchanged, 2);
        assert_eq!(h.surface.stats().created, stats_before.created);
        assert_eq!(h.surface.stats().removed, stats_before.removed);
        assert_eq!(h.frames.len(), frames_before);
    }

    #[test]
    fn test_removed_vehicle_stops_animator_once() {
        let mut h = Harness::new();
        h.apply(&[vehicle("A", 10.0, 20.0), vehicle("B", 11.0, 21.0)], ReconcileMode::Incremental);
        h.apply(&[vehicle("A", 10.1, 20.0), vehicle("B", 11.1, 21.0)], ReconcileMode::Incremental);
        assert_eq!(h.frames.len(), 2);

        let report = h.apply(&[vehicle("B", 11.1, 21.0)], ReconcileMode::Incremental);
        assert_eq!(report.removed, vec![VehicleKey::new("A", "")]);
        assert_eq!(h.surface.stats().removed, 1);
        // A's pending frame is cancelled, B's survives
        assert_eq!(h.frames.len(), 1);

        let report = h.apply(&[vehicle("B", 11.1, 21.0)], ReconcileMode::Incremental);
        assert!(report.removed.is_empty());
        assert_eq!(h.surface.stats().removed, 1);
    }

    #[test]
    fn test_frame_for_removed_vehicle_is_ignored() {
        let mut h = Harness::new();
        h.apply(&[vehicle("A", 10.0, 20.0)], ReconcileMode::Incremental);
        h.apply(&[vehicle("A", 10.1, 20.0)], ReconcileMode::Incremental);
        let due = h.frames.take_due();
        h.apply(&[], ReconcileMode::Incremental);

        for (frame, key) in due {
            let outcome = h.reconciler.on_frame(&key, frame, h.now, &mut h.surface, &mut h.frames);
            assert_eq!(outcome, FrameOutcome::Ignored);
        }
        assert_eq!(h.surface.stats().moved, 0);
    }

    #[test]
    fn test_same_vehicle_new_trip_is_distinct() {
        let mut h = Harness::new();
        let first = Vehicle::new("bus", "trip-1").with_location(GpsPoint::new(1.0, 1.0));
        let second = Vehicle::new("bus", "trip-2").with_location(GpsPoint::new(1.0, 1.0));
        h.apply(&[first], ReconcileMode::Incremental);
        let report = h.apply(&[second], ReconcileMode::Incremental);

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.removed.len(), 1);
    }

    #[test]
    fn test_replace_clears_then_places_without_animation() {
        let mut h = Harness::new();
        h.apply(&[vehicle("A", 10.0, 20.0), vehicle("B", 11.0, 21.0)], ReconcileMode::Incremental);

        let report = h.apply(&[vehicle("A", 10.2, 20.0)], ReconcileMode::Replace);
        assert_eq!(report.cleared, 2);
        assert_eq!(report.created, vec![VehicleKey::new("A", "")]);
        assert!(report.removed.is_empty());
        assert!(h.frames.is_empty());
        assert_eq!(h.surface.marker_count(), 1);
        assert_eq!(h.surface.stats().removed, 2);
    }

    #[test]
    fn test_new_vehicle_hidden_while_other_group_selected() {
        let mut h = Harness::new();
        h.selection = SelectionState::selecting(
            Vehicle::new("X", "").with_route("5", "Fulton"),
        );
        let related = Vehicle::new("R", "").with_route("5", "Fulton").with_location(GpsPoint::new(1.0, 1.0));
        let unrelated = vehicle("U", 2.0, 2.0);
        h.apply(&[related, unrelated], ReconcileMode::Incremental);

        assert!(h.reconciler.get(&VehicleKey::new("R", "")).unwrap().is_visible());
        assert!(!h.reconciler.get(&VehicleKey::new("U", "")).unwrap().is_visible());
        assert_eq!(h.surface.visible_count(), 1);
    }

    #[test]
    fn test_group_change_updates_visibility_under_selection() {
        let mut h = Harness::new();
        h.selection = SelectionState::selecting(Vehicle::new("X", "").with_route("5", "Fulton"));
        h.apply(&[vehicle("U", 2.0, 2.0).with_route("9", "Elsewhere")], ReconcileMode::Incremental);
        assert_eq!(h.surface.visible_count(), 0);

        // U now runs the selected route
        h.apply(&[vehicle("U", 2.0, 2.0).with_route("5", "Fulton")], ReconcileMode::Incremental);
        assert!(h.reconciler.get(&VehicleKey::new("U", "")).unwrap().is_visible());
        assert_eq!(h.surface.visible_count(), 1);

        // ...and leaves it again
        h.apply(&[vehicle("U", 2.0, 2.0).with_route("9", "Elsewhere")], ReconcileMode::Incremental);
        assert!(!h.reconciler.get(&VehicleKey::new("U", "")).unwrap().is_visible());
        assert_eq!(h.surface.visible_count(), 0);
    }

    #[test]
    fn test_attribute_change_without_selection_stays_visible() {
        let mut h = Harness::new();
        h.apply(&[vehicle("A", 1.0, 1.0)], ReconcileMode::Incremental);
        h.apply(&[vehicle("A", 1.0, 1.0).with_colors("FF0000", "000000")], ReconcileMode::Incremental);
        assert_eq!(h.surface.visible_count(), 1);
        assert_eq!(h.surface.stats().visibility_changes, 0);
    }

    #[test]
    fn test_apply_visibility_touches_only_changes() {
        let mut h = Harness::new();
        h.apply(&[vehicle("A", 1.0, 1.0), vehicle("B", 2.0, 2.0)], ReconcileMode::Incremental);

        let group = GroupKey::new("Elsewhere", "9");
        let changed = h.reconciler.apply_visibility(&mut h.surface, |v| v.in_group(&group));
        assert_eq!(changed, 2);
        let changed = h.reconciler.apply_visibility(&mut h.surface, |v| v.in_group(&group));
        assert_eq!(changed, 0);
        assert_eq!(h.surface.stats().visibility_changes, 2);
    }

    #[test]
    fn test_staleness() {
        let mut h = Harness::new();
        assert!(!h.reconciler.is_stale(h.now, Duration::from_secs(120)));
        h.apply(&[vehicle("A", 1.0, 1.0)], ReconcileMode::Incremental);
        assert_eq!(h.reconciler.last_updated_at(), Some(h.now));
        assert!(!h.reconciler.is_stale(h.now + Duration::from_secs(120), Duration::from_secs(120)));
        assert!(h.reconciler.is_stale(h.now + Duration::from_secs(121), Duration::from_secs(120)));
    }
}
