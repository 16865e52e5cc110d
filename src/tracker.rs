//! # Tracker
//!
//! Ties the engine together: one owned [`ApplicationState`] holding the tracked
//! vehicles, selection, auto-play and refresh bookkeeping, plus the marker
//! surface they render to.
//!
//! The synchronous methods are the whole behaviour and work with any host
//! event loop (a browser, a game loop, a test). With the `runtime` feature,
//! [`Tracker::run`] drives them from tokio timers and a channel of
//! [`TrackerEvent`]s.
//!
//! ## Refresh policy
//! - Snapshots are fetched every `refresh_interval` while the user is active.
//! - Going inactive (page hidden) pauses refreshes. Coming back triggers an
//!   immediate refresh: incremental if the last update is recent, a full
//!   replace if it is older than `stale_after`.
//! - A replace refresh first places markers at the previous cycle's positions,
//!   waits `settle_delay`, then applies the live snapshot so every marker
//!   visibly slides to where it is now.

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::animator::{FrameQueue, DEFAULT_SLIDE_DURATION};
use crate::arrows::{place_arrows, DEFAULT_ARROW_SPACING_METERS};
use crate::autoplay::{AutoPlayInterval, AutoPlaySequencer};
use crate::feed::{FeedError, TripPath};
use crate::places::Place;
use crate::reconciler::{ReconcileMode, ReconcileReport, Reconciler};
use crate::selection::{self, SelectionChange, SelectionMode, SelectionState};
use crate::surface::{MarkerSurface, PathRenderer};
use crate::{Vehicle, VehicleKey};

/// Timing and layout knobs.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Time between snapshot fetches while active.
    /// Default: 60 s
    pub refresh_interval: Duration,

    /// Inactivity after which a returning user gets a full replace instead of
    /// an incremental update.
    /// Default: 2 minutes
    pub stale_after: Duration,

    /// How long a marker takes to slide to its new position.
    /// Default: 60 s (one refresh interval, so markers are always moving)
    pub slide_duration: Duration,

    /// Pause between placing old positions and applying the live snapshot.
    /// Default: 1 s
    pub settle_delay: Duration,

    /// Distance between direction arrows on a selected trip's path.
    /// Default: 1000 m
    pub arrow_spacing_meters: f64,

    /// Frame cadence for hosts without a native refresh callback.
    /// Default: 16 ms
    pub frame_interval: Duration,

    /// How long auto-play holds each selection.
    /// Default: 10 s
    pub autoplay_interval: AutoPlayInterval,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(2 * 60),
            slide_duration: DEFAULT_SLIDE_DURATION,
            settle_delay: Duration::from_secs(1),
            arrow_spacing_meters: DEFAULT_ARROW_SPACING_METERS,
            frame_interval: Duration::from_millis(16),
            autoplay_interval: AutoPlayInterval::default(),
        }
    }
}

/// Everything the page used to keep in globals, owned in one place.
#[derive(Debug)]
pub struct ApplicationState<H> {
    pub vehicles: Reconciler<H>,
    pub selection: SelectionState,
    /// Path and schedule of the selected trip, once fetched
    pub schedule: Option<TripPath>,
    pub autoplay: AutoPlaySequencer,
    pub place: Place,
    pub user_active: bool,
    pub loading: bool,
    pub frames: FrameQueue,
}

impl<H: Copy + std::fmt::Debug> ApplicationState<H> {
    fn new(config: &TrackerConfig) -> Self {
        Self {
            vehicles: Reconciler::new(config.slide_duration),
            selection: SelectionState::default(),
            schedule: None,
            autoplay: AutoPlaySequencer::new(config.autoplay_interval),
            place: Place::default(),
            user_active: true,
            loading: false,
            frames: FrameQueue::new(),
        }
    }
}

pub struct Tracker<S: MarkerSurface> {
    config: TrackerConfig,
    state: ApplicationState<S::Handle>,
    surface: S,
}

impl<S: MarkerSurface + PathRenderer> Tracker<S> {
    pub fn new(config: TrackerConfig, surface: S) -> Self {
        let state = ApplicationState::new(&config);
        Self { config, state, surface }
    }

    /// Seed auto-play's picks for reproducible runs.
    pub fn with_autoplay_seed(mut self, seed: u64) -> Self {
        self.state.autoplay = AutoPlaySequencer::with_seed(self.config.autoplay_interval, seed);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> &ApplicationState<S::Handle> {
        &self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn place(&self) -> Place {
        self.state.place
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn selected(&self) -> Option<&Vehicle> {
        self.state.selection.selected()
    }

    // ------------------------------------------------------------------------
    // Refresh policy
    // ------------------------------------------------------------------------

    /// Page shown or hidden. Returns the refresh to run now, if any.
    pub fn on_visibility_change(&mut self, hidden: bool, now: Instant) -> Option<ReconcileMode> {
        if hidden {
            self.state.user_active = false;
            debug!("[Tracker] Inactive, pausing refreshes");
            return None;
        }

        self.state.user_active = true;
        self.state.vehicles.last_updated_at()?;

        let mode = if self.state.vehicles.is_stale(now, self.config.stale_after) {
            ReconcileMode::Replace
        } else {
            ReconcileMode::Incremental
        };
        info!("[Tracker] Active again, refreshing ({:?})", mode);
        Some(mode)
    }

    /// URL hash changed. Known places switch region and need a full replace;
    /// unknown hashes keep the current place.
    pub fn navigate(&mut self, hash: &str) -> Option<ReconcileMode> {
        match Place::from_hash(hash) {
            Some(place) => {
                info!("[Tracker] Navigating to {}", place.name);
                self.state.place = place;
                Some(ReconcileMode::Replace)
            }
            None => {
                debug!("[Tracker] Ignoring unknown hash {:?}, staying in {}", hash, self.state.place.name);
                None
            }
        }
    }

    /// Mark a refresh cycle as started. Returns `false` (skip the cycle) while
    /// the user is inactive.
    pub fn begin_refresh(&mut self) -> bool {
        if !self.state.user_active {
            debug!("[Tracker] Skipping refresh, user inactive");
            return false;
        }
        self.state.loading = true;
        true
    }

    /// Reconcile one snapshot against the map.
    pub fn apply_snapshot(&mut self, vehicles: &[Vehicle], mode: ReconcileMode, now: Instant) -> ReconcileReport {
        let state = &mut self.state;
        state.vehicles.reconcile(
            vehicles,
            mode,
            &state.selection,
            &mut self.surface,
            &mut state.frames,
            now,
        )
    }

    pub fn finish_refresh(&mut self) {
        self.state.loading = false;
    }

    /// A fetch failed: log it and leave everything on screen untouched.
    pub fn refresh_failed(&mut self, err: &FeedError) {
        error!("[Tracker] Refresh of {} failed, keeping current vehicles: {}", self.state.place.name, err);
    }

    /// Deliver every frame requested so far. Returns how many were delivered.
    pub fn pump_frames(&mut self, now: Instant) -> usize {
        let due = self.state.frames.take_due();
        let count = due.len();
        for (frame, key) in due {
            self.state
                .vehicles
                .on_frame(&key, frame, now, &mut self.surface, &mut self.state.frames);
        }
        count
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// User clicked a vehicle marker. Toggles: selects its group, or clears
    /// if something is already selected. Returns the trip whose path should
    /// be fetched.
    pub fn click_vehicle(&mut self, key: &VehicleKey) -> Option<String> {
        if self.state.autoplay.stop() {
            debug!("[Tracker] Click took over from auto-play");
        }

        let Some(vehicle) = self.state.vehicles.get(key).map(|record| record.vehicle().clone()) else {
            if self.state.selection.is_active() {
                self.show_all();
            } else {
                warn!("[Tracker] Click on unknown vehicle {}", key);
            }
            return None;
        };

        self.select(&vehicle, SelectionMode::Interactive)
    }

    /// Map background click or Escape: show everything again.
    pub fn show_all(&mut self) {
        selection::clear(&mut self.state.selection, &mut self.state.vehicles, &mut self.surface);
        self.clear_schedule();
    }

    /// Draw the fetched path for the selected trip. Responses for a trip that
    /// is no longer selected are dropped. Returns the number of arrows placed.
    pub fn show_path(&mut self, path: TripPath) -> Option<usize> {
        let color = match self.state.selection.selected() {
            Some(selected) if selected.trip_id == path.trip_id => selected.route_color.clone(),
            _ => {
                debug!("[Tracker] Dropping path for {}, selection moved on", path.trip_id);
                return None;
            }
        };

        self.surface.clear_path();
        self.surface.clear_arrows();

        let mut placed = 0;
        if !path.points.is_empty() {
            self.surface.draw_path(&path.points, &color);
            for arrow in place_arrows(&path.points, self.config.arrow_spacing_meters) {
                self.surface.place_arrow_marker(&arrow, &color);
                placed += 1;
            }
        }

        info!(
            "[Tracker] Showing trip {} ({} points, {} arrows, {} operated by {})",
            path.trip_id,
            path.points.len(),
            placed,
            path.route_type,
            path.agency_display_name
        );
        self.state.schedule = Some(path);
        Some(placed)
    }

    // ------------------------------------------------------------------------
    // Auto-play
    // ------------------------------------------------------------------------

    /// Start cycling through vehicles. Returns the first trip to fetch.
    pub fn start_autoplay(&mut self, now: Instant) -> Option<String> {
        let next = self.state.autoplay.start(
            now,
            self.state.vehicles.vehicles(),
            self.state.selection.selected(),
        )?;
        self.select(&next, SelectionMode::Sequenced)
    }

    /// Skip to the next vehicle right away. Returns the trip to fetch.
    pub fn advance_autoplay(&mut self, now: Instant) -> Option<String> {
        let next = self.state.autoplay.advance(
            now,
            self.state.vehicles.vehicles(),
            self.state.selection.selected(),
        )?;
        self.select(&next, SelectionMode::Sequenced)
    }

    /// Advance if the current selection has been held long enough.
    pub fn poll_autoplay(&mut self, now: Instant) -> Option<String> {
        if self.state.autoplay.is_due(now) {
            self.advance_autoplay(now)
        } else {
            None
        }
    }

    /// Stop cycling and show every vehicle again.
    pub fn stop_autoplay(&mut self) {
        if self.state.autoplay.stop() {
            self.show_all();
        }
    }

    pub fn set_autoplay_interval(&mut self, interval: AutoPlayInterval) {
        self.state.autoplay.set_interval(interval);
    }

    fn select(&mut self, vehicle: &Vehicle, mode: SelectionMode) -> Option<String> {
        let change = selection::request(
            &mut self.state.selection,
            &mut self.state.vehicles,
            &mut self.surface,
            vehicle,
            mode,
        );
        self.clear_schedule();

        match change {
            SelectionChange::Selected(_) => Some(vehicle.trip_id.clone()),
            SelectionChange::Cleared => None,
        }
    }

    fn clear_schedule(&mut self) {
        self.state.schedule = None;
        self.surface.clear_path();
        self.surface.clear_arrows();
    }
}

// ============================================================================
// Async Driver
// ============================================================================

#[cfg(feature = "runtime")]
pub use driver::TrackerEvent;

#[cfg(feature = "runtime")]
mod driver {
    use super::*;
    use crate::feed::VehicleFeed;
    use tokio::sync::mpsc;
    use tokio::time::MissedTickBehavior;

    /// Input from the host page.
    #[derive(Debug, Clone, PartialEq)]
    pub enum TrackerEvent {
        VisibilityChanged { hidden: bool },
        HashChanged(String),
        VehicleClicked(VehicleKey),
        /// Background click or Escape
        MapClicked,
        StartAutoPlay,
        StopAutoPlay,
        AdvanceAutoPlay,
        SetAutoPlayInterval(AutoPlayInterval),
        Shutdown,
    }

    fn now() -> Instant {
        tokio::time::Instant::now().into_std()
    }

    impl<S: MarkerSurface + PathRenderer> Tracker<S> {
        /// Fetch and apply one snapshot.
        ///
        /// Returns `Ok(None)` when skipped because the user is inactive. On
        /// error nothing has been applied.
        pub async fn refresh<F: VehicleFeed>(
            &mut self,
            feed: &F,
            mode: ReconcileMode,
        ) -> Result<Option<ReconcileReport>, FeedError> {
            if !self.begin_refresh() {
                return Ok(None);
            }

            let include_old = mode == ReconcileMode::Replace;
            let start = Instant::now();
            let snapshot = match feed.fetch_snapshot(&self.state.place, include_old).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    self.refresh_failed(&err);
                    return Err(err);
                }
            };
            debug!(
                "[Tracker] Fetched {} vehicles ({} old) in {:?}",
                snapshot.vehicles.len(),
                snapshot.old_vehicles.len(),
                start.elapsed()
            );

            let live_mode = if include_old {
                self.apply_snapshot(&snapshot.old_vehicles, ReconcileMode::Replace, now());
                tokio::time::sleep(self.config.settle_delay).await;
                ReconcileMode::Incremental
            } else {
                mode
            };

            let report = self.apply_snapshot(&snapshot.vehicles, live_mode, now());
            self.finish_refresh();
            Ok(Some(report))
        }

        /// Fetch and draw the path for `trip_id`. Failures keep the selection
        /// and draw nothing.
        pub async fn load_path<F: VehicleFeed>(&mut self, feed: &F, trip_id: String) -> Option<usize> {
            match feed.fetch_path(&trip_id).await {
                Ok(path) => self.show_path(path),
                Err(err) => {
                    error!("[Tracker] Fetching path for trip {} failed: {}", trip_id, err);
                    None
                }
            }
        }

        /// Drive the tracker until [`TrackerEvent::Shutdown`] or the sender is dropped.
        ///
        /// Does a full replace refresh immediately, then refreshes on
        /// `refresh_interval`, pumps frames on `frame_interval` and advances
        /// auto-play when due.
        pub async fn run<F: VehicleFeed>(mut self, feed: &F, mut events: mpsc::Receiver<TrackerEvent>) -> Self {
            let mut refresh = tokio::time::interval(self.config.refresh_interval);
            refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut frames = tokio::time::interval(self.config.frame_interval);
            frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

            refresh.tick().await;
            let _ = self.refresh(feed, ReconcileMode::Replace).await;

            loop {
                let autoplay_deadline = self.state.autoplay.deadline();
                let autoplay_due = async move {
                    match autoplay_deadline {
                        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
                        None => std::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    _ = refresh.tick() => {
                        let _ = self.refresh(feed, ReconcileMode::Incremental).await;
                    }
                    _ = frames.tick() => {
                        self.pump_frames(now());
                    }
                    _ = autoplay_due => {
                        if let Some(trip_id) = self.poll_autoplay(now()) {
                            self.load_path(feed, trip_id).await;
                        }
                    }
                    event = events.recv() => match event {
                        None | Some(TrackerEvent::Shutdown) => break,
                        Some(event) => self.handle_event(feed, event).await,
                    },
                }
            }

            info!("[Tracker] Stopped with {} vehicles tracked", self.state.vehicles.len());
            self
        }

        async fn handle_event<F: VehicleFeed>(&mut self, feed: &F, event: TrackerEvent) {
            debug!("[Tracker] Event {:?}", event);
            match event {
                TrackerEvent::VisibilityChanged { hidden } => {
                    if let Some(mode) = self.on_visibility_change(hidden, now()) {
                        let _ = self.refresh(feed, mode).await;
                    }
                }
                TrackerEvent::HashChanged(hash) => {
                    if let Some(mode) = self.navigate(&hash) {
                        let _ = self.refresh(feed, mode).await;
                    }
                }
                TrackerEvent::VehicleClicked(key) => {
                    if let Some(trip_id) = self.click_vehicle(&key) {
                        self.load_path(feed, trip_id).await;
                    }
                }
                TrackerEvent::MapClicked => self.show_all(),
                TrackerEvent::StartAutoPlay => {
                    if let Some(trip_id) = self.start_autoplay(now()) {
                        self.load_path(feed, trip_id).await;
                    }
                }
                TrackerEvent::StopAutoPlay => self.stop_autoplay(),
                TrackerEvent::AdvanceAutoPlay => {
                    if let Some(trip_id) = self.advance_autoplay(now()) {
                        self.load_path(feed, trip_id).await;
                    }
                }
                TrackerEvent::SetAutoPlayInterval(interval) => self.set_autoplay_interval(interval),
                TrackerEvent::Shutdown => {}
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(all(test, feature = "runtime"))]
mod driver_tests {
    use super::*;
    use crate::feed::{FeedSnapshot, VehicleFeed};
    use crate::surface::RecordingSurface;
    use crate::GpsPoint;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct ScriptedFeed {
        snapshots: Mutex<Vec<Result<FeedSnapshot, FeedError>>>,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedFeed {
        fn new(mut snapshots: Vec<Result<FeedSnapshot, FeedError>>) -> Self {
            snapshots.reverse();
            Self { snapshots: Mutex::new(snapshots), calls: Mutex::new(Vec::new()) }
        }
    }

    impl VehicleFeed for ScriptedFeed {
        async fn fetch_snapshot(&self, place: &Place, include_old: bool) -> Result<FeedSnapshot, FeedError> {
            self.calls.lock().unwrap().push((place.name.to_string(), include_old));
            self.snapshots
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(FeedError::Unavailable("script exhausted".to_string())))
        }

        async fn fetch_path(&self, trip_id: &str) -> Result<TripPath, FeedError> {
            Ok(TripPath {
                trip_id: trip_id.to_string(),
                points: (0..=20).map(|i| GpsPoint::new(i as f64 * 0.001, 0.0)).collect(),
                ..TripPath::default()
            })
        }
    }

    fn at(id: &str, lat: f64) -> Vehicle {
        Vehicle::new(id, "t").with_route("1", "Inbound").with_location(GpsPoint::new(lat, 0.0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_refresh_settles_then_animates() {
        let feed = ScriptedFeed::new(vec![Ok(FeedSnapshot {
            vehicles: vec![at("a", 1.001), at("b", 2.0)],
            old_vehicles: vec![at("a", 1.0)],
        })]);
        let mut tracker = Tracker::new(TrackerConfig::default(), RecordingSurface::new());

        let report = tracker.refresh(&feed, ReconcileMode::Replace).await.unwrap().unwrap();

        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.created.len(), 1);
        assert_eq!(tracker.surface().marker_count(), 2);
        assert_eq!(tracker.state().frames.len(), 1);
        assert!(!tracker.is_loading());
        assert_eq!(*feed.calls.lock().unwrap(), vec![("USA".to_string(), true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_leaves_state_untouched() {
        let feed = ScriptedFeed::new(vec![
            Ok(FeedSnapshot { vehicles: vec![at("a", 1.0)], old_vehicles: vec![] }),
            Err(FeedError::Status { status: 503, body: "busy".to_string() }),
        ]);
        let mut tracker = Tracker::new(TrackerConfig::default(), RecordingSurface::new());
        tracker.refresh(&feed, ReconcileMode::Incremental).await.unwrap();
        let updated_at = tracker.state().vehicles.last_updated_at();

        let result = tracker.refresh(&feed, ReconcileMode::Incremental).await;
        assert!(matches!(result, Err(FeedError::Status { status: 503, .. })));
        assert_eq!(tracker.surface().marker_count(), 1);
        assert_eq!(tracker.state().vehicles.last_updated_at(), updated_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_user_skips_fetch() {
        let feed = ScriptedFeed::new(vec![]);
        let mut tracker = Tracker::new(TrackerConfig::default(), RecordingSurface::new());
        tracker.on_visibility_change(true, Instant::now());

        assert!(tracker.refresh(&feed, ReconcileMode::Incremental).await.unwrap().is_none());
        assert!(feed.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_refreshes_and_handles_events() {
        let feed = ScriptedFeed::new(vec![
            Ok(FeedSnapshot { vehicles: vec![at("a", 1.0)], old_vehicles: vec![] }),
            Ok(FeedSnapshot { vehicles: vec![at("a", 1.001)], old_vehicles: vec![] }),
        ]);
        let tracker = Tracker::new(TrackerConfig::default(), RecordingSurface::new());
        let (tx, rx) = mpsc::channel(8);

        let script = async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            tx.send(TrackerEvent::VehicleClicked(VehicleKey::new("a", "t"))).await.unwrap();
            tokio::time::sleep(Duration::from_secs(120)).await;
            tx.send(TrackerEvent::Shutdown).await.unwrap();
        };

        let (tracker, ()) = tokio::join!(tracker.run(&feed, rx), script);

        let calls = feed.calls.lock().unwrap().clone();
        assert_eq!(calls[0], ("USA".to_string(), true));
        assert_eq!(calls[1], ("USA".to_string(), false));
        assert_eq!(tracker.surface().marker_count(), 1);
        assert!(tracker.selected().is_some());
        // 20 segments of ~111m at 1000m spacing: arrows on the 10th and 20th
        assert_eq!(tracker.surface().arrows().len(), 2);
        let record = tracker.state().vehicles.get(&VehicleKey::new("a", "t")).unwrap();
        assert_eq!(record.animator().displayed_position(), GpsPoint::new(1.001, 0.0));
    }
}
