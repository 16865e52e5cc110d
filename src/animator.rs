//! # Position Animation
//!
//! Time-based, restartable interpolation of one marker's on-screen position.
//!
//! Each [`PositionAnimator`] owns exactly one marker handle. A call to
//! [`PositionAnimator::slide_to`] snapshots the point currently displayed
//! (which may be halfway through a previous slide) and eases from there to the
//! new target, so back-to-back updates never jump.
//!
//! Frames are not driven by a timer inside the animator. Instead the animator
//! asks a [`FrameScheduler`] for a callback on the next display refresh and
//! re-requests one from every frame until the slide completes. In a browser the
//! scheduler wraps `requestAnimationFrame`; headless hosts use [`FrameQueue`]
//! and drain it on a short fixed interval.
//!
//! The displayed point is a pure function of the [`AnimationState`] and the
//! wall-clock time passed to the frame: there is no other mutable animation
//! variable.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::geo_utils::lerp;
use crate::surface::MarkerSurface;
use crate::{GpsPoint, VehicleKey};

/// Default slide duration, matching the feed's 60 s refresh cadence.
pub const DEFAULT_SLIDE_DURATION: Duration = Duration::from_secs(60);

/// Ease-in-out curve applied to linear progress in `[0, 1]`.
///
/// Quadratic on the way in, cubic on the way out:
/// `2p²` below one half, `1 - (-2p + 2)³ / 2` above.
#[inline]
pub fn ease_in_out(progress: f64) -> f64 {
    if progress < 0.5 {
        2.0 * progress * progress
    } else {
        1.0 - (-2.0 * progress + 2.0).powi(3) / 2.0
    }
}

// =============================================================================
// Frame Scheduling
// =============================================================================

/// Identifies one requested frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

/// "Call me back on the next display refresh" capability.
///
/// The host invokes the engine's frame entry point with the same `key` and
/// [`FrameId`] once the refresh happens. Frames that were cancelled, or that
/// no longer match the animator's pending frame, are ignored by the animator,
/// so hosts may deliver a cancelled frame without harm.
pub trait FrameScheduler {
    fn request_frame(&mut self, key: &VehicleKey) -> FrameId;
    fn cancel_frame(&mut self, frame: FrameId);
}

/// Queue-backed scheduler for hosts without a native refresh callback.
///
/// Requested frames accumulate until the host drains them with
/// [`FrameQueue::take_due`], typically every ~16 ms.
#[derive(Debug, Default)]
pub struct FrameQueue {
    next_id: u64,
    /// Ordered by id, so batches come out in request order
    pending: BTreeMap<FrameId, VehicleKey>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every frame requested so far. Frames requested while the caller
    /// processes this batch land in the next batch.
    pub fn take_due(&mut self) -> Vec<(FrameId, VehicleKey)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

impl FrameScheduler for FrameQueue {
    fn request_frame(&mut self, key: &VehicleKey) -> FrameId {
        self.next_id += 1;
        let id = FrameId(self.next_id);
        self.pending.insert(id, key.clone());
        id
    }

    fn cancel_frame(&mut self, frame: FrameId) {
        self.pending.remove(&frame);
    }
}

// =============================================================================
// Animation State
// =============================================================================

/// One slide from `start_point` to `end_point`. Replaced, never merged, on
/// every new target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationState {
    pub start_time: Instant,
    pub start_point: GpsPoint,
    pub end_point: GpsPoint,
    pub duration: Duration,
}

impl AnimationState {
    /// Linear progress in `[0, 1]`. A zero duration is complete immediately.
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start_time);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Eased position at `now`.
    pub fn position_at(&self, now: Instant) -> GpsPoint {
        let progress = self.progress(now);
        if progress >= 1.0 {
            return self.end_point;
        }
        lerp(&self.start_point, &self.end_point, ease_in_out(progress))
    }
}

/// What a delivered frame did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Marker moved; another frame has been requested.
    Continued(GpsPoint),
    /// Marker reached the target; no further frames are requested.
    Finished(GpsPoint),
    /// Frame was stale, cancelled, or the animator is stopped.
    Ignored,
}

// =============================================================================
// Animator
// =============================================================================

/// Animates a single marker.
#[derive(Debug)]
pub struct PositionAnimator<H> {
    key: VehicleKey,
    marker: Option<H>,
    displayed: GpsPoint,
    animation: Option<AnimationState>,
    pending_frame: Option<FrameId>,
}

impl<H: Copy> PositionAnimator<H> {
    /// Wrap a marker that is already displayed at `position`.
    pub fn new(key: VehicleKey, marker: H, position: GpsPoint) -> Self {
        Self {
            key,
            marker: Some(marker),
            displayed: position,
            animation: None,
            pending_frame: None,
        }
    }

    pub fn key(&self) -> &VehicleKey {
        &self.key
    }

    /// Marker handle, or `None` once stopped.
    pub fn marker(&self) -> Option<H> {
        self.marker
    }

    /// Point most recently pushed to the marker.
    pub fn displayed_position(&self) -> GpsPoint {
        self.displayed
    }

    pub fn animation(&self) -> Option<&AnimationState> {
        self.animation.as_ref()
    }

    /// Whether a frame callback is outstanding.
    pub fn is_animating(&self) -> bool {
        self.pending_frame.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.marker.is_none()
    }

    /// Start easing from the displayed point to `target` over `duration`.
    ///
    /// Any in-flight slide is cancelled first. Returns `false` (and does
    /// nothing) when the animator has been stopped.
    pub fn slide_to<F: FrameScheduler>(
        &mut self,
        target: GpsPoint,
        duration: Duration,
        now: Instant,
        frames: &mut F,
    ) -> bool {
        if self.marker.is_none() {
            debug!("[Animator {}] slide_to after stop ignored", self.key);
            return false;
        }

        if let Some(frame) = self.pending_frame.take() {
            frames.cancel_frame(frame);
        }

        self.animation = Some(AnimationState {
            start_time: now,
            start_point: self.displayed,
            end_point: target,
            duration,
        });
        self.pending_frame = Some(frames.request_frame(&self.key));
        true
    }

    /// Advance to `now`, move the marker and re-arm if not yet complete.
    pub fn on_frame<S, F>(
        &mut self,
        frame: FrameId,
        now: Instant,
        surface: &mut S,
        frames: &mut F,
    ) -> FrameOutcome
    where
        S: MarkerSurface<Handle = H>,
        F: FrameScheduler,
    {
        if self.pending_frame != Some(frame) {
            return FrameOutcome::Ignored;
        }
        self.pending_frame = None;

        let (Some(marker), Some(animation)) = (self.marker, self.animation) else {
            return FrameOutcome::Ignored;
        };

        let position = animation.position_at(now);
        surface.move_marker(marker, position);
        self.displayed = position;

        if animation.progress(now) < 1.0 {
            self.pending_frame = Some(frames.request_frame(&self.key));
            FrameOutcome::Continued(position)
        } else {
            self.animation = None;
            FrameOutcome::Finished(position)
        }
    }

    /// Cancel any pending frame and make the animator inert.
    ///
    /// Returns the marker handle so the caller can remove it; the animator
    /// never touches the marker again.
    pub fn stop<F: FrameScheduler>(&mut self, frames: &mut F) -> Option<H> {
        if let Some(frame) = self.pending_frame.take() {
            frames.cancel_frame(frame);
        }
        self.animation = None;
        self.marker.take()
    }
}
