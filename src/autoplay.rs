//! Timed auto-play through tracked vehicles.
//!
//! While playing, the sequencer periodically hands the caller a new vehicle to
//! select, preferring one on a different route than the current selection.
//! It only decides *what* and *when*; applying the selection (in
//! [`SelectionMode::Sequenced`](crate::SelectionMode::Sequenced)) and
//! restoring full visibility on stop is the caller's job.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

use crate::Vehicle;

/// How long each auto-play selection is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoPlayInterval {
    #[default]
    TenSeconds,
    OneMinute,
    TenMinutes,
}

impl AutoPlayInterval {
    pub const ALL: [AutoPlayInterval; 3] = [
        AutoPlayInterval::TenSeconds,
        AutoPlayInterval::OneMinute,
        AutoPlayInterval::TenMinutes,
    ];

    pub fn duration(self) -> Duration {
        match self {
            AutoPlayInterval::TenSeconds => Duration::from_secs(10),
            AutoPlayInterval::OneMinute => Duration::from_secs(60),
            AutoPlayInterval::TenMinutes => Duration::from_secs(600),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AutoPlayInterval::TenSeconds => "10s",
            AutoPlayInterval::OneMinute => "1m",
            AutoPlayInterval::TenMinutes => "10m",
        }
    }
}

impl fmt::Display for AutoPlayInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown auto-play interval '{0}' (expected 10s, 1m or 10m)")]
pub struct ParseIntervalError(String);

impl FromStr for AutoPlayInterval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AutoPlayInterval::ALL
            .into_iter()
            .find(|interval| interval.label() == s)
            .ok_or_else(|| ParseIntervalError(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayState {
    Idle,
    Playing { deadline: Instant },
}

#[derive(Debug)]
pub struct AutoPlaySequencer {
    state: PlayState,
    interval: AutoPlayInterval,
    rng: SmallRng,
}

impl AutoPlaySequencer {
    pub fn new(interval: AutoPlayInterval) -> Self {
        Self::with_rng(interval, SmallRng::from_entropy())
    }

    /// Deterministic picks, for tests and replays.
    pub fn with_seed(interval: AutoPlayInterval, seed: u64) -> Self {
        Self::with_rng(interval, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(interval: AutoPlayInterval, rng: SmallRng) -> Self {
        Self { state: PlayState::Idle, interval, rng }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlayState::Playing { .. })
    }

    pub fn interval(&self) -> AutoPlayInterval {
        self.interval
    }

    /// Takes effect from the next time the timer is armed.
    pub fn set_interval(&mut self, interval: AutoPlayInterval) {
        self.interval = interval;
    }

    /// When the current selection expires, if playing.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            PlayState::Playing { deadline } => Some(deadline),
            PlayState::Idle => None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().map(|deadline| now >= deadline).unwrap_or(false)
    }

    /// Idle -> Playing. Arms the timer and picks the first vehicle.
    ///
    /// Starting while already playing behaves like [`advance`](Self::advance).
    pub fn start<'a, I>(&mut self, now: Instant, tracked: I, current: Option<&Vehicle>) -> Option<Vehicle>
    where
        I: IntoIterator<Item = &'a Vehicle>,
    {
        if !self.is_playing() {
            info!("[AutoPlay] Started ({})", self.interval);
        }
        self.advance_inner(now, tracked, current)
    }

    /// Playing -> Playing. Re-arms the timer and picks the next vehicle.
    /// Does nothing when idle.
    pub fn advance<'a, I>(&mut self, now: Instant, tracked: I, current: Option<&Vehicle>) -> Option<Vehicle>
    where
        I: IntoIterator<Item = &'a Vehicle>,
    {
        if !self.is_playing() {
            return None;
        }
        self.advance_inner(now, tracked, current)
    }

    /// Playing -> Idle. Returns whether it was playing; the caller clears the
    /// selection.
    pub fn stop(&mut self) -> bool {
        let was_playing = self.is_playing();
        self.state = PlayState::Idle;
        if was_playing {
            info!("[AutoPlay] Stopped");
        }
        was_playing
    }

    fn advance_inner<'a, I>(&mut self, now: Instant, tracked: I, current: Option<&Vehicle>) -> Option<Vehicle>
    where
        I: IntoIterator<Item = &'a Vehicle>,
    {
        self.state = PlayState::Playing { deadline: now + self.interval.duration() };
        let next = self.pick_next(tracked, current);
        debug!(
            "[AutoPlay] Next pick: {:?}",
            next.as_ref().map(|v| v.route_short_name.as_str())
        );
        next
    }

    /// Uniform random vehicle on a different route than `current`. Falls back
    /// to `current` when every tracked vehicle shares its route.
    fn pick_next<'a, I>(&mut self, tracked: I, current: Option<&Vehicle>) -> Option<Vehicle>
    where
        I: IntoIterator<Item = &'a Vehicle>,
    {
        let mut all: Vec<&Vehicle> = tracked.into_iter().collect();
        // Tracked order comes from a hash map; sort so seeded picks are reproducible
        all.sort_by_key(|v| v.key());

        let candidates: Vec<&Vehicle> = match current {
            Some(current) => all
                .iter()
                .copied()
                .filter(|v| v.route_short_name != current.route_short_name)
                .collect(),
            None => all.clone(),
        };

        if let Some(pick) = candidates.choose(&mut self.rng) {
            return Some((*pick).clone());
        }

        let current = current?;
        all.into_iter().find(|v| v.key() == current.key()).cloned()
    }
}
