//! Contract with the vehicle feed.
//!
//! The engine never talks to the network itself. It asks a [`VehicleFeed`]
//! for a snapshot of every vehicle in a place, or for the path of one trip.
//! A failed call is a missed cycle: nothing is applied.

use thiserror::Error;

use crate::places::Place;
use crate::{GpsPoint, Vehicle};

/// One refresh worth of vehicles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    /// Current positions
    pub vehicles: Vec<Vehicle>,
    /// Positions from the previous feed cycle, only when requested. Used to
    /// place markers where they were so the live snapshot animates them.
    pub old_vehicles: Vec<Vehicle>,
}

/// Planned path of the selected trip plus its schedule metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripPath {
    pub trip_id: String,
    pub points: Vec<GpsPoint>,
    pub agency_display_name: String,
    pub route_type: String,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[cfg(feature = "http")]
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid feed response: {0}")]
    Decode(String),
    #[error("feed client setup failed: {0}")]
    Client(String),
    /// For host-implemented feeds (a native bridge, a cache, a replay file)
    /// that have nothing to serve this cycle. The HTTP client never returns it.
    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "http")]
impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

/// Source of vehicle snapshots and trip paths.
#[allow(async_fn_in_trait)]
pub trait VehicleFeed {
    /// Every vehicle in `place`. With `include_old`, also the previous cycle's
    /// positions in [`FeedSnapshot::old_vehicles`].
    async fn fetch_snapshot(&self, place: &Place, include_old: bool) -> Result<FeedSnapshot, FeedError>;

    /// Path and schedule metadata for one trip.
    async fn fetch_path(&self, trip_id: &str) -> Result<TripPath, FeedError>;
}
