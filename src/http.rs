//! HTTP client for the live vehicle feed.
//!
//! Two endpoints, both `POST` with a JSON body:
//! - `/visualMap` `{place, include_old}` -> every vehicle in a region
//! - `/visualVehicle` `{trip_id}` -> the trip's path and operator
//!
//! Requests share one pooled client, retry transport errors and 429s with
//! exponential backoff, and log a timing breakdown per request.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::feed::{FeedError, FeedSnapshot, TripPath, VehicleFeed};
use crate::places::Place;
use crate::{GpsPoint, Vehicle};

/// Public feed endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.abetterride.app/tk";

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 3;

// ----------------------------------------------------------------------------
// Wire format
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct VisualMapRequest<'a> {
    place: &'a str,
    include_old: bool,
}

#[derive(Debug, Serialize)]
struct VisualVehicleRequest<'a> {
    trip_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiLatLng {
    lat: f64,
    lng: f64,
}

impl From<ApiLatLng> for GpsPoint {
    fn from(p: ApiLatLng) -> Self {
        GpsPoint::new(p.lat, p.lng)
    }
}

#[derive(Debug, Deserialize)]
struct ApiVehicle {
    vehicle_id: String,
    trip_id: String,
    location: Option<ApiLatLng>,
    #[serde(default)]
    route_color: String,
    #[serde(default)]
    text_color: String,
    #[serde(default)]
    route_short_name: String,
    #[serde(default)]
    route_long_name: String,
    #[serde(default)]
    headsign: String,
    bearing: Option<f64>,
}

impl From<ApiVehicle> for Vehicle {
    fn from(v: ApiVehicle) -> Self {
        Vehicle {
            vehicle_id: v.vehicle_id,
            trip_id: v.trip_id,
            location: v.location.map(GpsPoint::from),
            route_color: v.route_color,
            text_color: v.text_color,
            route_short_name: v.route_short_name,
            route_long_name: v.route_long_name,
            headsign: v.headsign,
            bearing: v.bearing,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VisualMapResponse {
    #[serde(default)]
    vehicles: Vec<ApiVehicle>,
    #[serde(default)]
    old_vehicles: Option<Vec<ApiVehicle>>,
}

impl From<VisualMapResponse> for FeedSnapshot {
    fn from(r: VisualMapResponse) -> Self {
        FeedSnapshot {
            vehicles: r.vehicles.into_iter().map(Vehicle::from).collect(),
            old_vehicles: r
                .old_vehicles
                .unwrap_or_default()
                .into_iter()
                .map(Vehicle::from)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VisualVehicleResponse {
    #[serde(default)]
    agency_display_name: String,
    #[serde(default)]
    shape: Vec<ApiLatLng>,
    #[serde(default)]
    route_type: String,
}

impl VisualVehicleResponse {
    fn into_trip_path(self, trip_id: &str) -> TripPath {
        TripPath {
            trip_id: trip_id.to_string(),
            points: self.shape.into_iter().map(GpsPoint::from).collect(),
            agency_display_name: self.agency_display_name,
            route_type: self.route_type,
        }
    }
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// Pooled HTTP client for the vehicle feed.
pub struct FeedClient {
    client: Client,
    base_url: String,
}

impl FeedClient {
    /// Client for the public endpoint.
    pub fn new() -> Result<Self, FeedError> {
        Self::with_base_url(DEFAULT_API_BASE)
    }

    /// Client for a self-hosted or local feed.
    pub fn with_base_url(base_url: &str) -> Result<Self, FeedError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FeedError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, FeedError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        let req_start = Instant::now();
        let mut retries = 0;

        loop {
            // Phase 1: Send request, receive headers
            let response = self.client.post(&url).json(body).send().await;
            let headers_elapsed = req_start.elapsed();

            let resp = match response {
                Ok(resp) => resp,
                Err(e) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(FeedError::Http(e));
                    }
                    let wait = Duration::from_millis(200 * (1 << retries));
                    warn!("[Feed {}] Error: {}, retry {} after {:?}", endpoint, e, retries, wait);
                    tokio::time::sleep(wait).await;
                    continue;
                }
            };

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RETRIES {
                retries += 1;
                // Exponential backoff: 1s, 2s, 4s
                let wait = Duration::from_millis(500 * (1 << retries));
                warn!(
                    "[Feed {}] 429 Too Many Requests after {:?}, retry {} with {:?} backoff",
                    endpoint, headers_elapsed, retries, wait
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let body = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "Could not read error response".to_string());
                warn!("[Feed {}] HTTP {} from {}: {}", endpoint, status, url, body);
                return Err(FeedError::Status { status: status.as_u16(), body });
            }

            // Phase 2: Download response body
            let body_start = Instant::now();
            let bytes = resp.bytes().await?;
            let body_elapsed = body_start.elapsed();

            // Phase 3: JSON deserialization
            let json_start = Instant::now();
            let data: T = serde_json::from_slice(&bytes)?;
            let json_elapsed = json_start.elapsed();

            info!(
                "[Feed {}] headers={:?} body={:?}({:.1}KB) json={:?} total={:?}",
                endpoint,
                headers_elapsed,
                body_elapsed,
                bytes.len() as f64 / 1024.0,
                json_elapsed,
                req_start.elapsed()
            );
            return Ok(data);
        }
    }
}

impl VehicleFeed for FeedClient {
    async fn fetch_snapshot(&self, place: &Place, include_old: bool) -> Result<FeedSnapshot, FeedError> {
        let request = VisualMapRequest { place: place.name, include_old };
        let response: VisualMapResponse = self.post_json("visualMap", &request).await?;
        let snapshot = FeedSnapshot::from(response);
        debug!(
            "[Feed] {}: {} vehicles, {} old",
            place.name,
            snapshot.vehicles.len(),
            snapshot.old_vehicles.len()
        );
        Ok(snapshot)
    }

    async fn fetch_path(&self, trip_id: &str) -> Result<TripPath, FeedError> {
        let request = VisualVehicleRequest { trip_id };
        let response: VisualVehicleResponse = self.post_json("visualVehicle", &request).await?;
        Ok(response.into_trip_path(trip_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_visual_map() {
        let json = r#"{
            "vehicles": [
                {"vehicle_id": "8721", "trip_id": "11567483", "location": {"lat": 37.77, "lng": -122.41},
                 "route_color": "005B95", "text_color": "FFFFFF", "route_short_name": "14",
                 "route_long_name": "Mission", "headsign": "Daly City", "bearing": 212.0},
                {"vehicle_id": "8722", "trip_id": "11567484", "route_color": "005B95",
                 "text_color": "FFFFFF", "route_short_name": "14", "route_long_name": "Mission",
                 "headsign": "Downtown"}
            ],
            "old_vehicles": null
        }"#;

        let response: VisualMapResponse = serde_json::from_str(json).unwrap();
        let snapshot = FeedSnapshot::from(response);

        assert_eq!(snapshot.vehicles.len(), 2);
        assert!(snapshot.old_vehicles.is_empty());
        let first = &snapshot.vehicles[0];
        assert_eq!(first.location, Some(GpsPoint::new(37.77, -122.41)));
        assert_eq!(first.bearing, Some(212.0));
        assert_eq!(first.key().as_str(), "872111567483");
        assert_eq!(snapshot.vehicles[1].position(), None);
    }

    #[test]
    fn test_decode_visual_vehicle() {
        let json = r#"{
            "agency_display_name": "SF Muni",
            "shape": [{"lat": 37.70, "lng": -122.46}, {"lat": 37.71, "lng": -122.45}],
            "route_type": "Bus"
        }"#;

        let response: VisualVehicleResponse = serde_json::from_str(json).unwrap();
        let path = response.into_trip_path("11567483");
        assert_eq!(path.trip_id, "11567483");
        assert_eq!(path.points.len(), 2);
        assert_eq!(path.points[1], GpsPoint::new(37.71, -122.45));
        assert_eq!(path.agency_display_name, "SF Muni");
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(VisualMapRequest { place: "SF", include_old: true }).unwrap();
        assert_eq!(body, serde_json::json!({"place": "SF", "include_old": true}));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = FeedClient::with_base_url("http://localhost:3000/tk/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/tk");
    }

    #[test]
    fn test_malformed_body_is_decode_error() {
        let err: FeedError = serde_json::from_str::<VisualMapResponse>("{\"vehicles\": 3}")
            .unwrap_err()
            .into();
        assert!(matches!(err, FeedError::Decode(_)));
    }
}
