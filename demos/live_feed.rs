//! Follow the live feed for a place and log every refresh.
//! Run with: cargo run --example live_feed --features http -- SF

use std::time::Duration;

use tokio::sync::mpsc;
use vehicle_tracker::surface::RecordingSurface;
use vehicle_tracker::tracker::TrackerEvent;
use vehicle_tracker::{FeedClient, Tracker, TrackerConfig};

#[tokio::main]
async fn main() {
    let place = std::env::args().nth(1).unwrap_or_else(|| "SF".to_string());

    let client = match FeedClient::new() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to create feed client: {}", e);
            return;
        }
    };

    let config = TrackerConfig {
        refresh_interval: Duration::from_secs(15),
        ..TrackerConfig::default()
    };
    let mut tracker = Tracker::new(config, RecordingSurface::new());
    if tracker.navigate(&format!("#{}", place)).is_none() {
        eprintln!("Unknown place {}, expected SF, BAYAREA or NYC", place);
        return;
    }
    let (tx, rx) = mpsc::channel(16);

    let script = async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        let _ = tx.send(TrackerEvent::StartAutoPlay).await;
        tokio::time::sleep(Duration::from_secs(40)).await;
        let _ = tx.send(TrackerEvent::Shutdown).await;
    };

    let (tracker, ()) = tokio::join!(tracker.run(&client, rx), script);

    let surface = tracker.surface();
    println!("Place:    {}", tracker.place().name);
    println!("Markers:  {} ({} visible)", surface.marker_count(), surface.visible_count());
    println!("Arrows:   {}", surface.arrows().len());
    if let Some(vehicle) = tracker.selected() {
        println!("Selected: {} to {}", vehicle.route_short_name, vehicle.headsign);
    }
}
