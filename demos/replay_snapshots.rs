//! Replay a few hand-written feed snapshots through the tracker without a map
//! or network, printing what would be rendered.
//!
//! Run with: cargo run --example replay_snapshots

use std::time::{Duration, Instant};

use vehicle_tracker::surface::RecordingSurface;
use vehicle_tracker::{GpsPoint, ReconcileMode, Tracker, TrackerConfig, TripPath, Vehicle, VehicleKey};

fn bus(id: &str, route: &str, headsign: &str, lat: f64, lng: f64) -> Vehicle {
    Vehicle::new(id, format!("trip-{}", id))
        .with_route(route, headsign)
        .with_colors("005B95", "FFFFFF")
        .with_location(GpsPoint::new(lat, lng))
}

fn main() {
    let mut tracker = Tracker::new(TrackerConfig::default(), RecordingSurface::new()).with_autoplay_seed(42);
    tracker.navigate("#SF");
    let t0 = Instant::now();

    // Mission and Van Ness buses, one cycle apart
    let first = vec![
        bus("8721", "14", "Daly City", 37.7650, -122.4194),
        bus("8722", "14", "Daly City", 37.7520, -122.4183),
        bus("5510", "49", "Fort Mason", 37.7850, -122.4215),
    ];
    let second = vec![
        bus("8721", "14", "Daly City", 37.7630, -122.4190),
        bus("5510", "49", "Fort Mason", 37.7880, -122.4220),
        bus("5511", "49", "City College", 37.7740, -122.4200),
    ];

    println!("Vehicle Tracker Replay\n");

    let report = tracker.apply_snapshot(&first, ReconcileMode::Replace, t0);
    println!("1. Initial snapshot: {} created", report.created.len());

    let t1 = t0 + Duration::from_secs(60);
    let report = tracker.apply_snapshot(&second, ReconcileMode::Incremental, t1);
    println!(
        "2. Next snapshot: {} created, {} moved, {} removed",
        report.created.len(),
        report.moved.len(),
        report.removed.len()
    );

    for (key, record) in tracker.state().vehicles.iter() {
        match record.heading() {
            Some(heading) => println!("   {} heading {:.0}°", key, heading),
            None => println!("   {} heading unknown", key),
        }
    }

    // Halfway through the slide and after it
    let mut delivered = 0;
    for secs in [30, 61] {
        delivered += tracker.pump_frames(t1 + Duration::from_secs(secs));
    }
    println!("3. Delivered {} animation frames", delivered);

    let key = VehicleKey::new("8721", "trip-8721");
    if let Some(trip_id) = tracker.click_vehicle(&key) {
        let path = TripPath {
            trip_id,
            points: (0..=30).map(|i| GpsPoint::new(37.70 + i as f64 * 0.002, -122.4194)).collect(),
            agency_display_name: "SF Muni".to_string(),
            route_type: "Bus".to_string(),
        };
        let arrows = tracker.show_path(path).unwrap_or(0);
        println!(
            "4. Selected route 14: {} of {} markers visible, {} arrows",
            tracker.surface().visible_count(),
            tracker.surface().marker_count(),
            arrows
        );
    }

    tracker.show_all();
    let t2 = t1 + Duration::from_secs(120);
    if tracker.start_autoplay(t2).is_some() {
        let picked = tracker.selected().map(|v| v.route_short_name.clone()).unwrap_or_default();
        println!("5. Auto-play picked route {}", picked);
    }
    if tracker.poll_autoplay(t2 + tracker.config().autoplay_interval.duration()).is_some() {
        let picked = tracker.selected().map(|v| v.route_short_name.clone()).unwrap_or_default();
        println!("   then route {}", picked);
    }
    tracker.stop_autoplay();

    let stats = tracker.surface().stats();
    println!(
        "\nSurface calls: {} created, {} moved, {} removed, {} visibility changes",
        stats.created, stats.moved, stats.removed, stats.visibility_changes
    );
}
