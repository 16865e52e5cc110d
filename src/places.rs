//! Named map regions the feed serves.
//!
//! The page hash (`#SF`, `#BAYAREA`, `#NYC`) picks the region. Anything else is
//! "no navigation": the current place stays put.

use crate::GpsPoint;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Place {
    /// Region name sent to the feed
    pub name: &'static str,
    pub center: GpsPoint,
    pub zoom: f64,
}

impl Place {
    pub const SF: Place = Place {
        name: "SF",
        center: GpsPoint { latitude: 37.7665252509697, longitude: -122.43332887350739 },
        zoom: 12.0,
    };

    pub const BAYAREA: Place = Place {
        name: "BAYAREA",
        center: GpsPoint { latitude: 37.65959600564773, longitude: -122.26666379640395 },
        zoom: 10.0,
    };

    pub const NYC: Place = Place {
        name: "NYC",
        center: GpsPoint { latitude: 40.76983974255722, longitude: -73.96204603887533 },
        zoom: 10.0,
    };

    /// Initial whole-country view. Not a feed region.
    pub const USA: Place = Place {
        name: "USA",
        center: GpsPoint { latitude: 38.934262001940496, longitude: -98.47252196050131 },
        zoom: 5.0,
    };

    /// Places reachable through the URL hash.
    pub const NAVIGABLE: [Place; 3] = [Place::SF, Place::BAYAREA, Place::NYC];

    /// Resolve a URL hash like `#SF`. Returns `None` for unknown hashes.
    pub fn from_hash(hash: &str) -> Option<Place> {
        let name = hash.strip_prefix('#')?;
        Place::NAVIGABLE.into_iter().find(|place| place.name == name)
    }
}

impl Default for Place {
    fn default() -> Self {
        Place::USA
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_hashes() {
        assert_eq!(Place::from_hash("#SF"), Some(Place::SF));
        assert_eq!(Place::from_hash("#BAYAREA"), Some(Place::BAYAREA));
        assert_eq!(Place::from_hash("#NYC"), Some(Place::NYC));
    }

    #[test]
    fn test_unknown_hashes_do_not_navigate() {
        assert_eq!(Place::from_hash("#USA"), None);
        assert_eq!(Place::from_hash("SF"), None);
        assert_eq!(Place::from_hash("#sf"), None);
        assert_eq!(Place::from_hash(""), None);
    }

    #[test]
    fn test_centers_are_valid() {
        for place in Place::NAVIGABLE.iter().chain(std::iter::once(&Place::USA)) {
            assert!(place.center.is_valid(), "{} center invalid", place.name);
        }
    }
}
