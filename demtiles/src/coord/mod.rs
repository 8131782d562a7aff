//! Geographic coordinate value type.
//!
//! Provides the immutable latitude/longitude pair used throughout the crate
//! for cell bounds, query points and seam-sample deduplication. Equality and
//! hashing are defined over the raw f64 bit patterns so coordinates can key
//! maps and sets.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A geographic point as a (latitude, longitude) pair in degrees.
///
/// Latitude grows northward, longitude grows eastward. The type is a plain
/// value: two coordinates are equal when both components have identical bit
/// patterns, which makes deduplication of sample points deterministic.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Coordinates {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinates {
    /// Creates a new coordinate pair.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Componentwise `self <= other` on both axes.
    pub fn is_south_west_of(&self, other: &Coordinates) -> bool {
        self.latitude <= other.latitude && self.longitude <= other.longitude
    }
}

impl PartialEq for Coordinates {
    fn eq(&self, other: &Self) -> bool {
        self.latitude.to_bits() == other.latitude.to_bits()
            && self.longitude.to_bits() == other.longitude.to_bits()
    }
}

impl Eq for Coordinates {}

impl Hash for Coordinates {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.latitude.to_bits().hash(state);
        self.longitude.to_bits().hash(state);
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}
