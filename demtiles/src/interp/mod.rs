//! Elevation interpolation strategies.
//!
//! Cells and the database hand a set of (coordinate, elevation) samples to
//! an [`Interpolation`] implementation and get a single elevation back. The
//! trait is the seam for injecting other schemes; the crate ships an
//! inverse-distance-weighting default.

use crate::coord::Coordinates;

/// Strategy computing an elevation at a target point from nearby samples.
///
/// Implementations must tolerate arbitrary sample sets: the surrounding
/// four samples of one tile, or a merged set gathered across a tile seam.
pub trait Interpolation: Send + Sync {
    /// Interpolates the elevation at `target` from `samples`.
    ///
    /// Returns NaN when no usable sample is available. NaN elevations in
    /// the input are ignored.
    fn interpolate(&self, target: Coordinates, samples: &[(Coordinates, f64)]) -> f64;
}

/// Inverse-distance-weighted interpolation.
///
/// Weights each sample by `1 / distance^power`. A sample coinciding with
/// the target short-circuits to that sample's elevation.
#[derive(Debug, Clone)]
pub struct InverseDistanceWeighting {
    power: f64,
}

impl InverseDistanceWeighting {
    pub fn new(power: f64) -> Self {
        Self { power }
    }
}

impl Default for InverseDistanceWeighting {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl Interpolation for InverseDistanceWeighting {
    fn interpolate(&self, target: Coordinates, samples: &[(Coordinates, f64)]) -> f64 {
        const COINCIDENT: f64 = 1e-12;

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (coord, elevation) in samples {
            if elevation.is_nan() {
                continue;
            }
            let d_lat = coord.latitude - target.latitude;
            let d_lon = coord.longitude - target.longitude;
            let distance = (d_lat * d_lat + d_lon * d_lon).sqrt();
            if distance < COINCIDENT {
                return *elevation;
            }
            let weight = 1.0 / distance.powf(self.power);
            weighted_sum += weight * elevation;
            weight_total += weight;
        }

        if weight_total == 0.0 {
            f64::NAN
        } else {
            weighted_sum / weight_total
        }
    }
}
