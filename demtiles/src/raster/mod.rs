//! Raster tile metadata and in-memory cells.
//!
//! A tile is described by [`CellMetadata`] (addressing convention, extents
//! and point counts) and carried in memory as a [`DataCell`] of a concrete
//! sample type, or as the type-erased [`DemCell`] the database works with.

mod cell;
mod sample;

pub use cell::{DataCell, DemCell};
pub use sample::Sample;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coord::Coordinates;

/// Errors raised by cell construction and geometry operations.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The sample buffer does not match the declared grid dimensions.
    #[error("sample count {actual} does not match {points_lat}x{points_lon} grid")]
    SizeMismatch {
        actual: usize,
        points_lat: usize,
        points_lon: usize,
    },

    /// A crop box does not intersect the source cell at all.
    #[error("crop box {start}-{end} is outside the cell bounds")]
    OutOfRange { start: Coordinates, end: Coordinates },

    /// Metadata violates the Start <= End / positive point count invariants.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

/// How a grid index maps to a geographic coordinate.
///
/// `PixelIsPoint` anchors samples on grid intersections (the first sample
/// sits exactly on the start corner); `PixelIsArea` anchors them on cell
/// centers (the first sample covers the area starting at the start corner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterType {
    PixelIsPoint,
    PixelIsArea,
    Unknown,
}

/// Metadata describing one raster tile: addressing convention, geographic
/// extents and grid dimensions.
///
/// `start` is the minimum (south-west) corner and `end` the maximum
/// (north-east) corner, so `start <= end` holds componentwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CellMetadata {
    pub raster_type: RasterType,
    pub start: Coordinates,
    pub end: Coordinates,
    pub points_lat: usize,
    pub points_lon: usize,
}

impl CellMetadata {
    /// Creates metadata, checking the structural invariants.
    pub fn new(
        raster_type: RasterType,
        start: Coordinates,
        end: Coordinates,
        points_lat: usize,
        points_lon: usize,
    ) -> Result<Self, RasterError> {
        if points_lat == 0 || points_lon == 0 {
            return Err(RasterError::InvalidMetadata(format!(
                "point counts must be positive, got {points_lat}x{points_lon}"
            )));
        }
        if !start.is_south_west_of(&end) {
            return Err(RasterError::InvalidMetadata(format!(
                "start {start} is not south-west of end {end}"
            )));
        }
        Ok(Self {
            raster_type,
            start,
            end,
            points_lat,
            points_lon,
        })
    }

    /// Latitude degrees between adjacent sample rows.
    pub fn resolution_lat(&self) -> f64 {
        self.resolution(self.end.latitude - self.start.latitude, self.points_lat)
    }

    /// Longitude degrees between adjacent sample columns.
    pub fn resolution_lon(&self) -> f64 {
        self.resolution(self.end.longitude - self.start.longitude, self.points_lon)
    }

    fn resolution(&self, span: f64, points: usize) -> f64 {
        match self.raster_type {
            // Sample centers divide the span into `points` cells.
            RasterType::PixelIsArea => span / points as f64,
            // Samples sit on the grid, fenceposts included.
            _ => {
                if points > 1 {
                    span / (points - 1) as f64
                } else {
                    span
                }
            }
        }
    }

    /// True when the point lies inside the bounding box, borders included.
    pub fn contains(&self, point: Coordinates) -> bool {
        self.start.is_south_west_of(&point) && point.is_south_west_of(&self.end)
    }

    /// True when this tile's box intersects the query box.
    pub fn overlaps(&self, start: Coordinates, end: Coordinates) -> bool {
        self.start.latitude <= end.latitude
            && start.latitude <= self.end.latitude
            && self.start.longitude <= end.longitude
            && start.longitude <= self.end.longitude
    }

    /// Area of the intersection between this tile's box and the query box,
    /// in square degrees. Zero when the boxes are disjoint.
    pub fn coverage_surface(&self, start: Coordinates, end: Coordinates) -> f64 {
        let lat = (self.end.latitude.min(end.latitude) - self.start.latitude.max(start.latitude))
            .max(0.0);
        let lon = (self.end.longitude.min(end.longitude)
            - self.start.longitude.max(start.longitude))
        .max(0.0);
        lat * lon
    }
}
