//! In-memory raster tiles.
//!
//! [`DataCell`] owns a dense row-major grid of samples (row 0 is the
//! southernmost row) together with its [`CellMetadata`]. Cells are immutable
//! after construction; cropping produces a new cell. [`DemCell`] erases the
//! element type so the database can hold tiles of mixed formats.

use crate::coord::Coordinates;
use crate::interp::Interpolation;
use crate::raster::{CellMetadata, RasterError, RasterType, Sample};

/// Slack absorbing floating-point noise when mapping coordinates to indices.
const GRID_EPSILON: f64 = 1e-9;

/// One rectangular raster tile of elevation samples.
#[derive(Debug, Clone)]
pub struct DataCell<T: Sample> {
    metadata: CellMetadata,
    values: Vec<T>,
}

impl<T: Sample> DataCell<T> {
    /// Creates a cell from metadata and a row-major sample buffer
    /// (row 0 = southernmost row).
    pub fn new(metadata: CellMetadata, values: Vec<T>) -> Result<Self, RasterError> {
        if values.len() != metadata.points_lat * metadata.points_lon {
            return Err(RasterError::SizeMismatch {
                actual: values.len(),
                points_lat: metadata.points_lat,
                points_lon: metadata.points_lon,
            });
        }
        Ok(Self { metadata, values })
    }

    pub fn metadata(&self) -> &CellMetadata {
        &self.metadata
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Sample at (row, col). Panics on out-of-range indices.
    pub fn value(&self, row: usize, col: usize) -> T {
        self.values[row * self.metadata.points_lon + col]
    }

    /// Bytes occupied by the sample payload, used for cache accounting.
    pub fn size_in_bytes(&self) -> usize {
        self.values.len() * T::BYTES
    }

    /// Geographic position of the sample at (row, col).
    pub fn sample_coordinates(&self, row: usize, col: usize) -> Coordinates {
        let res_lat = self.metadata.resolution_lat();
        let res_lon = self.metadata.resolution_lon();
        let offset = match self.metadata.raster_type {
            RasterType::PixelIsArea => 0.5,
            _ => 0.0,
        };
        Coordinates::new(
            self.metadata.start.latitude + (row as f64 + offset) * res_lat,
            self.metadata.start.longitude + (col as f64 + offset) * res_lon,
        )
    }

    /// Fractional position in sample space: integer values land exactly on
    /// sample positions for both addressing conventions.
    fn fractional_position(&self, coord: Coordinates) -> (f64, f64) {
        let offset = match self.metadata.raster_type {
            RasterType::PixelIsArea => 0.5,
            _ => 0.0,
        };
        let row = (coord.latitude - self.metadata.start.latitude) / self.metadata.resolution_lat()
            - offset;
        let col = (coord.longitude - self.metadata.start.longitude)
            / self.metadata.resolution_lon()
            - offset;
        (row, col)
    }

    fn clamp_index(&self, value: isize, points: usize) -> usize {
        value.clamp(0, points as isize - 1) as usize
    }

    /// Nearest-sample lookup.
    ///
    /// PixelIsPoint rounds the fractional grid position to the nearest index,
    /// ties snapping to the higher index. PixelIsArea takes the ceiling of
    /// the edge-relative position, so each sample owns the area up to and
    /// including its north-east edge. Indices clamp at the boundary.
    pub fn raw_elevation(&self, coord: Coordinates) -> T {
        let (row, col) = match self.metadata.raster_type {
            RasterType::PixelIsArea => {
                let ratio_row = (coord.latitude - self.metadata.start.latitude)
                    / self.metadata.resolution_lat();
                let ratio_col = (coord.longitude - self.metadata.start.longitude)
                    / self.metadata.resolution_lon();
                (
                    ratio_row.ceil() as isize - 1,
                    ratio_col.ceil() as isize - 1,
                )
            }
            _ => {
                let (frac_row, frac_col) = self.fractional_position(coord);
                // floor(x + 0.5) rounds half-up: exactly halfway snaps to
                // the higher index.
                (
                    (frac_row + 0.5).floor() as isize,
                    (frac_col + 0.5).floor() as isize,
                )
            }
        };
        self.value(
            self.clamp_index(row, self.metadata.points_lat),
            self.clamp_index(col, self.metadata.points_lon),
        )
    }

    /// True when the coordinate falls strictly within this cell's own
    /// coverage, rather than in the half-sample seam margin shared with a
    /// neighboring tile.
    pub fn is_local(&self, coord: Coordinates) -> bool {
        match self.metadata.raster_type {
            RasterType::PixelIsArea => {
                let half_lat = self.metadata.resolution_lat() / 2.0;
                let half_lon = self.metadata.resolution_lon() / 2.0;
                coord.latitude >= self.metadata.start.latitude + half_lat
                    && coord.latitude <= self.metadata.end.latitude - half_lat
                    && coord.longitude >= self.metadata.start.longitude + half_lon
                    && coord.longitude <= self.metadata.end.longitude - half_lon
            }
            _ => self.metadata.contains(coord),
        }
    }

    /// The up-to-four samples surrounding the coordinate, as geographic
    /// position / elevation pairs. Sentinel samples are skipped; indices
    /// clamp at the tile boundary, so corners may yield a single sample.
    /// These are the points handed to multi-tile seam interpolation.
    pub fn nearby_elevations(&self, coord: Coordinates) -> Vec<(Coordinates, f64)> {
        let (frac_row, frac_col) = self.fractional_position(coord);
        let rows = [frac_row.floor() as isize, frac_row.floor() as isize + 1];
        let cols = [frac_col.floor() as isize, frac_col.floor() as isize + 1];

        let mut samples: Vec<(Coordinates, f64)> = Vec::with_capacity(4);
        for &r in &rows {
            for &c in &cols {
                let row = self.clamp_index(r, self.metadata.points_lat);
                let col = self.clamp_index(c, self.metadata.points_lon);
                let value = self.value(row, col);
                if value.is_no_value() {
                    continue;
                }
                let sample = (self.sample_coordinates(row, col), value.to_f64());
                if !samples.contains(&sample) {
                    samples.push(sample);
                }
            }
        }
        samples
    }

    /// Interpolated elevation from the samples surrounding the coordinate.
    /// Returns NaN when every surrounding sample is the sentinel.
    pub fn local_elevation(&self, coord: Coordinates, interpolation: &dyn Interpolation) -> f64 {
        let samples = self.nearby_elevations(coord);
        if samples.is_empty() {
            return f64::NAN;
        }
        interpolation.interpolate(coord, &samples)
    }

    /// New cell covering the intersection of this cell with the given box.
    ///
    /// Fails with [`RasterError::OutOfRange`] when the box does not
    /// intersect the cell at all.
    pub fn crop(&self, start: Coordinates, end: Coordinates) -> Result<DataCell<T>, RasterError> {
        if !self.metadata.overlaps(start, end) {
            return Err(RasterError::OutOfRange { start, end });
        }

        let clamp_start = Coordinates::new(
            start.latitude.max(self.metadata.start.latitude),
            start.longitude.max(self.metadata.start.longitude),
        );
        let clamp_end = Coordinates::new(
            end.latitude.min(self.metadata.end.latitude),
            end.longitude.min(self.metadata.end.longitude),
        );

        let res_lat = self.metadata.resolution_lat();
        let res_lon = self.metadata.resolution_lon();

        let (row_lo, row_hi, lat_start, lat_end) = self.crop_axis(
            clamp_start.latitude,
            clamp_end.latitude,
            self.metadata.start.latitude,
            res_lat,
            self.metadata.points_lat,
        );
        let (col_lo, col_hi, lon_start, lon_end) = self.crop_axis(
            clamp_start.longitude,
            clamp_end.longitude,
            self.metadata.start.longitude,
            res_lon,
            self.metadata.points_lon,
        );

        let metadata = CellMetadata::new(
            self.metadata.raster_type,
            Coordinates::new(lat_start, lon_start),
            Coordinates::new(lat_end, lon_end),
            row_hi - row_lo + 1,
            col_hi - col_lo + 1,
        )?;

        let mut values = Vec::with_capacity(metadata.points_lat * metadata.points_lon);
        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                values.push(self.value(row, col));
            }
        }
        DataCell::new(metadata, values)
    }

    /// Index range and recomputed extent along one axis of a crop.
    fn crop_axis(
        &self,
        lo: f64,
        hi: f64,
        origin: f64,
        res: f64,
        points: usize,
    ) -> (usize, usize, f64, f64) {
        match self.metadata.raster_type {
            RasterType::PixelIsArea => {
                let mut idx_lo = ((lo - origin) / res + GRID_EPSILON).floor() as isize;
                let mut idx_hi = ((hi - origin) / res - GRID_EPSILON).ceil() as isize - 1;
                idx_lo = idx_lo.clamp(0, points as isize - 1);
                idx_hi = idx_hi.clamp(idx_lo, points as isize - 1);
                let (idx_lo, idx_hi) = (idx_lo as usize, idx_hi as usize);
                (
                    idx_lo,
                    idx_hi,
                    origin + idx_lo as f64 * res,
                    origin + (idx_hi + 1) as f64 * res,
                )
            }
            _ => {
                let mut idx_lo = ((lo - origin) / res - GRID_EPSILON).ceil() as isize;
                let mut idx_hi = ((hi - origin) / res + GRID_EPSILON).floor() as isize;
                idx_lo = idx_lo.clamp(0, points as isize - 1);
                idx_hi = idx_hi.clamp(idx_lo, points as isize - 1);
                let (idx_lo, idx_hi) = (idx_lo as usize, idx_hi as usize);
                (
                    idx_lo,
                    idx_hi,
                    origin + idx_lo as f64 * res,
                    origin + idx_hi as f64 * res,
                )
            }
        }
    }
}

/// A raster tile with its element type erased.
///
/// The closed set of variants mirrors the element types the codecs can
/// produce; dispatch is a match, not a runtime type table.
#[derive(Debug, Clone)]
pub enum DemCell {
    F32(DataCell<f32>),
    F64(DataCell<f64>),
    I16(DataCell<i16>),
    U16(DataCell<u16>),
    I32(DataCell<i32>),
}

macro_rules! with_cell {
    ($value:expr, $cell:ident => $body:expr) => {
        match $value {
            DemCell::F32($cell) => $body,
            DemCell::F64($cell) => $body,
            DemCell::I16($cell) => $body,
            DemCell::U16($cell) => $body,
            DemCell::I32($cell) => $body,
        }
    };
}

impl DemCell {
    pub fn metadata(&self) -> &CellMetadata {
        with_cell!(self, c => c.metadata())
    }

    pub fn size_in_bytes(&self) -> usize {
        with_cell!(self, c => c.size_in_bytes())
    }

    pub fn is_local(&self, coord: Coordinates) -> bool {
        with_cell!(self, c => c.is_local(coord))
    }

    /// Nearest-sample lookup as f64, sentinel mapped to NaN.
    pub fn raw_elevation(&self, coord: Coordinates) -> f64 {
        with_cell!(self, c => c.raw_elevation(coord).to_f64())
    }

    pub fn local_elevation(&self, coord: Coordinates, interpolation: &dyn Interpolation) -> f64 {
        with_cell!(self, c => c.local_elevation(coord, interpolation))
    }

    pub fn nearby_elevations(&self, coord: Coordinates) -> Vec<(Coordinates, f64)> {
        with_cell!(self, c => c.nearby_elevations(coord))
    }

    pub fn crop(&self, start: Coordinates, end: Coordinates) -> Result<DemCell, RasterError> {
        Ok(match self {
            DemCell::F32(c) => DemCell::F32(c.crop(start, end)?),
            DemCell::F64(c) => DemCell::F64(c.crop(start, end)?),
            DemCell::I16(c) => DemCell::I16(c.crop(start, end)?),
            DemCell::U16(c) => DemCell::U16(c.crop(start, end)?),
            DemCell::I32(c) => DemCell::I32(c.crop(start, end)?),
        })
    }
}

impl From<DataCell<f32>> for DemCell {
    fn from(cell: DataCell<f32>) -> Self {
        DemCell::F32(cell)
    }
}

impl From<DataCell<f64>> for DemCell {
    fn from(cell: DataCell<f64>) -> Self {
        DemCell::F64(cell)
    }
}

impl From<DataCell<i16>> for DemCell {
    fn from(cell: DataCell<i16>) -> Self {
        DemCell::I16(cell)
    }
}

impl From<DataCell<u16>> for DemCell {
    fn from(cell: DataCell<u16>) -> Self {
        DemCell::U16(cell)
    }
}

impl From<DataCell<i32>> for DemCell {
    fn from(cell: DataCell<i32>) -> Self {
        DemCell::I32(cell)
    }
}
