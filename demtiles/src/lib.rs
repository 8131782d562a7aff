//! DemTiles - Digital elevation model tile engine
//!
//! This library manages large collections of DEM raster tiles: discovering
//! them on disk or over HTTP, decoding several binary and text encodings,
//! indexing them by geographic bounding box, and serving point and area
//! elevation queries while keeping resident memory under a byte budget.

pub mod coord;
pub mod database;
pub mod formats;
pub mod interp;
pub mod logging;
pub mod raster;
pub mod storage;
pub mod stream;

pub use coord::Coordinates;
pub use database::{DatabaseError, DatabaseStats, DemDatabase};
pub use interp::{Interpolation, InverseDistanceWeighting};
pub use raster::{CellMetadata, DataCell, DemCell, RasterError, RasterType, Sample};
pub use storage::{
    DatabaseIndex, DemStorage, FilesystemStorage, HttpStorage, IndexEntry, StorageError,
};
