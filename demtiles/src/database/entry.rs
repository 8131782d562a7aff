//! One indexed tile and its cache slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::coord::Coordinates;
use crate::raster::{CellMetadata, DemCell};
use crate::storage::IndexEntry;

/// A known tile: its storage path, probed metadata, and an optional loaded
/// cell. The cell slot is the only mutable part besides the access stamp;
/// eviction drops the slot's reference while readers may still hold their
/// own `Arc` to the cell.
#[derive(Debug)]
pub struct DatabaseEntry {
    path: String,
    metadata: CellMetadata,
    data: RwLock<Option<Arc<DemCell>>>,
    last_access: AtomicU64,
}

impl DatabaseEntry {
    pub fn new(index_entry: IndexEntry) -> Self {
        Self {
            path: index_entry.path,
            metadata: index_entry.metadata,
            data: RwLock::new(None),
            last_access: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> &CellMetadata {
        &self.metadata
    }

    pub fn contains(&self, point: Coordinates) -> bool {
        self.metadata.contains(point)
    }

    pub fn overlaps(&self, start: Coordinates, end: Coordinates) -> bool {
        self.metadata.overlaps(start, end)
    }

    pub fn coverage_surface(&self, start: Coordinates, end: Coordinates) -> f64 {
        self.metadata.coverage_surface(start, end)
    }

    /// The loaded cell, if currently cached.
    pub fn data(&self) -> Option<Arc<DemCell>> {
        self.data.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.data.read().is_some()
    }

    /// Bytes held by the cached cell, 0 when unloaded.
    pub fn loaded_bytes(&self) -> u64 {
        self.data
            .read()
            .as_ref()
            .map(|cell| cell.size_in_bytes() as u64)
            .unwrap_or(0)
    }

    pub fn set_data(&self, cell: Arc<DemCell>) {
        *self.data.write() = Some(cell);
    }

    /// Evicts the cached cell, returning the bytes freed.
    pub fn clear_data(&self) -> u64 {
        self.data
            .write()
            .take()
            .map(|cell| cell.size_in_bytes() as u64)
            .unwrap_or(0)
    }

    /// Records a cache hit or load at the given logical timestamp.
    pub fn touch(&self, stamp: u64) {
        self.last_access.store(stamp, Ordering::Relaxed);
    }

    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{DataCell, RasterType};

    fn entry() -> DatabaseEntry {
        DatabaseEntry::new(IndexEntry {
            path: "tiles/N47E008.dem".to_string(),
            metadata: CellMetadata::new(
                RasterType::PixelIsPoint,
                Coordinates::new(47.0, 8.0),
                Coordinates::new(48.0, 9.0),
                2,
                2,
            )
            .unwrap(),
        })
    }

    fn cell() -> Arc<DemCell> {
        let metadata = CellMetadata::new(
            RasterType::PixelIsPoint,
            Coordinates::new(47.0, 8.0),
            Coordinates::new(48.0, 9.0),
            2,
            2,
        )
        .unwrap();
        Arc::new(DataCell::new(metadata, vec![1i16, 2, 3, 4]).unwrap().into())
    }

    #[test]
    fn test_cache_slot_lifecycle() {
        let entry = entry();
        assert!(!entry.is_loaded());
        assert_eq!(entry.loaded_bytes(), 0);

        entry.set_data(cell());
        assert!(entry.is_loaded());
        assert_eq!(entry.loaded_bytes(), 8);

        assert_eq!(entry.clear_data(), 8);
        assert!(!entry.is_loaded());
        assert_eq!(entry.clear_data(), 0);
    }

    #[test]
    fn test_access_stamp() {
        let entry = entry();
        assert_eq!(entry.last_access(), 0);
        entry.touch(42);
        assert_eq!(entry.last_access(), 42);
    }

    #[test]
    fn test_spatial_predicates_delegate_to_metadata() {
        let entry = entry();
        assert!(entry.contains(Coordinates::new(47.5, 8.5)));
        assert!(!entry.contains(Coordinates::new(46.0, 8.5)));
        assert!(entry.overlaps(Coordinates::new(47.5, 8.5), Coordinates::new(49.0, 10.0)));
    }
}
