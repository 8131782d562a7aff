//! The elevation database: spatial index, bounded cache and query engine.
//!
//! A [`DemDatabase`] wraps a storage backend with a lazily-loaded tile
//! index and a byte-budgeted cell cache. Tiles are materialized on demand
//! and evicted strictly by least-recent access when the budget is met.
//! Queries that fall outside every tile return NaN; missing data is a
//! normal outcome, not an error.
//!
//! The cache is coarse-grained by design: one async mutex serializes index
//! reloads and cell loads, so a tile is fetched at most once even under
//! concurrent first access.

mod entry;

pub use entry::DatabaseEntry;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::coord::Coordinates;
use crate::interp::Interpolation;
use crate::raster::{DemCell, RasterType};
use crate::storage::{DemStorage, StorageError};

/// Errors raised by database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A freshly loaded tile alone exceeds the byte budget with nothing
    /// left to evict. This is a configuration error, not a transient one.
    #[error("tile of {needed} bytes exceeds the cache budget of {max} bytes")]
    BudgetExceeded { needed: u64, max: u64 },
}

/// A point-in-time view of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    pub entries: usize,
    pub loaded_entries: usize,
    pub loaded_bytes: u64,
    pub max_bytes: u64,
}

impl std::fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tiles indexed, {} loaded ({}/{} bytes)",
            self.entries, self.loaded_entries, self.loaded_bytes, self.max_bytes
        )
    }
}

/// Elevation database over a pluggable storage backend.
///
/// Created with a backend and a byte budget; dropped explicitly like any
/// other value. All query methods are async and share one internal lock
/// for index reloads, cell loads and eviction.
pub struct DemDatabase {
    storage: Arc<dyn DemStorage>,
    max_bytes: u64,
    entries: RwLock<Arc<Vec<Arc<DatabaseEntry>>>>,
    cache_lock: Mutex<()>,
    loaded_bytes: AtomicU64,
    clock: AtomicU64,
}

impl DemDatabase {
    /// Creates a database over `storage`, caching at most `max_bytes` of
    /// loaded cell payload.
    pub fn new(storage: Arc<dyn DemStorage>, max_bytes: u64) -> Self {
        Self {
            storage,
            max_bytes,
            entries: RwLock::new(Arc::new(Vec::new())),
            cache_lock: Mutex::new(()),
            loaded_bytes: AtomicU64::new(0),
            clock: AtomicU64::new(0),
        }
    }

    /// Unconditionally replaces the tile index from storage, resetting the
    /// loaded-byte counter. Returns the number of indexed tiles.
    ///
    /// The previous index stays in place until the new one is fully
    /// fetched, so a failed reload leaves the database usable.
    pub async fn load_index(&self) -> Result<usize, DatabaseError> {
        let _guard = self.cache_lock.lock().await;
        self.reload_index_locked().await
    }

    async fn reload_index_locked(&self) -> Result<usize, DatabaseError> {
        let index = self.storage.read_index().await?;
        let entries: Arc<Vec<Arc<DatabaseEntry>>> = Arc::new(
            index
                .entries
                .into_iter()
                .map(|e| Arc::new(DatabaseEntry::new(e)))
                .collect(),
        );
        let count = entries.len();
        *self.entries.write() = entries;
        self.loaded_bytes.store(0, Ordering::SeqCst);
        info!(tiles = count, "tile index loaded");
        Ok(count)
    }

    /// Double-checked lazy index load: queries trigger exactly one index
    /// fetch under concurrent first access.
    async fn ensure_index(&self) -> Result<(), DatabaseError> {
        if !self.entries.read().is_empty() {
            return Ok(());
        }
        let _guard = self.cache_lock.lock().await;
        if self.entries.read().is_empty() {
            self.reload_index_locked().await?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Arc<Vec<Arc<DatabaseEntry>>> {
        Arc::clone(&self.entries.read())
    }

    /// Strictly increasing logical timestamp, anchored to wall-clock
    /// microseconds so `release_older_than` can compare against durations.
    fn next_stamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let mut prev = self.clock.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .clock
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Returns the entry's cell, loading and caching it if necessary.
    ///
    /// Loads are serialized by the cache lock; a concurrent loader of the
    /// same entry reuses the first result. After a load, least-recently
    /// accessed cells are evicted until the budget is satisfied.
    async fn load_entry(&self, entry: &Arc<DatabaseEntry>) -> Result<Arc<DemCell>, DatabaseError> {
        if let Some(cell) = entry.data() {
            entry.touch(self.next_stamp());
            return Ok(cell);
        }

        let _guard = self.cache_lock.lock().await;
        if let Some(cell) = entry.data() {
            entry.touch(self.next_stamp());
            return Ok(cell);
        }

        let cell = Arc::new(self.storage.load(entry.path()).await?);
        let size = cell.size_in_bytes() as u64;
        entry.set_data(Arc::clone(&cell));
        entry.touch(self.next_stamp());
        self.loaded_bytes.fetch_add(size, Ordering::SeqCst);
        debug!(tile = entry.path(), bytes = size, "tile loaded");

        while self.loaded_bytes.load(Ordering::SeqCst) >= self.max_bytes {
            let snapshot = self.snapshot();
            let victim = snapshot
                .iter()
                .filter(|e| e.is_loaded() && !Arc::ptr_eq(e, entry))
                .min_by_key(|e| e.last_access());
            match victim {
                Some(victim) => {
                    let freed = victim.clear_data();
                    self.loaded_bytes.fetch_sub(freed, Ordering::SeqCst);
                    debug!(tile = victim.path(), bytes = freed, "tile evicted");
                }
                None => {
                    // The fresh tile alone blows the budget. Roll it back
                    // so a failed load registers nothing.
                    let freed = entry.clear_data();
                    self.loaded_bytes.fetch_sub(freed, Ordering::SeqCst);
                    warn!(
                        tile = entry.path(),
                        bytes = size,
                        budget = self.max_bytes,
                        "tile exceeds cache budget"
                    );
                    return Err(DatabaseError::BudgetExceeded {
                        needed: size,
                        max: self.max_bytes,
                    });
                }
            }
        }
        Ok(cell)
    }

    /// Loaded cells for every indexed tile overlapping the query box,
    /// ordered by how much of the box each tile covers.
    pub async fn data_cells(
        &self,
        start: Coordinates,
        end: Coordinates,
    ) -> Result<Vec<Arc<DemCell>>, DatabaseError> {
        self.ensure_index().await?;
        let snapshot = self.snapshot();
        let mut overlapping: Vec<&Arc<DatabaseEntry>> = snapshot
            .iter()
            .filter(|e| e.overlaps(start, end))
            .collect();
        overlapping.sort_by(|a, b| {
            b.coverage_surface(start, end)
                .partial_cmp(&a.coverage_surface(start, end))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut cells = Vec::with_capacity(overlapping.len());
        for entry in overlapping {
            cells.push(self.load_entry(entry).await?);
        }
        Ok(cells)
    }

    /// Interpolated elevation at a point, or NaN when no tile covers it.
    ///
    /// With a single covering tile, or a point-addressed first candidate,
    /// the lookup stays within that tile. When several area-addressed
    /// tiles overlap at a seam, an already-loaded tile for which the point
    /// is strictly local wins; otherwise boundary samples from all
    /// candidates are merged, deduplicated and interpolated together.
    pub async fn elevation(
        &self,
        point: Coordinates,
        interpolation: &dyn Interpolation,
    ) -> Result<f64, DatabaseError> {
        self.ensure_index().await?;
        let snapshot = self.snapshot();
        let candidates: Vec<&Arc<DatabaseEntry>> =
            snapshot.iter().filter(|e| e.contains(point)).collect();

        if candidates.is_empty() {
            return Ok(f64::NAN);
        }
        if candidates.len() == 1
            || candidates[0].metadata().raster_type == RasterType::PixelIsPoint
        {
            let cell = self.load_entry(candidates[0]).await?;
            return Ok(cell.local_elevation(point, interpolation));
        }

        for entry in &candidates {
            if let Some(cell) = entry.data() {
                if cell.is_local(point) {
                    entry.touch(self.next_stamp());
                    return Ok(cell.local_elevation(point, interpolation));
                }
            }
        }

        let mut seen = HashSet::new();
        let mut samples = Vec::new();
        for entry in &candidates {
            let cell = self.load_entry(entry).await?;
            for (coord, elevation) in cell.nearby_elevations(point) {
                let key = (
                    coord.latitude.to_bits(),
                    coord.longitude.to_bits(),
                    elevation.to_bits(),
                );
                if seen.insert(key) {
                    samples.push((coord, elevation));
                }
            }
        }
        if samples.is_empty() {
            return Ok(f64::NAN);
        }
        Ok(interpolation.interpolate(point, &samples))
    }

    /// Evicts every loaded cell last accessed more than `threshold` ago,
    /// regardless of the byte budget. Returns the bytes freed.
    pub async fn release_older_than(&self, threshold: Duration) -> Result<u64, DatabaseError> {
        let _guard = self.cache_lock.lock().await;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let cutoff = now.saturating_sub(threshold.as_micros() as u64);

        let mut freed = 0u64;
        for entry in self.snapshot().iter() {
            if entry.is_loaded() && entry.last_access() < cutoff {
                let bytes = entry.clear_data();
                self.loaded_bytes.fetch_sub(bytes, Ordering::SeqCst);
                freed += bytes;
                debug!(tile = entry.path(), bytes, "stale tile released");
            }
        }
        Ok(freed)
    }

    pub fn stats(&self) -> DatabaseStats {
        let snapshot = self.snapshot();
        DatabaseStats {
            entries: snapshot.len(),
            loaded_entries: snapshot.iter().filter(|e| e.is_loaded()).count(),
            loaded_bytes: self.loaded_bytes.load(Ordering::SeqCst),
            max_bytes: self.max_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::InverseDistanceWeighting;
    use crate::raster::{CellMetadata, DataCell};
    use crate::storage::{BoxFuture, DatabaseIndex, IndexEntry};
    use std::sync::atomic::AtomicUsize;

    struct MockStorage {
        index: DatabaseIndex,
        cells: Vec<(String, DemCell)>,
        index_reads: AtomicUsize,
        loads: AtomicUsize,
    }

    impl MockStorage {
        fn new(tiles: Vec<(&str, DataCell<i16>)>) -> Self {
            let index = DatabaseIndex::new(
                tiles
                    .iter()
                    .map(|(path, cell)| IndexEntry {
                        path: path.to_string(),
                        metadata: cell.metadata().clone(),
                    })
                    .collect(),
            );
            let cells = tiles
                .into_iter()
                .map(|(path, cell)| (path.to_string(), DemCell::from(cell)))
                .collect();
            Self {
                index,
                cells,
                index_reads: AtomicUsize::new(0),
                loads: AtomicUsize::new(0),
            }
        }
    }

    impl DemStorage for MockStorage {
        fn read_index(&self) -> BoxFuture<'_, Result<DatabaseIndex, StorageError>> {
            self.index_reads.fetch_add(1, Ordering::SeqCst);
            let index = self.index.clone();
            Box::pin(async move { Ok(index) })
        }

        fn load<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<DemCell, StorageError>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                self.cells
                    .iter()
                    .find(|(p, _)| p == path)
                    .map(|(_, cell)| cell.clone())
                    .ok_or_else(|| {
                        StorageError::Io(std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            path.to_string(),
                        ))
                    })
            })
        }
    }

    fn point_tile(start: Coordinates, elevation: i16) -> DataCell<i16> {
        let metadata = CellMetadata::new(
            RasterType::PixelIsPoint,
            start,
            Coordinates::new(start.latitude + 1.0, start.longitude + 1.0),
            2,
            2,
        )
        .unwrap();
        DataCell::new(metadata, vec![elevation; 4]).unwrap()
    }

    #[tokio::test]
    async fn test_index_is_loaded_lazily_and_once() {
        let storage = Arc::new(MockStorage::new(vec![(
            "a.dem",
            point_tile(Coordinates::new(47.0, 8.0), 100),
        )]));
        let db = DemDatabase::new(Arc::clone(&storage) as Arc<dyn DemStorage>, 1 << 20);
        let idw = InverseDistanceWeighting::default();

        assert_eq!(storage.index_reads.load(Ordering::SeqCst), 0);
        db.elevation(Coordinates::new(47.5, 8.5), &idw).await.unwrap();
        db.elevation(Coordinates::new(47.2, 8.2), &idw).await.unwrap();
        assert_eq!(storage.index_reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_elevation_outside_all_tiles_is_nan() {
        let storage = Arc::new(MockStorage::new(vec![(
            "a.dem",
            point_tile(Coordinates::new(47.0, 8.0), 100),
        )]));
        let db = DemDatabase::new(storage as Arc<dyn DemStorage>, 1 << 20);
        let idw = InverseDistanceWeighting::default();

        let elevation = db.elevation(Coordinates::new(10.0, 10.0), &idw).await.unwrap();
        assert!(elevation.is_nan());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_storage() {
        let storage = Arc::new(MockStorage::new(vec![(
            "a.dem",
            point_tile(Coordinates::new(47.0, 8.0), 100),
        )]));
        let db = DemDatabase::new(Arc::clone(&storage) as Arc<dyn DemStorage>, 1 << 20);
        let idw = InverseDistanceWeighting::default();

        db.elevation(Coordinates::new(47.5, 8.5), &idw).await.unwrap();
        db.elevation(Coordinates::new(47.5, 8.5), &idw).await.unwrap();
        assert_eq!(storage.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oversized_tile_is_fatal_and_leaves_no_entry() {
        let storage = Arc::new(MockStorage::new(vec![(
            "a.dem",
            point_tile(Coordinates::new(47.0, 8.0), 100),
        )]));
        // Budget below a single 8-byte tile.
        let db = DemDatabase::new(Arc::clone(&storage) as Arc<dyn DemStorage>, 4);
        let idw = InverseDistanceWeighting::default();

        let err = db.elevation(Coordinates::new(47.5, 8.5), &idw).await;
        assert!(matches!(err, Err(DatabaseError::BudgetExceeded { .. })));
        let stats = db.stats();
        assert_eq!(stats.loaded_entries, 0);
        assert_eq!(stats.loaded_bytes, 0);
    }

    #[tokio::test]
    async fn test_load_index_resets_cache_accounting() {
        let storage = Arc::new(MockStorage::new(vec![(
            "a.dem",
            point_tile(Coordinates::new(47.0, 8.0), 100),
        )]));
        let db = DemDatabase::new(Arc::clone(&storage) as Arc<dyn DemStorage>, 1 << 20);
        let idw = InverseDistanceWeighting::default();

        db.elevation(Coordinates::new(47.5, 8.5), &idw).await.unwrap();
        assert_eq!(db.stats().loaded_bytes, 8);

        db.load_index().await.unwrap();
        let stats = db.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.loaded_bytes, 0);
        assert_eq!(stats.loaded_entries, 0);
    }

    #[tokio::test]
    async fn test_data_cells_returns_overlapping_tiles() {
        let storage = Arc::new(MockStorage::new(vec![
            ("a.dem", point_tile(Coordinates::new(47.0, 8.0), 100)),
            ("b.dem", point_tile(Coordinates::new(47.0, 9.0), 200)),
            ("far.dem", point_tile(Coordinates::new(10.0, 10.0), 300)),
        ]));
        let db = DemDatabase::new(storage as Arc<dyn DemStorage>, 1 << 20);

        let cells = db
            .data_cells(Coordinates::new(47.2, 8.2), Coordinates::new(47.8, 9.4))
            .await
            .unwrap();
        assert_eq!(cells.len(), 2);
        // The first tile covers more of the query box.
        assert_eq!(cells[0].metadata().start, Coordinates::new(47.0, 8.0));
    }
}
