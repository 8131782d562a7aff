//! Local filesystem tile storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::formats::{self, TileFormat};
use crate::raster::DemCell;
use crate::storage::{BoxFuture, DatabaseIndex, DemStorage, IndexEntry, StorageError};

/// Backend serving tiles from a directory tree.
///
/// `read_index` walks the tree recursively, probing the metadata header of
/// every file with a recognized tile extension; the payload is never read
/// during indexing. `load` reads a full tile by its root-relative path.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: Arc<PathBuf>,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn scan_directory(root: &Path, dir: &Path, entries: &mut Vec<IndexEntry>) -> Result<(), StorageError> {
    for child in std::fs::read_dir(dir)? {
        let path = child?.path();
        if path.is_dir() {
            scan_directory(root, &path, entries)?;
            continue;
        }
        if TileFormat::from_path(&path).is_none() {
            continue;
        }
        let metadata = formats::load_metadata(&path)?;
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        debug!(tile = %relative, "indexed tile");
        entries.push(IndexEntry {
            path: relative,
            metadata,
        });
    }
    Ok(())
}

fn build_index(root: &Path) -> Result<DatabaseIndex, StorageError> {
    let mut entries = Vec::new();
    scan_directory(root, root, &mut entries)?;
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(tiles = entries.len(), root = %root.display(), "filesystem index built");
    Ok(DatabaseIndex::new(entries))
}

impl DemStorage for FilesystemStorage {
    fn read_index(&self) -> BoxFuture<'_, Result<DatabaseIndex, StorageError>> {
        let root = Arc::clone(&self.root);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || build_index(&root))
                .await
                .map_err(|e| StorageError::TaskFailed(e.to_string()))?
        })
    }

    fn load<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<DemCell, StorageError>> {
        let full_path = self.root.join(path);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Ok(formats::load_cell(&full_path)?))
                .await
                .map_err(|e| StorageError::TaskFailed(e.to_string()))?
        })
    }
}
