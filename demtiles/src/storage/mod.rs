//! Pluggable tile storage backends.
//!
//! A backend answers two questions: which tiles exist ([`DemStorage::read_index`])
//! and what a given tile contains ([`DemStorage::load`]). The crate ships a
//! recursive filesystem scanner and an HTTP backend with a local disk cache.
//!
//! # Dyn Compatibility
//!
//! The trait uses `Pin<Box<dyn Future>>` for its async methods so the
//! database can hold an `Arc<dyn DemStorage>` and swap backends freely.

mod filesystem;
mod http;

pub use filesystem::FilesystemStorage;
pub use http::HttpStorage;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::formats::FormatError;
use crate::raster::{CellMetadata, DemCell};

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    /// Index manifest that cannot be parsed.
    #[error("malformed index: {0}")]
    Index(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL '{0}'")]
    InvalidUrl(String),

    /// Background task failure while scanning or downloading.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

/// One known tile: its storage-relative path and the metadata probed from
/// its header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexEntry {
    pub path: String,
    pub metadata: CellMetadata,
}

/// Ordered collection of every tile a backend knows about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseIndex {
    pub entries: Vec<IndexEntry>,
}

impl DatabaseIndex {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses an index from its JSON manifest form.
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the index as a JSON manifest.
    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a manifest file from disk.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Writes the manifest to disk.
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        Ok(std::fs::write(path, self.to_json()?)?)
    }
}

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A source of elevation tiles.
///
/// Implementations must be `Send + Sync`; the database shares one behind
/// an `Arc` across query tasks.
pub trait DemStorage: Send + Sync {
    /// Enumerates every available tile with its metadata.
    ///
    /// Fails when the index cannot be retrieved or parsed.
    fn read_index(&self) -> BoxFuture<'_, Result<DatabaseIndex, StorageError>>;

    /// Loads the full tile behind a storage-relative path.
    ///
    /// Fails when the tile is missing or malformed.
    fn load<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<DemCell, StorageError>>;
}
