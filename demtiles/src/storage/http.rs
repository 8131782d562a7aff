//! HTTP tile storage with a local disk cache.

use std::path::{Path, PathBuf};

use reqwest::Url;
use tracing::{debug, info};

use crate::formats;
use crate::raster::DemCell;
use crate::storage::{BoxFuture, DatabaseIndex, DemStorage, StorageError};

const INDEX_FILE: &str = "index.json";

/// Backend fetching tiles over HTTP.
///
/// The index is a single JSON manifest at `{base_url}/index.json`.
/// Downloaded tiles are kept in a disk cache keyed by host and path, so a
/// tile is fetched at most once per cache lifetime. Cache writes go to a
/// temporary file first and are renamed into place, so an interrupted
/// download never leaves a truncated tile behind.
#[derive(Debug, Clone)]
pub struct HttpStorage {
    client: reqwest::Client,
    base_url: Url,
    cache_dir: PathBuf,
}

impl HttpStorage {
    /// Creates a backend for the given base URL, caching downloads under
    /// the platform cache directory.
    pub fn new(base_url: &str) -> Result<Self, StorageError> {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("demtiles");
        Self::with_cache_dir(base_url, cache_dir)
    }

    /// Creates a backend with an explicit cache directory.
    pub fn with_cache_dir(base_url: &str, cache_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        // A trailing slash makes relative joins resolve under the base
        // path instead of replacing its last segment.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|_| StorageError::InvalidUrl(base_url.to_string()))?;
        if base_url.host_str().is_none() {
            return Err(StorageError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("demtiles/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            cache_dir: cache_dir.into(),
        })
    }

    /// On-disk cache location for a tile path.
    fn cache_path(&self, path: &str) -> PathBuf {
        let host = self.base_url.host_str().unwrap_or("unknown-host");
        let mut cached = self.cache_dir.join(host);
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != "..") {
            cached.push(segment);
        }
        cached
    }

    fn tile_url(&self, path: &str) -> Result<Url, StorageError> {
        self.base_url
            .join(path)
            .map_err(|_| StorageError::InvalidUrl(format!("{}{path}", self.base_url)))
    }

    async fn download_to_cache(&self, path: &str, cached: &Path) -> Result<(), StorageError> {
        let url = self.tile_url(path)?;
        debug!(%url, "downloading tile");
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;

        if let Some(parent) = cached.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = cached.with_extension("part");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, cached).await?;
        info!(%url, bytes = bytes.len(), "tile cached");
        Ok(())
    }
}

impl DemStorage for HttpStorage {
    fn read_index(&self) -> BoxFuture<'_, Result<DatabaseIndex, StorageError>> {
        Box::pin(async move {
            let url = self.tile_url(INDEX_FILE)?;
            debug!(%url, "fetching index manifest");
            let json = self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            DatabaseIndex::from_json(&json)
        })
    }

    fn load<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<DemCell, StorageError>> {
        Box::pin(async move {
            let cached = self.cache_path(path);
            if !tokio::fs::try_exists(&cached).await.unwrap_or(false) {
                self.download_to_cache(path, &cached).await?;
            } else {
                debug!(tile = path, "disk cache hit");
            }
            tokio::task::spawn_blocking(move || Ok(formats::load_cell(&cached)?))
                .await
                .map_err(|e| StorageError::TaskFailed(e.to_string()))?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Coordinates;
    use crate::formats::native;
    use crate::raster::{CellMetadata, DataCell, RasterType};

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpStorage::new("not a url"),
            Err(StorageError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpStorage::new("file:///no-host"),
            Err(StorageError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_cache_path_is_keyed_by_host_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage =
            HttpStorage::with_cache_dir("https://tiles.example.com/dem", dir.path()).unwrap();
        let cached = storage.cache_path("europe/N47E008.dem");
        assert_eq!(
            cached,
            dir.path()
                .join("tiles.example.com")
                .join("europe")
                .join("N47E008.dem")
        );
    }

    #[test]
    fn test_cache_path_ignores_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage =
            HttpStorage::with_cache_dir("https://tiles.example.com", dir.path()).unwrap();
        let cached = storage.cache_path("../../../etc/passwd");
        assert!(cached.starts_with(dir.path().join("tiles.example.com")));
        assert!(!cached.to_string_lossy().contains(".."));
    }

    #[test]
    fn test_tile_url_joins_under_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage =
            HttpStorage::with_cache_dir("https://tiles.example.com/dem", dir.path()).unwrap();
        assert_eq!(
            storage.tile_url("europe/N47E008.dem").unwrap().as_str(),
            "https://tiles.example.com/dem/europe/N47E008.dem"
        );
        assert_eq!(
            storage.tile_url(INDEX_FILE).unwrap().as_str(),
            "https://tiles.example.com/dem/index.json"
        );
    }

    #[tokio::test]
    async fn test_load_serves_from_disk_cache_without_network() {
        let dir = tempfile::tempdir().unwrap();
        // example.invalid never resolves, so a hit on the network path
        // would fail the test.
        let storage =
            HttpStorage::with_cache_dir("https://example.invalid/tiles", dir.path()).unwrap();

        let metadata = CellMetadata::new(
            RasterType::PixelIsPoint,
            Coordinates::new(47.0, 8.0),
            Coordinates::new(48.0, 9.0),
            2,
            2,
        )
        .unwrap();
        let cell = DataCell::new(metadata, vec![1i16, 2, 3, 4]).unwrap();
        let cached = storage.cache_path("N47E008.dem");
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        let mut buf = Vec::new();
        native::save(&cell, &mut buf).unwrap();
        std::fs::write(&cached, buf).unwrap();

        let loaded = storage.load("N47E008.dem").await.unwrap();
        let DemCell::I16(loaded) = loaded else {
            panic!("expected i16 cell");
        };
        assert_eq!(loaded.values(), &[1, 2, 3, 4]);
    }
}
