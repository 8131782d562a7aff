//! Tile format codecs and extension-driven dispatch.
//!
//! Four encodings are understood: the compact native binary tile format,
//! GeoTIFF, SRTM `.hgt` and ESRI ASCII grid. Any of them may additionally
//! be wrapped by a compression suffix handled by [`crate::stream`].
//! Metadata probing reads only as much as the format requires: the native
//! header, the ASCII header lines, the hgt filename plus byte length, or
//! the TIFF tags.

pub mod ascii;
pub mod geotiff;
pub mod hgt;
pub mod native;

use std::io::BufRead;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::raster::{CellMetadata, DemCell, RasterError};
use crate::stream::{self, StreamError};

/// Errors raised while decoding or encoding tile files.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    /// Native header does not start with the expected magic constant.
    #[error("bad magic number in native tile header")]
    BadMagic,

    #[error("unsupported native tile version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("unknown element type tag {0} in native tile header")]
    UnknownElementTag(u8),

    #[error("unknown raster type tag {0} in native tile header")]
    UnknownRasterTag(u8),

    /// Element type without a native format tag, e.g. `i32`.
    #[error("element type {0} cannot be encoded by the native tile format")]
    UnencodableElementType(&'static str),

    /// A cell with `RasterType::Unknown` cannot be written.
    #[error("cell with unknown raster type cannot be saved")]
    UnknownRasterType,

    #[error("unsupported GeoTIFF sample format: {format} with {bits} bits per sample")]
    UnsupportedSampleFormat { format: &'static str, bits: u8 },

    #[error("malformed GeoTIFF: {0}")]
    MalformedGeoTiff(String),

    #[error("TIFF decoding failed: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("missing header key '{0}' in ASCII grid")]
    MissingHeaderKey(&'static str),

    #[error("malformed ASCII grid: {0}")]
    MalformedAsciiGrid(String),

    #[error("hgt filename '{0}' does not encode a south-west corner")]
    BadHgtName(String),

    #[error("hgt payload of {0} bytes is not a known SRTM resolution")]
    BadHgtLength(usize),

    #[error("unrecognized tile extension: {0}")]
    UnknownExtension(PathBuf),
}

/// Tile encoding, detected from the extension under any compression suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    Native,
    GeoTiff,
    Hgt,
    AsciiGrid,
}

impl TileFormat {
    /// Detects the format from a path, looking through compression
    /// suffixes. Returns `None` for unrecognized extensions.
    pub fn from_path(path: &Path) -> Option<TileFormat> {
        let inner = stream::strip_compression(path);
        match inner
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("dem") => Some(TileFormat::Native),
            Some("tif") | Some("tiff") => Some(TileFormat::GeoTiff),
            Some("hgt") => Some(TileFormat::Hgt),
            Some("asc") => Some(TileFormat::AsciiGrid),
            _ => None,
        }
    }
}

/// Loads a full tile from disk, dispatching on extension.
pub fn load_cell(path: &Path) -> Result<DemCell, FormatError> {
    let format = TileFormat::from_path(path)
        .ok_or_else(|| FormatError::UnknownExtension(path.to_path_buf()))?;
    match format {
        TileFormat::Native => stream::read(path, |r: &mut dyn BufRead| native::load(r)),
        TileFormat::AsciiGrid => {
            stream::read(path, |r: &mut dyn BufRead| ascii::load(r).map(DemCell::F32))
        }
        TileFormat::GeoTiff => stream::read_seekable(path, |r| geotiff::load(r)),
        TileFormat::Hgt => {
            let stem = hgt_stem(path)?;
            stream::read(path, |r: &mut dyn BufRead| {
                let mut data = Vec::new();
                r.read_to_end(&mut data)?;
                hgt::load(&stem, &data).map(DemCell::I16)
            })
        }
    }
}

/// Reads only a tile's metadata, avoiding the payload where the format
/// permits it.
pub fn load_metadata(path: &Path) -> Result<CellMetadata, FormatError> {
    let format = TileFormat::from_path(path)
        .ok_or_else(|| FormatError::UnknownExtension(path.to_path_buf()))?;
    match format {
        TileFormat::Native => stream::read(path, |r: &mut dyn BufRead| native::load_metadata(r)),
        TileFormat::AsciiGrid => {
            stream::read(path, |r: &mut dyn BufRead| ascii::load_metadata(r))
        }
        TileFormat::GeoTiff => stream::read_seekable(path, |r| geotiff::load_metadata(r)),
        TileFormat::Hgt => {
            let stem = hgt_stem(path)?;
            // The grid size is implied by the payload length, so the
            // stream must still be drained even though no sample is kept.
            stream::read(path, |r: &mut dyn BufRead| {
                let mut len = 0usize;
                let mut buf = [0u8; 16 * 1024];
                loop {
                    let n = r.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    len += n;
                }
                hgt::metadata(&stem, len)
            })
        }
    }
}

/// Filename stem underneath any compression suffix, e.g. `N47E008` for
/// `N47E008.hgt.gz`.
fn hgt_stem(path: &Path) -> Result<String, FormatError> {
    stream::strip_compression(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .ok_or_else(|| FormatError::BadHgtName(path.display().to_string()))
}
