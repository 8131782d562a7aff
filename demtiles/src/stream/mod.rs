//! Transparent compression for tile files.
//!
//! Tiles may be stored raw or wrapped in gzip, zstd, brotli or a
//! single-entry zip archive. The wrapper is chosen purely by the file
//! extension (case-insensitive); no magic-byte sniffing. Consumers receive
//! either a plain reader or, via [`read_seekable`], a seekable one.
//! Compressed input is materialized in memory to honor the seek guarantee.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from the compression layer itself.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A zip wrapper that is not a single-entry archive.
    #[error("archive error: {0}")]
    Archive(String),
}

/// Compression wrapper applied on top of the tile format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
    Brotli,
    Zip,
}

impl Compression {
    /// Detects the wrapper from the final path extension.
    pub fn from_path(path: &Path) -> Compression {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("gz") => Compression::Gzip,
            Some("zst") => Compression::Zstd,
            Some("br") => Compression::Brotli,
            Some("zip") => Compression::Zip,
            _ => Compression::None,
        }
    }

    /// Extension appended when writing with this wrapper.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
            Compression::Zstd => Some("zst"),
            Compression::Brotli => Some("br"),
            Compression::Zip => Some("zip"),
        }
    }
}

/// Path with any recognized compression suffix removed, exposing the real
/// format extension underneath.
pub fn strip_compression(path: &Path) -> PathBuf {
    if Compression::from_path(path) == Compression::None {
        path.to_path_buf()
    } else {
        path.with_extension("")
    }
}

/// Reader that also supports seeking, for codecs that need random access.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Opens a tile file and hands the consumer a decompressed stream.
pub fn read<T, E, F>(path: &Path, consumer: F) -> Result<T, E>
where
    F: FnOnce(&mut dyn BufRead) -> Result<T, E>,
    E: From<StreamError>,
{
    let file = File::open(path).map_err(StreamError::Io)?;
    match Compression::from_path(path) {
        Compression::None => consumer(&mut BufReader::new(file)),
        Compression::Gzip => consumer(&mut BufReader::new(flate2::read::GzDecoder::new(file))),
        Compression::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(file).map_err(StreamError::Io)?;
            consumer(&mut BufReader::new(decoder))
        }
        Compression::Brotli => {
            consumer(&mut BufReader::new(brotli::Decompressor::new(file, 4096)))
        }
        Compression::Zip => {
            let mut entry_data = Vec::new();
            read_single_zip_entry(file, &mut entry_data)?;
            consumer(&mut Cursor::new(entry_data))
        }
    }
}

/// Like [`read`], but guarantees the consumer a seekable stream.
///
/// Compressed and zipped input is fully materialized into memory first;
/// uncompressed input is served straight from a buffered file.
pub fn read_seekable<T, E, F>(path: &Path, consumer: F) -> Result<T, E>
where
    F: FnOnce(&mut dyn ReadSeek) -> Result<T, E>,
    E: From<StreamError>,
{
    let file = File::open(path).map_err(StreamError::Io)?;
    match Compression::from_path(path) {
        Compression::None => consumer(&mut BufReader::new(file)),
        Compression::Zip => {
            let mut entry_data = Vec::new();
            read_single_zip_entry(file, &mut entry_data)?;
            consumer(&mut Cursor::new(entry_data))
        }
        compression => {
            let mut decompressed = Vec::new();
            decompress_into(file, compression, &mut decompressed)?;
            consumer(&mut Cursor::new(decompressed))
        }
    }
}

/// Writes a tile file, compressing the producer's output and appending the
/// wrapper's suffix to the path. Returns the final path.
pub fn write<E, F>(path: &Path, compression: Compression, producer: F) -> Result<PathBuf, E>
where
    F: FnOnce(&mut dyn Write) -> Result<(), E>,
    E: From<StreamError>,
{
    let target = match compression.suffix() {
        Some(suffix) => {
            let mut name = path.as_os_str().to_owned();
            name.push(".");
            name.push(suffix);
            PathBuf::from(name)
        }
        None => path.to_path_buf(),
    };

    let file = File::create(&target).map_err(StreamError::Io)?;
    match compression {
        Compression::None => {
            let mut writer = BufWriter::new(file);
            producer(&mut writer)?;
            writer.flush().map_err(StreamError::Io)?;
        }
        Compression::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            producer(&mut encoder)?;
            encoder.finish().map_err(StreamError::Io)?;
        }
        Compression::Zstd => {
            let mut encoder =
                zstd::stream::write::Encoder::new(file, 0).map_err(StreamError::Io)?;
            producer(&mut encoder)?;
            encoder.finish().map_err(StreamError::Io)?;
        }
        Compression::Brotli => {
            let mut encoder = brotli::CompressorWriter::new(file, 4096, 5, 22);
            producer(&mut encoder)?;
            encoder.flush().map_err(StreamError::Io)?;
        }
        Compression::Zip => {
            let entry_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "tile".to_string());
            let mut archive = zip::ZipWriter::new(file);
            archive
                .start_file(entry_name, zip::write::SimpleFileOptions::default())
                .map_err(|e| StreamError::Archive(e.to_string()))?;
            producer(&mut archive)?;
            archive
                .finish()
                .map_err(|e| StreamError::Archive(e.to_string()))?;
        }
    }
    Ok(target)
}

fn decompress_into(file: File, compression: Compression, out: &mut Vec<u8>) -> Result<(), StreamError> {
    match compression {
        Compression::Gzip => {
            flate2::read::GzDecoder::new(file).read_to_end(out)?;
        }
        Compression::Zstd => {
            zstd::stream::read::Decoder::new(file)?.read_to_end(out)?;
        }
        Compression::Brotli => {
            brotli::Decompressor::new(file, 4096).read_to_end(out)?;
        }
        Compression::None | Compression::Zip => unreachable!("handled by callers"),
    }
    Ok(())
}

/// Reads the payload of a zip wrapper, requiring exactly one entry.
fn read_single_zip_entry(file: File, out: &mut Vec<u8>) -> Result<(), StreamError> {
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| StreamError::Archive(e.to_string()))?;
    if archive.len() != 1 {
        return Err(StreamError::Archive(format!(
            "expected exactly one zip entry, found {}",
            archive.len()
        )));
    }
    let mut entry = archive
        .by_index(0)
        .map_err(|e| StreamError::Archive(e.to_string()))?;
    entry.read_to_end(out).map_err(StreamError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::SeekFrom;

    const PAYLOAD: &[u8] = b"elevation tile payload bytes";

    fn roundtrip(compression: Compression) {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("tile.dem");

        let written: PathBuf = write(&base, compression, |w: &mut dyn Write| -> Result<(), StreamError> {
            w.write_all(PAYLOAD).map_err(StreamError::Io)
        })
        .unwrap();

        match compression.suffix() {
            Some(suffix) => assert!(written.to_string_lossy().ends_with(suffix)),
            None => assert_eq!(written, base),
        }

        let data: Vec<u8> = read(&written, |r: &mut dyn BufRead| -> Result<Vec<u8>, StreamError> {
            let mut buf = Vec::new();
            r.read_to_end(&mut buf).map_err(StreamError::Io)?;
            Ok(buf)
        })
        .unwrap();
        assert_eq!(data, PAYLOAD);
    }

    #[test]
    fn test_roundtrip_uncompressed() {
        roundtrip(Compression::None);
    }

    #[test]
    fn test_roundtrip_gzip() {
        roundtrip(Compression::Gzip);
    }

    #[test]
    fn test_roundtrip_zstd() {
        roundtrip(Compression::Zstd);
    }

    #[test]
    fn test_roundtrip_brotli() {
        roundtrip(Compression::Brotli);
    }

    #[test]
    fn test_roundtrip_zip() {
        roundtrip(Compression::Zip);
    }

    #[test]
    fn test_detection_is_case_insensitive() {
        assert_eq!(
            Compression::from_path(Path::new("tile.dem.GZ")),
            Compression::Gzip
        );
        assert_eq!(
            Compression::from_path(Path::new("tile.DEM.Zip")),
            Compression::Zip
        );
        assert_eq!(
            Compression::from_path(Path::new("tile.dem")),
            Compression::None
        );
    }

    #[test]
    fn test_strip_compression_reveals_format_extension() {
        assert_eq!(
            strip_compression(Path::new("n47_e008.hgt.gz")),
            PathBuf::from("n47_e008.hgt")
        );
        assert_eq!(
            strip_compression(Path::new("tile.dem")),
            PathBuf::from("tile.dem")
        );
    }

    #[test]
    fn test_zip_with_multiple_entries_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.dem.zip");
        let file = File::create(&path).unwrap();
        let mut archive = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        archive.start_file("a.dem", options).unwrap();
        archive.write_all(b"one").unwrap();
        archive.start_file("b.dem", options).unwrap();
        archive.write_all(b"two").unwrap();
        archive.finish().unwrap();

        let result = read(&path, |r: &mut dyn BufRead| -> Result<Vec<u8>, StreamError> {
            let mut buf = Vec::new();
            r.read_to_end(&mut buf).map_err(StreamError::Io)?;
            Ok(buf)
        });
        assert!(matches!(result, Err(StreamError::Archive(_))));
    }

    #[test]
    fn test_read_seekable_on_compressed_input() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("tile.dem");
        let written = write(&base, Compression::Gzip, |w: &mut dyn Write| -> Result<(), StreamError> {
            w.write_all(PAYLOAD).map_err(StreamError::Io)
        })
        .unwrap();

        let tail: Vec<u8> = read_seekable(&written, |r: &mut dyn ReadSeek| -> Result<Vec<u8>, StreamError> {
            r.seek(SeekFrom::End(-5)).map_err(StreamError::Io)?;
            let mut buf = Vec::new();
            r.read_to_end(&mut buf).map_err(StreamError::Io)?;
            // Seek back to the start to prove full random access.
            r.seek(SeekFrom::Start(0)).map_err(StreamError::Io)?;
            Ok(buf)
        })
        .unwrap();
        assert_eq!(tail, &PAYLOAD[PAYLOAD.len() - 5..]);
    }
}
