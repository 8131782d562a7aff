//! SRTM `.hgt` tile decoding.
//!
//! An hgt file has no header at all. The south-west corner is encoded in
//! the filename (`N47E008`, `S12W077`) and the grid size is implied by the
//! payload length: 1201x1201 samples for 3-arc-second data, 3601x3601 for
//! 1-arc-second data. Samples are big-endian signed 16-bit integers stored
//! north-first; the void marker `0x8000` is remapped to the crate's i16
//! sentinel. Every tile covers exactly one degree by one degree.

use byteorder::{BigEndian, ByteOrder};
use regex::Regex;
use std::sync::OnceLock;

use crate::coord::Coordinates;
use crate::formats::FormatError;
use crate::raster::{CellMetadata, DataCell, RasterType, Sample};

const SRTM3_POINTS: usize = 1201;
const SRTM1_POINTS: usize = 3601;
const VOID: i16 = i16::MIN;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([NS])(\d{2})([EW])(\d{3})$").unwrap())
}

/// Parses the south-west corner from an hgt filename stem.
fn south_west_corner(stem: &str) -> Result<Coordinates, FormatError> {
    let upper = stem.to_ascii_uppercase();
    let captures = name_pattern()
        .captures(&upper)
        .ok_or_else(|| FormatError::BadHgtName(stem.to_string()))?;

    let mut latitude: f64 = captures[2].parse().unwrap();
    if &captures[1] == "S" {
        latitude = -latitude;
    }
    let mut longitude: f64 = captures[4].parse().unwrap();
    if &captures[3] == "W" {
        longitude = -longitude;
    }
    Ok(Coordinates::new(latitude, longitude))
}

fn points_per_side(byte_len: usize) -> Result<usize, FormatError> {
    match byte_len {
        n if n == SRTM3_POINTS * SRTM3_POINTS * 2 => Ok(SRTM3_POINTS),
        n if n == SRTM1_POINTS * SRTM1_POINTS * 2 => Ok(SRTM1_POINTS),
        n => Err(FormatError::BadHgtLength(n)),
    }
}

/// Metadata for an hgt tile, derived from the filename stem and the
/// payload byte length alone.
pub fn metadata(stem: &str, byte_len: usize) -> Result<CellMetadata, FormatError> {
    let start = south_west_corner(stem)?;
    let points = points_per_side(byte_len)?;
    let end = Coordinates::new(start.latitude + 1.0, start.longitude + 1.0);
    Ok(CellMetadata::new(
        RasterType::PixelIsPoint,
        start,
        end,
        points,
        points,
    )?)
}

/// Decodes a full hgt tile from its filename stem and raw payload.
pub fn load(stem: &str, data: &[u8]) -> Result<DataCell<i16>, FormatError> {
    let meta = metadata(stem, data.len())?;
    let points = meta.points_lon;

    // The file stores the northernmost row first; rows are flipped so
    // that row 0 ends up southernmost.
    let mut values = vec![0i16; points * points];
    for (file_row, chunk) in data.chunks_exact(points * 2).enumerate() {
        let row = points - 1 - file_row;
        let out = &mut values[row * points..(row + 1) * points];
        BigEndian::read_i16_into(chunk, out);
    }
    for value in &mut values {
        if *value == VOID {
            *value = i16::NO_VALUE;
        }
    }
    Ok(DataCell::new(meta, values)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(points: usize, rows_north_first: &[Vec<i16>]) -> Vec<u8> {
        let mut data = vec![0u8; points * points * 2];
        for (i, row) in rows_north_first.iter().enumerate() {
            BigEndian::write_i16_into(row, &mut data[i * points * 2..(i + 1) * points * 2]);
        }
        data
    }

    #[test]
    fn test_corner_parsing() {
        assert_eq!(
            south_west_corner("N47E008").unwrap(),
            Coordinates::new(47.0, 8.0)
        );
        assert_eq!(
            south_west_corner("S12W077").unwrap(),
            Coordinates::new(-12.0, -77.0)
        );
        assert_eq!(
            south_west_corner("n00e000").unwrap(),
            Coordinates::new(0.0, 0.0)
        );
    }

    #[test]
    fn test_bad_names_are_rejected() {
        for stem in ["N47", "X47E008", "N47E08", "N470E008", "tile"] {
            assert!(matches!(
                south_west_corner(stem),
                Err(FormatError::BadHgtName(_))
            ));
        }
    }

    #[test]
    fn test_metadata_spans_one_degree() {
        let byte_len = SRTM3_POINTS * SRTM3_POINTS * 2;
        let meta = metadata("N47E008", byte_len).unwrap();
        assert_eq!(meta.raster_type, RasterType::PixelIsPoint);
        assert_eq!(meta.start, Coordinates::new(47.0, 8.0));
        assert_eq!(meta.end, Coordinates::new(48.0, 9.0));
        assert_eq!(meta.points_lat, SRTM3_POINTS);
        assert_eq!(meta.points_lon, SRTM3_POINTS);
    }

    #[test]
    fn test_unknown_length_is_rejected() {
        assert!(matches!(
            metadata("N47E008", 1234),
            Err(FormatError::BadHgtLength(1234))
        ));
    }

    #[test]
    fn test_rows_are_flipped_south_first() {
        // Build a minimal synthetic payload at SRTM3 size where each
        // row holds its file index, then check row 0 is the last file row.
        let points = SRTM3_POINTS;
        let rows: Vec<Vec<i16>> = (0..points).map(|i| vec![i as i16; points]).collect();
        let data = encode(points, &rows);

        let cell = load("N47E008", &data).unwrap();
        assert_eq!(cell.values()[0], (points - 1) as i16);
        assert_eq!(cell.values()[(points - 1) * points], 0);
    }

    #[test]
    fn test_void_samples_become_sentinel() {
        let points = SRTM3_POINTS;
        let mut rows: Vec<Vec<i16>> = (0..points).map(|_| vec![100i16; points]).collect();
        rows[0][0] = VOID;
        let data = encode(points, &rows);

        let cell = load("N47E008", &data).unwrap();
        // File row 0 is the northernmost row, landing at the top of the grid.
        let top_left = cell.values()[(points - 1) * points];
        assert!(top_left.is_no_value());
        assert_eq!(cell.values()[0], 100);
    }

    #[test]
    fn test_negative_elevations_survive() {
        let points = SRTM3_POINTS;
        let mut rows: Vec<Vec<i16>> = (0..points).map(|_| vec![0i16; points]).collect();
        rows[points - 1][0] = -415; // Dead Sea shoreline depth
        let data = encode(points, &rows);

        let cell = load("N31E035", &data).unwrap();
        assert_eq!(cell.values()[0], -415);
    }
}
