//! GeoTIFF tile decoding.
//!
//! Bounds come from the pixel-scale and tiepoint tags: the tiepoint names
//! the north-west corner and the Y scale runs southward, so the decoded
//! start carries the southern edge and the end the northern edge. The
//! GeoKey directory (key 1025) selects the raster type, defaulting to
//! area-anchored when absent. Supported sample layouts are signed and
//! unsigned 16-bit integers and 32/64-bit floats; everything else fails
//! naming the format and bit depth.

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::coord::Coordinates;
use crate::formats::FormatError;
use crate::raster::{CellMetadata, DataCell, DemCell, RasterType, Sample};
use crate::stream::ReadSeek;

const RASTER_TYPE_GEOKEY: u64 = 1025;

fn raster_type_from_geokeys(directory: &[u64]) -> RasterType {
    // The directory is a header of four shorts followed by four-short
    // entries of (key id, tag location, count, value).
    for entry in directory[4.min(directory.len())..].chunks_exact(4) {
        if entry[0] == RASTER_TYPE_GEOKEY && entry[1] == 0 {
            return match entry[3] {
                1 => RasterType::PixelIsArea,
                2 => RasterType::PixelIsPoint,
                _ => RasterType::Unknown,
            };
        }
    }
    RasterType::PixelIsArea
}

fn read_metadata<R: ReadSeek>(decoder: &mut Decoder<R>) -> Result<CellMetadata, FormatError> {
    let (width, height) = decoder.dimensions()?;

    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag)?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag)?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(FormatError::MalformedGeoTiff(
            "pixel scale or tiepoint tag too short".to_string(),
        ));
    }
    let (scale_lon, scale_lat) = (scale[0], scale[1]);
    let (west, north) = (tiepoint[3], tiepoint[4]);

    let raster_type = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
        Some(value) => raster_type_from_geokeys(&value.into_u64_vec()?),
        None => RasterType::PixelIsArea,
    };

    // The tiepoint anchors the northern edge; the start must hold the
    // southern one so that start <= end on both axes.
    let (span_lat, span_lon) = match raster_type {
        RasterType::PixelIsPoint => (
            scale_lat * (height as f64 - 1.0),
            scale_lon * (width as f64 - 1.0),
        ),
        _ => (scale_lat * height as f64, scale_lon * width as f64),
    };
    let start = Coordinates::new(north - span_lat, west);
    let end = Coordinates::new(north, west + span_lon);

    Ok(CellMetadata::new(
        raster_type,
        start,
        end,
        height as usize,
        width as usize,
    )?)
}

fn flip_rows<T: Copy>(file_order: Vec<T>, width: usize) -> Vec<T> {
    let mut values = Vec::with_capacity(file_order.len());
    for row in file_order.chunks_exact(width).rev() {
        values.extend_from_slice(row);
    }
    values
}

fn into_cell<T: Sample>(
    metadata: CellMetadata,
    file_order: Vec<T>,
) -> Result<DataCell<T>, FormatError> {
    let width = metadata.points_lon;
    Ok(DataCell::new(metadata, flip_rows(file_order, width))?)
}

/// Reads the geographic metadata without decoding the image payload.
pub fn load_metadata(reader: &mut dyn ReadSeek) -> Result<CellMetadata, FormatError> {
    let mut decoder = Decoder::new(reader)?;
    read_metadata(&mut decoder)
}

/// Decodes a full GeoTIFF tile.
pub fn load(reader: &mut dyn ReadSeek) -> Result<DemCell, FormatError> {
    let mut decoder = Decoder::new(reader)?;
    let metadata = read_metadata(&mut decoder)?;

    let cell = match decoder.read_image()? {
        DecodingResult::I16(data) => into_cell(metadata, data)?.into(),
        DecodingResult::U16(data) => into_cell(metadata, data)?.into(),
        DecodingResult::F32(data) => into_cell(metadata, data)?.into(),
        DecodingResult::F64(data) => into_cell(metadata, data)?.into(),
        DecodingResult::U8(_) => unsupported("unsigned integer", 8)?,
        DecodingResult::I8(_) => unsupported("signed integer", 8)?,
        DecodingResult::U32(_) => unsupported("unsigned integer", 32)?,
        DecodingResult::I32(_) => unsupported("signed integer", 32)?,
        DecodingResult::U64(_) => unsupported("unsigned integer", 64)?,
        DecodingResult::I64(_) => unsupported("signed integer", 64)?,
    };
    Ok(cell)
}

fn unsupported(format: &'static str, bits: u8) -> Result<DemCell, FormatError> {
    Err(FormatError::UnsupportedSampleFormat { format, bits })
}
