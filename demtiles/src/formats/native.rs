//! Native binary tile format.
//!
//! A fixed 0x42-byte header followed by the raw little-endian sample array
//! in row-major order, row 0 southernmost:
//!
//! ```text
//! 0x00  magic "DEMT"
//! 0x04  format major version
//! 0x05  format minor version
//! 0x06  element type tag   {0=f32, 1=i16, 2=u16, 3=f64}
//! 0x07  raster type tag    {1=PixelIsArea, 2=PixelIsPoint}
//! 0x08  start latitude     f64 LE
//! 0x10  start longitude    f64 LE
//! 0x18  end latitude       f64 LE
//! 0x20  end longitude      f64 LE
//! 0x28  points latitude    i32 LE
//! 0x2C  points longitude   i32 LE
//! 0x30  reserved
//! 0x38  payload element count  i32 LE
//! 0x3C  reserved
//! 0x42  payload
//! ```
//!
//! [`load_metadata`] reads the header only, which is what the filesystem
//! index scan relies on.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::coord::Coordinates;
use crate::formats::FormatError;
use crate::raster::{CellMetadata, DataCell, DemCell, RasterType, Sample};

/// Magic constant opening every native tile.
pub const MAGIC: [u8; 4] = *b"DEMT";
/// Current format version.
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

const HEADER_LEN: usize = 0x42;
const ELEMENT_COUNT_OFFSET: u64 = 0x38;

struct Header {
    element_tag: u8,
    metadata: CellMetadata,
    element_count: usize,
}

fn read_header(reader: &mut dyn Read) -> Result<Header, FormatError> {
    let mut raw = [0u8; HEADER_LEN];
    reader.read_exact(&mut raw)?;

    if raw[0..4] != MAGIC {
        return Err(FormatError::BadMagic);
    }
    let (major, minor) = (raw[4], raw[5]);
    if major != VERSION_MAJOR {
        return Err(FormatError::UnsupportedVersion { major, minor });
    }

    let element_tag = raw[6];
    let raster_type = match raw[7] {
        1 => RasterType::PixelIsArea,
        2 => RasterType::PixelIsPoint,
        tag => return Err(FormatError::UnknownRasterTag(tag)),
    };

    let mut cursor = Cursor::new(&raw[8..]);
    let start_lat = cursor.read_f64::<LittleEndian>()?;
    let start_lon = cursor.read_f64::<LittleEndian>()?;
    let end_lat = cursor.read_f64::<LittleEndian>()?;
    let end_lon = cursor.read_f64::<LittleEndian>()?;
    let points_lat = cursor.read_i32::<LittleEndian>()?;
    let points_lon = cursor.read_i32::<LittleEndian>()?;

    let mut cursor = Cursor::new(&raw[..]);
    cursor.set_position(ELEMENT_COUNT_OFFSET);
    let element_count = cursor.read_i32::<LittleEndian>()?;

    let metadata = CellMetadata::new(
        raster_type,
        Coordinates::new(start_lat, start_lon),
        Coordinates::new(end_lat, end_lon),
        points_lat.max(0) as usize,
        points_lon.max(0) as usize,
    )?;

    Ok(Header {
        element_tag,
        metadata,
        element_count: element_count.max(0) as usize,
    })
}

fn read_payload<T: Sample>(
    reader: &mut dyn Read,
    metadata: CellMetadata,
    element_count: usize,
) -> Result<DataCell<T>, FormatError> {
    let mut raw = vec![0u8; element_count * T::BYTES];
    reader.read_exact(&mut raw)?;
    let values = raw.chunks_exact(T::BYTES).map(T::read_le).collect();
    Ok(DataCell::new(metadata, values)?)
}

/// Loads a full native tile.
pub fn load(reader: &mut dyn Read) -> Result<DemCell, FormatError> {
    let header = read_header(reader)?;
    let cell = match header.element_tag {
        0 => read_payload::<f32>(reader, header.metadata, header.element_count)?.into(),
        1 => read_payload::<i16>(reader, header.metadata, header.element_count)?.into(),
        2 => read_payload::<u16>(reader, header.metadata, header.element_count)?.into(),
        3 => read_payload::<f64>(reader, header.metadata, header.element_count)?.into(),
        tag => return Err(FormatError::UnknownElementTag(tag)),
    };
    Ok(cell)
}

/// Reads the header only; the payload is never touched.
pub fn load_metadata(reader: &mut dyn Read) -> Result<CellMetadata, FormatError> {
    Ok(read_header(reader)?.metadata)
}

/// Writes a typed cell in the native format.
pub fn save<T: Sample>(cell: &DataCell<T>, writer: &mut dyn Write) -> Result<(), FormatError> {
    let element_tag = T::NATIVE_TAG
        .ok_or_else(|| FormatError::UnencodableElementType(std::any::type_name::<T>()))?;
    let metadata = cell.metadata();
    let raster_tag = match metadata.raster_type {
        RasterType::PixelIsArea => 1u8,
        RasterType::PixelIsPoint => 2u8,
        RasterType::Unknown => return Err(FormatError::UnknownRasterType),
    };

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&MAGIC);
    header.push(VERSION_MAJOR);
    header.push(VERSION_MINOR);
    header.push(element_tag);
    header.push(raster_tag);
    header.write_f64::<LittleEndian>(metadata.start.latitude)?;
    header.write_f64::<LittleEndian>(metadata.start.longitude)?;
    header.write_f64::<LittleEndian>(metadata.end.latitude)?;
    header.write_f64::<LittleEndian>(metadata.end.longitude)?;
    header.write_i32::<LittleEndian>(metadata.points_lat as i32)?;
    header.write_i32::<LittleEndian>(metadata.points_lon as i32)?;
    header.resize(ELEMENT_COUNT_OFFSET as usize, 0);
    header.write_i32::<LittleEndian>(cell.values().len() as i32)?;
    header.resize(HEADER_LEN, 0);
    writer.write_all(&header)?;

    let mut payload = Vec::with_capacity(cell.values().len() * T::BYTES);
    for value in cell.values() {
        value.write_le(&mut payload);
    }
    writer.write_all(&payload)?;
    Ok(())
}

/// Writes a type-erased cell, failing for element types the format has no
/// tag for.
pub fn save_cell(cell: &DemCell, writer: &mut dyn Write) -> Result<(), FormatError> {
    match cell {
        DemCell::F32(c) => save(c, writer),
        DemCell::F64(c) => save(c, writer),
        DemCell::I16(c) => save(c, writer),
        DemCell::U16(c) => save(c, writer),
        DemCell::I32(c) => save(c, writer),
    }
}
