//! ESRI ASCII grid codec.
//!
//! Six header lines (`ncols`, `nrows`, `xllcorner`/`xllcenter`,
//! `yllcorner`/`yllcenter`, `cellsize`, `NODATA_value`) followed by
//! whitespace-delimited samples, northernmost row first. Corner-anchored
//! headers describe a point grid, center-anchored headers an area grid.
//! Samples decode as `f32`, with the declared nodata value mapped to NaN.

use std::collections::HashMap;
use std::io::{BufRead, Write};

use crate::coord::Coordinates;
use crate::formats::FormatError;
use crate::raster::{CellMetadata, DataCell, RasterType, Sample};

const NODATA_OUT: f32 = -9999.0;

struct AsciiHeader {
    metadata: CellMetadata,
    nodata: f32,
}

fn parse_key_value(line: &str) -> Option<(String, f64)> {
    let mut parts = line.split_whitespace();
    let key = parts.next()?.to_ascii_lowercase();
    let value: f64 = parts.next()?.parse().ok()?;
    Some((key, value))
}

fn require(header: &HashMap<String, f64>, key: &'static str) -> Result<f64, FormatError> {
    header
        .get(key)
        .copied()
        .ok_or(FormatError::MissingHeaderKey(key))
}

fn read_header(reader: &mut dyn BufRead) -> Result<AsciiHeader, FormatError> {
    let mut fields = HashMap::new();
    for _ in 0..6 {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if let Some((key, value)) = parse_key_value(&line) {
            fields.insert(key, value);
        }
    }

    let points_lon = require(&fields, "ncols")? as usize;
    let points_lat = require(&fields, "nrows")? as usize;
    let cellsize = require(&fields, "cellsize")?;
    let nodata = require(&fields, "nodata_value")? as f32;

    let (raster_type, start, end) = if fields.contains_key("xllcorner") {
        let xll = require(&fields, "xllcorner")?;
        let yll = require(&fields, "yllcorner")?;
        let start = Coordinates::new(yll, xll);
        let end = Coordinates::new(
            yll + cellsize * (points_lat as f64 - 1.0),
            xll + cellsize * (points_lon as f64 - 1.0),
        );
        (RasterType::PixelIsPoint, start, end)
    } else {
        let xllcenter = require(&fields, "xllcenter")?;
        let yllcenter = require(&fields, "yllcenter")?;
        let start = Coordinates::new(yllcenter - cellsize / 2.0, xllcenter - cellsize / 2.0);
        let end = Coordinates::new(
            start.latitude + cellsize * points_lat as f64,
            start.longitude + cellsize * points_lon as f64,
        );
        (RasterType::PixelIsArea, start, end)
    };

    Ok(AsciiHeader {
        metadata: CellMetadata::new(raster_type, start, end, points_lat, points_lon)?,
        nodata,
    })
}

/// Reads the six header lines only.
pub fn load_metadata(reader: &mut dyn BufRead) -> Result<CellMetadata, FormatError> {
    Ok(read_header(reader)?.metadata)
}

/// Decodes a full ASCII grid tile.
pub fn load(reader: &mut dyn BufRead) -> Result<DataCell<f32>, FormatError> {
    let header = read_header(reader)?;
    let meta = header.metadata;
    let expected = meta.points_lat * meta.points_lon;

    let mut file_order = Vec::with_capacity(expected);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        for token in line.split_whitespace() {
            let value: f32 = token.parse().map_err(|_| {
                FormatError::MalformedAsciiGrid(format!("unparseable sample '{token}'"))
            })?;
            file_order.push(if value == header.nodata {
                f32::NO_VALUE
            } else {
                value
            });
        }
    }
    if file_order.len() != expected {
        return Err(FormatError::MalformedAsciiGrid(format!(
            "expected {} samples, found {}",
            expected,
            file_order.len()
        )));
    }

    // The file starts with the northernmost row; flip to row 0 southernmost.
    let mut values = Vec::with_capacity(expected);
    for row in file_order.chunks_exact(meta.points_lon).rev() {
        values.extend_from_slice(row);
    }
    Ok(DataCell::new(meta, values)?)
}

/// Encodes a cell as an ASCII grid.
pub fn save(cell: &DataCell<f32>, writer: &mut dyn Write) -> Result<(), FormatError> {
    let meta = cell.metadata();
    let cellsize = meta.resolution_lon();

    writeln!(writer, "{:<14}{}", "ncols", meta.points_lon)?;
    writeln!(writer, "{:<14}{}", "nrows", meta.points_lat)?;
    match meta.raster_type {
        RasterType::PixelIsPoint => {
            writeln!(writer, "{:<14}{}", "xllcorner", meta.start.longitude)?;
            writeln!(writer, "{:<14}{}", "yllcorner", meta.start.latitude)?;
        }
        RasterType::PixelIsArea => {
            writeln!(
                writer,
                "{:<14}{}",
                "xllcenter",
                meta.start.longitude + cellsize / 2.0
            )?;
            writeln!(
                writer,
                "{:<14}{}",
                "yllcenter",
                meta.start.latitude + meta.resolution_lat() / 2.0
            )?;
        }
        RasterType::Unknown => return Err(FormatError::UnknownRasterType),
    }
    writeln!(writer, "{:<14}{}", "cellsize", cellsize)?;
    writeln!(writer, "{:<14}{}", "NODATA_value", NODATA_OUT)?;

    // Rows are written north-first, mirroring the load path.
    for row in cell.values().chunks_exact(meta.points_lon).rev() {
        let mut line = String::new();
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            if value.is_no_value() {
                line.push_str(&format!("{NODATA_OUT}"));
            } else {
                line.push_str(&format!("{value:.2}"));
            }
        }
        writeln!(writer, "{line}")?;
    }
    Ok(())
}
