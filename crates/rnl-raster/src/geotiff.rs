//! Single-band GeoTIFF (`.tif`) reading and writing.
//!
//! The grid transform comes from the ModelTiepoint and ModelPixelScale tags,
//! nodata from the GDAL_NODATA tag. Rotated grids (ModelTransformation) and
//! non-square cells are rejected.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{RasterError, RasterResult};
use crate::grid::Raster;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;
/// GeoKey holding the raster registration; value 2 means PixelIsPoint.
const GT_RASTER_TYPE: u16 = 1025;
const RASTER_PIXEL_IS_POINT: u16 = 2;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn invalid(path: &Path, what: impl std::fmt::Display) -> RasterError {
    RasterError::InvalidArg {
        what: format!("{}: {what}", path.display()),
    }
}

fn values(result: DecodingResult) -> Option<Vec<f64>> {
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(values)
}

/// Whether the GeoKey directory marks the raster as PixelIsPoint.
fn pixel_is_point(directory: &[u16]) -> bool {
    // header of 4, then entries of (key, location, count, value)
    directory
        .get(4..)
        .unwrap_or_default()
        .chunks_exact(4)
        .any(|entry| entry[0] == GT_RASTER_TYPE && entry[1] == 0 && entry[3] == RASTER_PIXEL_IS_POINT)
}

/// Read the first band of a GeoTIFF.
pub fn read_geotiff(path: &Path) -> RasterResult<Raster> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;

    let scale = decoder
        .get_tag_f64_vec(tag(MODEL_PIXEL_SCALE))
        .map_err(|_| invalid(path, "no ModelPixelScale tag"))?;
    let tiepoint = decoder
        .get_tag_f64_vec(tag(MODEL_TIEPOINT))
        .map_err(|_| invalid(path, "no ModelTiepoint tag"))?;
    let ([sx, sy, ..], [i, j, _, x, y, ..]) = (scale.as_slice(), tiepoint.as_slice()) else {
        return Err(invalid(path, "incomplete georeferencing tags"));
    };
    if (sx - sy).abs() > 1e-9 * sx.abs().max(1.0) {
        return Err(invalid(path, format!("non-square cells {sx} x {sy}")));
    }
    let cell_size = *sx;
    let mut xmin = x - i * cell_size;
    let mut ymax = y + j * cell_size;
    let directory = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)).unwrap_or_default();
    if pixel_is_point(&directory) {
        xmin -= cell_size / 2.0;
        ymax += cell_size / 2.0;
    }
    let nodata = decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|text| text.trim_matches(char::from(0)).trim().parse::<f64>().ok());

    let data = values(decoder.read_image()?).ok_or_else(|| invalid(path, "unsupported sample format"))?;
    // keep the first sample of interleaved pixels
    let pixels = width as usize * height as usize;
    let data: Vec<f64> = match data.len().checked_div(pixels) {
        Some(samples) if samples > 1 => data.into_iter().step_by(samples).collect(),
        _ => data,
    };
    let raster = Raster::new(width as usize, height as usize, xmin, ymax, cell_size, data)?;
    debug!(
        path = %path.display(),
        rows = raster.nrows,
        cols = raster.ncols,
        cell_size,
        "read GeoTIFF"
    );
    Ok(match nodata {
        Some(nodata) => raster.with_nodata(nodata),
        None => raster,
    })
}

/// Write a raster as a 32-bit float GeoTIFF.
pub fn write_geotiff(raster: &Raster, path: &Path) -> RasterResult<()> {
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image =
        encoder.new_image::<colortype::Gray32Float>(raster.ncols as u32, raster.nrows as u32)?;
    let scale = [raster.cell_size, raster.cell_size, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, raster.xmin, raster.ymax, 0.0];
    image.encoder().write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
    image.encoder().write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
    if let Some(nodata) = raster.nodata {
        image.encoder().write_tag(tag(GDAL_NODATA), nodata.to_string().as_str())?;
    }
    let data: Vec<f32> = raster.data.iter().map(|v| *v as f32).collect();
    image.write_data(&data)?;
    Ok(())
}

/// Read a raster by extension: `.tif`/`.tiff` as GeoTIFF, `.asc` as ESRI ASCII.
pub fn read_raster(path: &Path) -> RasterResult<Raster> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "tif" | "tiff" => read_geotiff(path),
        "asc" => crate::ascii::read_ascii(path),
        other => Err(invalid(path, format!("unsupported raster format '{other}'"))),
    }
}
