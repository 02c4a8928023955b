//! ESRI ASCII grid (`.asc`) reading and writing.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{RasterError, RasterResult};
use crate::grid::Raster;

fn parse_err(line: usize, message: impl Into<String>) -> RasterError {
    RasterError::Parse {
        line,
        message: message.into(),
    }
}

/// Parse an ESRI ASCII grid.
///
/// Both corner (`xllcorner`) and centre (`xllcenter`) registrations are
/// accepted; header keys are case-insensitive.
pub fn parse_ascii(text: &str) -> RasterResult<Raster> {
    let mut ncols = None;
    let mut nrows = None;
    let mut xll = None;
    let mut yll = None;
    let mut centre = false;
    let mut cell_size = None;
    let mut nodata = None;
    let mut values = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let first = trimmed.split_whitespace().next().unwrap_or_default();
        if first.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) && values.is_empty() {
            let mut parts = trimmed.split_whitespace();
            let key = parts.next().unwrap_or_default().to_ascii_lowercase();
            let raw = parts
                .next()
                .ok_or_else(|| parse_err(line_no, format!("missing value for '{key}'")))?;
            let value: f64 = raw
                .parse()
                .map_err(|_| parse_err(line_no, format!("invalid number '{raw}'")))?;
            match key.as_str() {
                "ncols" => ncols = Some(value as usize),
                "nrows" => nrows = Some(value as usize),
                "xllcorner" => xll = Some(value),
                "yllcorner" => yll = Some(value),
                "xllcenter" => {
                    xll = Some(value);
                    centre = true;
                }
                "yllcenter" => {
                    yll = Some(value);
                    centre = true;
                }
                "cellsize" => cell_size = Some(value),
                "nodata_value" => nodata = Some(value),
                other => return Err(parse_err(line_no, format!("unknown header '{other}'"))),
            }
            continue;
        }
        for raw in trimmed.split_whitespace() {
            let value: f64 = raw
                .parse()
                .map_err(|_| parse_err(line_no, format!("invalid number '{raw}'")))?;
            values.push(value);
        }
    }

    let missing = |what: &str| parse_err(0, format!("missing header '{what}'"));
    let ncols = ncols.ok_or_else(|| missing("ncols"))?;
    let nrows = nrows.ok_or_else(|| missing("nrows"))?;
    let cell_size = cell_size.ok_or_else(|| missing("cellsize"))?;
    let mut xmin = xll.ok_or_else(|| missing("xllcorner"))?;
    let mut ymin = yll.ok_or_else(|| missing("yllcorner"))?;
    if centre {
        xmin -= cell_size / 2.0;
        ymin -= cell_size / 2.0;
    }
    let ymax = ymin + nrows as f64 * cell_size;

    let raster = Raster::new(ncols, nrows, xmin, ymax, cell_size, values)?;
    Ok(match nodata {
        Some(nd) => raster.with_nodata(nd),
        None => raster,
    })
}

pub fn read_ascii(path: &Path) -> RasterResult<Raster> {
    let text = fs::read_to_string(path)?;
    let raster = parse_ascii(&text)?;
    debug!(path = %path.display(), rows = raster.nrows, cols = raster.ncols, "read ASCII grid");
    Ok(raster)
}

pub fn to_ascii(raster: &Raster) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ncols {}", raster.ncols);
    let _ = writeln!(out, "nrows {}", raster.nrows);
    let _ = writeln!(out, "xllcorner {}", raster.xmin);
    let _ = writeln!(out, "yllcorner {}", raster.ymin());
    let _ = writeln!(out, "cellsize {}", raster.cell_size);
    let nodata = raster.nodata.unwrap_or(-9999.0);
    let _ = writeln!(out, "NODATA_value {nodata}");
    for row in raster.data.chunks(raster.ncols.max(1)) {
        let line: Vec<String> = row
            .iter()
            .map(|v| if v.is_nan() { nodata.to_string() } else { v.to_string() })
            .collect();
        let _ = writeln!(out, "{}", line.join(" "));
    }
    out
}

pub fn write_ascii(raster: &Raster, path: &Path) -> RasterResult<()> {
    fs::write(path, to_ascii(raster))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    const GRID: &str = "ncols 3
nrows 2
xllcorner 100.0
yllcorner 200.0
cellsize 5
NODATA_value -9999
1 2 3
4 -9999 6
";

    #[test]
    fn parse_corner_grid() {
        let r = parse_ascii(GRID).unwrap();
        assert_eq!(r.shape(), (2, 3));
        assert_eq!(r.ymax, 210.0);
        assert_eq!(r.value_at(Point::new(101.0, 209.0)), Some(1.0));
        assert_eq!(r.value_at(Point::new(106.0, 201.0)), None);
    }

    #[test]
    fn centre_registration_shifts_origin() {
        let text = GRID.replace("xllcorner 100.0", "xllcenter 102.5").replace("yllcorner", "yllcenter");
        let r = parse_ascii(&text).unwrap();
        assert_eq!(r.xmin, 100.0);
        assert_eq!(r.ymin(), 197.5);
    }

    #[test]
    fn wrong_value_count_is_rejected() {
        assert!(parse_ascii(&GRID.replace("4 -9999 6", "4 5")).is_err());
        assert!(matches!(
            parse_ascii("ncols x\n"),
            Err(RasterError::Parse { line: 1, .. })
        ));
    }
}
