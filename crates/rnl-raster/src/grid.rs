//! In-memory raster grid.

use geo::{Coord, Intersects, Point, Polygon, Rect};

use crate::error::{RasterError, RasterResult};

/// Single-band, north-up raster. Row 0 is the northern row.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub ncols: usize,
    pub nrows: usize,
    /// x of the western edge.
    pub xmin: f64,
    /// y of the northern edge.
    pub ymax: f64,
    pub cell_size: f64,
    pub nodata: Option<f64>,
    /// Row-major values, `nrows * ncols` long.
    pub data: Vec<f64>,
}

impl Raster {
    pub fn new(
        ncols: usize,
        nrows: usize,
        xmin: f64,
        ymax: f64,
        cell_size: f64,
        data: Vec<f64>,
    ) -> RasterResult<Self> {
        if data.len() != ncols * nrows {
            return Err(RasterError::InvalidArg {
                what: format!(
                    "expected {} values for a {nrows}x{ncols} grid, got {}",
                    ncols * nrows,
                    data.len()
                ),
            });
        }
        if !(cell_size > 0.0) {
            return Err(RasterError::InvalidArg {
                what: format!("cell size must be positive, got {cell_size}"),
            });
        }
        Ok(Self {
            ncols,
            nrows,
            xmin,
            ymax,
            cell_size,
            nodata: None,
            data,
        })
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Raster of constant value.
    pub fn filled(ncols: usize, nrows: usize, xmin: f64, ymax: f64, cell_size: f64, value: f64) -> RasterResult<Self> {
        Self::new(ncols, nrows, xmin, ymax, cell_size, vec![value; ncols * nrows])
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Same shape, origin and cell size.
    pub fn same_grid(&self, other: &Raster) -> bool {
        self.shape() == other.shape()
            && self.xmin == other.xmin
            && self.ymax == other.ymax
            && self.cell_size == other.cell_size
    }

    pub fn cell_area(&self) -> f64 {
        self.cell_size * self.cell_size
    }

    pub fn xmax(&self) -> f64 {
        self.xmin + self.ncols as f64 * self.cell_size
    }

    pub fn ymin(&self) -> f64 {
        self.ymax - self.nrows as f64 * self.cell_size
    }

    /// Raw value, including nodata.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.nrows && col < self.ncols).then(|| self.data[row * self.ncols + col])
    }

    /// Value unless nodata or NaN.
    pub fn valid(&self, row: usize, col: usize) -> Option<f64> {
        self.get(row, col).filter(|v| !self.is_nodata(*v))
    }

    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nd| value == nd)
    }

    /// Cell (row, col) containing a point.
    pub fn cell_of(&self, point: Point<f64>) -> Option<(usize, usize)> {
        let col = ((point.x() - self.xmin) / self.cell_size).floor();
        let row = ((self.ymax - point.y()) / self.cell_size).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        (row < self.nrows && col < self.ncols).then_some((row, col))
    }

    /// Valid value at a point.
    pub fn value_at(&self, point: Point<f64>) -> Option<f64> {
        let (row, col) = self.cell_of(point)?;
        self.valid(row, col)
    }

    pub fn cell_center(&self, row: usize, col: usize) -> Point<f64> {
        Point::new(
            self.xmin + (col as f64 + 0.5) * self.cell_size,
            self.ymax - (row as f64 + 0.5) * self.cell_size,
        )
    }

    pub fn cell_rect(&self, row: usize, col: usize) -> Rect<f64> {
        let x0 = self.xmin + col as f64 * self.cell_size;
        let y1 = self.ymax - row as f64 * self.cell_size;
        Rect::new(
            Coord { x: x0, y: y1 - self.cell_size },
            Coord { x: x0 + self.cell_size, y: y1 },
        )
    }

    /// Row/col window covering a bounding box, clipped to the raster.
    pub fn window(&self, bounds: Rect<f64>) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let c0 = ((bounds.min().x - self.xmin) / self.cell_size).floor().max(0.0) as usize;
        let c1 = (((bounds.max().x - self.xmin) / self.cell_size).ceil().max(0.0) as usize).min(self.ncols);
        let r0 = ((self.ymax - bounds.max().y) / self.cell_size).floor().max(0.0) as usize;
        let r1 = (((self.ymax - bounds.min().y) / self.cell_size).ceil().max(0.0) as usize).min(self.nrows);
        (c0 < c1 && r0 < r1).then_some((r0..r1, c0..c1))
    }

    /// Cells covered by a polygon: cell centres inside it, or every cell
    /// touching it when `all_touched` is set.
    pub fn mask(&self, polygon: &Polygon<f64>, all_touched: bool) -> Vec<(usize, usize)> {
        use geo::BoundingRect;
        let Some(bounds) = polygon.bounding_rect() else {
            return Vec::new();
        };
        let Some((rows, cols)) = self.window(bounds) else {
            return Vec::new();
        };
        let mut cells = Vec::new();
        for row in rows {
            for col in cols.clone() {
                let hit = if all_touched {
                    polygon.intersects(&self.cell_rect(row, col))
                } else {
                    polygon.intersects(&self.cell_center(row, col))
                };
                if hit {
                    cells.push((row, col));
                }
            }
        }
        cells
    }

    /// Cell-wise `f(self, other)`; nodata in either input stays nodata.
    pub fn combine(&self, other: &Raster, f: impl Fn(f64, f64) -> f64) -> RasterResult<Raster> {
        if self.shape() != other.shape() {
            return Err(RasterError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| {
                if self.is_nodata(*a) || other.is_nodata(*b) {
                    f64::NAN
                } else {
                    f(*a, *b)
                }
            })
            .collect();
        Ok(Raster {
            data,
            nodata: None,
            ..self.clone()
        })
    }

    /// Replace nodata by a fill value.
    pub fn fill_nodata(&self, fill_value: f64) -> Raster {
        let data = self
            .data
            .iter()
            .map(|v| if self.is_nodata(*v) { fill_value } else { *v })
            .collect();
        Raster {
            data,
            nodata: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn grid() -> Raster {
        // 4x4 cells of 10 m, values = row * 4 + col
        Raster::new(4, 4, 0.0, 40.0, 10.0, (0..16).map(f64::from).collect()).unwrap()
    }

    #[test]
    fn point_lookup() {
        let r = grid();
        assert_eq!(r.cell_of(Point::new(5.0, 35.0)), Some((0, 0)));
        assert_eq!(r.value_at(Point::new(35.0, 5.0)), Some(15.0));
        assert_eq!(r.value_at(Point::new(-1.0, 5.0)), None);
        assert_eq!(r.value_at(Point::new(5.0, 41.0)), None);
    }

    #[test]
    fn centre_mask_vs_all_touched() {
        let r = grid();
        let p = polygon![(x: 0.0, y: 20.0), (x: 12.0, y: 20.0), (x: 12.0, y: 40.0), (x: 0.0, y: 40.0)];
        assert_eq!(r.mask(&p, false), vec![(0, 0), (1, 0)]);
        assert_eq!(r.mask(&p, true).len(), 4);
    }

    #[test]
    fn combine_requires_equal_shape() {
        let r = grid();
        let other = Raster::filled(2, 2, 0.0, 20.0, 10.0, 1.0).unwrap();
        assert!(matches!(r.combine(&other, |a, b| a - b), Err(RasterError::ShapeMismatch { .. })));
        let diff = r.combine(&r, |a, b| a - b).unwrap();
        assert!(diff.data.iter().all(|v| *v == 0.0));
    }
}
