//! Polygon and line sampling.

use geo::{LineString, MultiPolygon};
use rnl_geometry::{interpolate, line_length};

use crate::error::{RasterError, RasterResult};
use crate::grid::Raster;

/// Percentiles sampled for level-area curves.
pub const DEFAULT_PERCENTILES: [f64; 18] = [
    0.01, 0.1, 1.0, 5.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 95.0, 99.0, 99.9,
    99.99, 100.0,
];

/// Percentile with linear interpolation between closest ranks.
///
/// `sorted` must be ascending and non-empty; `q` is in `[0, 100]`.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelArea {
    pub percentile: f64,
    pub level: f64,
    /// Area of cells at or below `level`.
    pub area: f64,
}

fn masked_values(raster: &Raster, area: &MultiPolygon<f64>, all_touched: bool) -> Vec<f64> {
    let mut cells: Vec<(usize, usize)> = area
        .0
        .iter()
        .flat_map(|p| raster.mask(p, all_touched))
        .collect();
    cells.sort_unstable();
    cells.dedup();
    cells
        .into_iter()
        .filter_map(|(row, col)| raster.valid(row, col))
        .collect()
}

/// Level-area curve of a DEM clipped by a polygon.
pub fn level_area(
    raster: &Raster,
    area: &MultiPolygon<f64>,
    percentiles: &[f64],
) -> RasterResult<Vec<LevelArea>> {
    let mut values = masked_values(raster, area, false);
    if values.is_empty() {
        return Err(RasterError::EmptySample {
            what: "level-area polygon".to_string(),
        });
    }
    values.sort_by(f64::total_cmp);
    let cell_area = raster.cell_area();
    percentiles
        .iter()
        .map(|q| {
            let level = percentile(&values, *q).ok_or_else(|| RasterError::InvalidArg {
                what: format!("percentile {q} outside [0, 100]"),
            })?;
            let count = values.partition_point(|v| *v <= level);
            Ok(LevelArea {
                percentile: *q,
                level,
                area: count as f64 * cell_area,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ZonalOptions {
    pub all_touched: bool,
    /// Value used for nodata cells inside the zone.
    pub fill_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonalStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Statistics of valid cells in a zone; `None` when the zone has no valid cells.
pub fn zonal_stats(
    raster: &Raster,
    area: &MultiPolygon<f64>,
    options: ZonalOptions,
) -> Option<ZonalStats> {
    let source;
    let raster = match options.fill_value {
        Some(fill) => {
            source = raster.fill_nodata(fill);
            &source
        }
        None => raster,
    };
    let values = masked_values(raster, area, options.all_touched);
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(ZonalStats {
        count: values.len(),
        sum,
        mean: sum / values.len() as f64,
        min,
        max,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSample {
    pub distance: f64,
    pub value: Option<f64>,
}

/// Sample a raster every `step` along a line (both ends included).
pub fn sample_line(
    raster: &Raster,
    line: &LineString<f64>,
    step: f64,
) -> RasterResult<Vec<ProfileSample>> {
    if !(step > 0.0) {
        return Err(RasterError::InvalidArg {
            what: format!("sample step must be positive, got {step}"),
        });
    }
    let total = line_length(line);
    let n = (total / step).floor() as usize;
    let mut distances: Vec<f64> = (0..=n).map(|i| i as f64 * step).collect();
    if distances.last().is_some_and(|d| total - d > 1e-9) {
        distances.push(total);
    }
    Ok(distances
        .into_iter()
        .map(|distance| ProfileSample {
            distance,
            value: interpolate(line, distance).and_then(|p| raster.value_at(p)),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::polygon;

    fn ramp() -> Raster {
        // 10x10 cells of 1 m, value = column index
        let data = (0..100).map(|i| f64::from(i % 10)).collect();
        Raster::new(10, 10, 0.0, 10.0, 1.0, data).unwrap().with_nodata(-9999.0)
    }

    fn square(size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: size, y: 0.0), (x: size, y: size), (x: 0.0, y: size),
        ]])
    }

    #[test]
    fn percentile_matches_linear_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 100.0), Some(4.0));
        assert_abs_diff_eq!(percentile(&v, 50.0).unwrap(), 2.5);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn level_area_grows_with_level() {
        let curve = level_area(&ramp(), &square(10.0), &[0.0, 50.0, 100.0]).unwrap();
        assert_eq!(curve[0].level, 0.0);
        assert_eq!(curve[0].area, 10.0);
        assert_eq!(curve[2].level, 9.0);
        assert_eq!(curve[2].area, 100.0);
        assert!(curve.windows(2).all(|w| w[0].area <= w[1].area));
    }

    #[test]
    fn zonal_stats_with_fill() {
        let mut r = ramp();
        r.data[0] = -9999.0;
        let stats = zonal_stats(&r, &square(2.0), ZonalOptions::default()).unwrap();
        // cells rows 8..10, cols 0..2 -> values 0,1,0,1
        assert_eq!(stats.count, 4);
        assert_abs_diff_eq!(stats.mean, 0.5);

        let top_left = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 9.0), (x: 1.0, y: 9.0), (x: 1.0, y: 10.0), (x: 0.0, y: 10.0),
        ]]);
        assert!(zonal_stats(&r, &top_left, ZonalOptions::default()).is_none());
        let filled = zonal_stats(
            &r,
            &top_left,
            ZonalOptions {
                fill_value: Some(37.0),
                ..ZonalOptions::default()
            },
        )
        .unwrap();
        assert_eq!(filled.max, 37.0);
    }

    #[test]
    fn line_profile_includes_end() {
        let line = LineString::from(vec![(0.5, 5.0), (9.5, 5.0)]);
        let samples = sample_line(&ramp(), &line, 4.0).unwrap();
        let distances: Vec<f64> = samples.iter().map(|s| s.distance).collect();
        assert_eq!(distances, vec![0.0, 4.0, 8.0, 9.0]);
        assert_eq!(samples[0].value, Some(0.0));
        assert_eq!(samples[3].value, Some(9.0));
    }
}
