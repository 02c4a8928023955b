//! Width(level) tables of cross-sections and their Manning equivalent.

use crate::error::{ParamError, ParamResult};
use crate::manning::ManningProfile;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelWidth {
    pub level: f64,
    pub width: f64,
}

impl LevelWidth {
    pub fn new(level: f64, width: f64) -> Self {
        Self { level, width }
    }
}

fn sorted(table: &[LevelWidth]) -> Vec<LevelWidth> {
    let mut table = table.to_vec();
    table.sort_by(|a, b| a.level.total_cmp(&b.level));
    table
}

/// Linear interpolation inside the table; `None` outside its level range.
fn interpolate(table: &[LevelWidth], level: f64) -> Option<f64> {
    let first = table.first()?;
    let last = table.last()?;
    if level < first.level || level > last.level {
        return None;
    }
    table.windows(2).find_map(|w| {
        let (a, b) = (w[0], w[1]);
        if level < a.level || level > b.level {
            None
        } else if b.level == a.level {
            Some(a.width)
        } else {
            Some(a.width + (b.width - a.width) * (level - a.level) / (b.level - a.level))
        }
    })
    .or_else(|| (table.len() == 1).then_some(first.width))
}

/// Combine two width(level) tables into one over all their levels.
///
/// Where both tables cover a level the widths are averaged; where only one
/// does, its width is used.
pub fn average_width(left: &[LevelWidth], right: &[LevelWidth]) -> Vec<LevelWidth> {
    let (left, right) = (sorted(left), sorted(right));
    let mut levels: Vec<f64> = left.iter().chain(&right).map(|r| r.level).collect();
    levels.sort_by(f64::total_cmp);
    levels.dedup();
    levels
        .into_iter()
        .filter_map(|level| {
            let width = match (interpolate(&left, level), interpolate(&right, level)) {
                (Some(l), Some(r)) => (l + r) / 2.0,
                (Some(w), None) | (None, Some(w)) => w,
                (None, None) => return None,
            };
            Some(LevelWidth::new(level, width))
        })
        .collect()
}

/// Wetted area below each level of the table (trapezoid rule), in level order.
pub fn cumulative_area(table: &[LevelWidth]) -> Vec<f64> {
    let table = sorted(table);
    let mut total = 0.0;
    let mut areas = Vec::with_capacity(table.len());
    for (i, row) in table.iter().enumerate() {
        if i > 0 {
            let prev = table[i - 1];
            total += (prev.width + row.width) / 2.0 * (row.level - prev.level);
        }
        areas.push(total);
    }
    areas
}

/// Trapezoid with the same depth, top width and area as the table.
///
/// Bottom width is `max(2A/dz - top width, 0)`; slope is the horizontal run
/// of one bank over the depth.
pub fn manning_profile(table: &[LevelWidth]) -> ParamResult<ManningProfile> {
    let (min, max) = table
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| (lo.min(r.level), hi.max(r.level)));
    let dz = max - min;
    if !dz.is_finite() || dz <= 0.0 {
        return Err(ParamError::invalid("profile needs at least two distinct levels"));
    }
    let top_width = table.iter().map(|r| r.width).fold(f64::NEG_INFINITY, f64::max);
    let area = cumulative_area(table).last().copied().unwrap_or(0.0);
    let profile_width = (2.0 * area / dz - top_width).max(0.0);
    Ok(ManningProfile {
        profile_width,
        profile_slope: (top_width - profile_width) / 2.0 / dz,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn trapezoid() -> Vec<LevelWidth> {
        vec![LevelWidth::new(-2.0, 4.0), LevelWidth::new(0.0, 12.0)]
    }

    #[test]
    fn area_of_trapezoid() {
        assert_eq!(cumulative_area(&trapezoid()), vec![0.0, 16.0]);
    }

    #[test]
    fn manning_profile_recovers_trapezoid() {
        let profile = manning_profile(&trapezoid()).unwrap();
        assert_relative_eq!(profile.profile_width, 4.0);
        assert_relative_eq!(profile.profile_slope, 2.0);
    }

    #[test]
    fn flat_profile_is_rejected() {
        assert!(manning_profile(&[LevelWidth::new(0.0, 1.0)]).is_err());
    }

    #[test]
    fn average_of_overlapping_tables() {
        let left = trapezoid();
        let right = vec![LevelWidth::new(-1.0, 6.0), LevelWidth::new(1.0, 10.0)];
        let avg = average_width(&left, &right);
        let levels: Vec<f64> = avg.iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![-2.0, -1.0, 0.0, 1.0]);
        // only left covers -2, only right covers 1
        assert_eq!(avg[0].width, 4.0);
        assert_eq!(avg[3].width, 10.0);
        // left(-1) = 8, right(-1) = 6
        assert_relative_eq!(avg[1].width, 7.0);
        // left(0) = 12, right(0) = 8
        assert_relative_eq!(avg[2].width, 10.0);
    }
}
