//! LineString utilities: length, projection, interpolation and cutting.

use geo::{Coord, Euclidean, Length, LineString, Point};

use crate::error::{GeometryError, GeometryResult};

/// Euclidean length of a line.
pub fn line_length(line: &LineString<f64>) -> f64 {
    line.length::<Euclidean>()
}

/// First and last vertex of a line.
pub fn line_ends(line: &LineString<f64>) -> Option<(Point<f64>, Point<f64>)> {
    let first = line.0.first()?;
    let last = line.0.last()?;
    Some((Point::from(*first), Point::from(*last)))
}

/// Projection of `point` onto `line`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Distance along the line from its first vertex.
    pub distance_along: f64,
    /// Perpendicular (or end-point) distance from the point to the line.
    pub offset: f64,
    /// The projected point on the line.
    pub point: Point<f64>,
}

/// Project `point` on `line`, returning the closest location on the line.
pub fn project(line: &LineString<f64>, point: Point<f64>) -> Option<Projection> {
    let mut best: Option<Projection> = None;
    let mut walked = 0.0;
    for segment in line.lines() {
        let (a, b) = (segment.start, segment.end);
        let d = b - a;
        let seg_len = d.x.hypot(d.y);
        let t = if seg_len > 0.0 {
            (((point.x() - a.x) * d.x + (point.y() - a.y) * d.y) / (seg_len * seg_len)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let on = Coord {
            x: a.x + t * d.x,
            y: a.y + t * d.y,
        };
        let offset = (point.x() - on.x).hypot(point.y() - on.y);
        if best.is_none_or(|b| offset < b.offset) {
            best = Some(Projection {
                distance_along: walked + t * seg_len,
                offset,
                point: Point::from(on),
            });
        }
        walked += seg_len;
    }
    if best.is_none()
        && let Some(first) = line.0.first()
    {
        let offset = (point.x() - first.x).hypot(point.y() - first.y);
        best = Some(Projection {
            distance_along: 0.0,
            offset,
            point: Point::from(*first),
        });
    }
    best
}

/// Point at `distance` along `line`; clamped to the line ends.
pub fn interpolate(line: &LineString<f64>, distance: f64) -> Option<Point<f64>> {
    let first = *line.0.first()?;
    if distance <= 0.0 {
        return Some(Point::from(first));
    }
    let mut walked = 0.0;
    for segment in line.lines() {
        let d = segment.end - segment.start;
        let seg_len = d.x.hypot(d.y);
        if walked + seg_len >= distance && seg_len > 0.0 {
            let t = (distance - walked) / seg_len;
            return Some(Point::new(
                segment.start.x + t * d.x,
                segment.start.y + t * d.y,
            ));
        }
        walked += seg_len;
    }
    line.0.last().map(|c| Point::from(*c))
}

/// Part of `line` between two distances along it.
pub fn substring(line: &LineString<f64>, start: f64, end: f64) -> GeometryResult<LineString<f64>> {
    if line.0.len() < 2 {
        return Err(GeometryError::Empty { what: "line" });
    }
    let total = line_length(line);
    let (start, end) = (start.clamp(0.0, total), end.clamp(0.0, total));
    if end < start {
        return Err(GeometryError::InvalidArg {
            what: format!("substring end {end} before start {start}"),
        });
    }
    let mut coords: Vec<Coord<f64>> = Vec::new();
    if let Some(p) = interpolate(line, start) {
        coords.push(p.0);
    }
    let mut walked = 0.0;
    for segment in line.lines() {
        let d = segment.end - segment.start;
        walked += d.x.hypot(d.y);
        if walked > start && walked < end {
            coords.push(segment.end);
        }
    }
    if let Some(p) = interpolate(line, end) {
        coords.push(p.0);
    }
    coords.dedup();
    if coords.len() == 1 {
        coords.push(coords[0]);
    }
    Ok(LineString::from(coords))
}

/// Cut `line` into two lines at `distance` along it.
pub fn split_line_at_distance(
    line: &LineString<f64>,
    distance: f64,
) -> GeometryResult<(LineString<f64>, LineString<f64>)> {
    let total = line_length(line);
    if distance <= 0.0 || distance >= total {
        return Err(GeometryError::InvalidArg {
            what: format!("split distance {distance} not inside line of length {total}"),
        });
    }
    Ok((substring(line, 0.0, distance)?, substring(line, distance, total)?))
}

/// Subdivide `line` into the smallest number of equal-length parts not longer
/// than `max_length`.
pub fn subdivide_line(
    line: &LineString<f64>,
    max_length: f64,
) -> GeometryResult<Vec<LineString<f64>>> {
    if max_length <= 0.0 {
        return Err(GeometryError::InvalidArg {
            what: format!("max_length must be positive, got {max_length}"),
        });
    }
    let total = line_length(line);
    let parts = (total / max_length).ceil().max(1.0) as usize;
    let step = total / parts as f64;
    (0..parts)
        .map(|i| {
            let end = if i + 1 == parts { total } else { (i + 1) as f64 * step };
            substring(line, i as f64 * step, end)
        })
        .collect()
}

/// Line with vertex order reversed.
pub fn reverse_line(line: &LineString<f64>) -> LineString<f64> {
    let mut coords = line.0.clone();
    coords.reverse();
    LineString::from(coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn l_shape() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)])
    }

    #[test]
    fn projection_on_second_segment() {
        let p = project(&l_shape(), Point::new(12.0, 4.0)).unwrap();
        assert_abs_diff_eq!(p.distance_along, 14.0);
        assert_abs_diff_eq!(p.offset, 2.0);
        assert_eq!(p.point, Point::new(10.0, 4.0));
    }

    #[test]
    fn interpolate_clamps() {
        let line = l_shape();
        assert_eq!(interpolate(&line, -1.0), Some(Point::new(0.0, 0.0)));
        assert_eq!(interpolate(&line, 15.0), Some(Point::new(10.0, 5.0)));
        assert_eq!(interpolate(&line, 99.0), Some(Point::new(10.0, 10.0)));
    }

    #[test]
    fn split_keeps_corner_vertex() {
        let (a, b) = split_line_at_distance(&l_shape(), 12.0).unwrap();
        assert_eq!(
            a,
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 2.0)])
        );
        assert_eq!(b, LineString::from(vec![(10.0, 2.0), (10.0, 10.0)]));
        assert!(split_line_at_distance(&l_shape(), 0.0).is_err());
    }

    #[test]
    fn subdivision_has_equal_parts() {
        let parts = subdivide_line(&l_shape(), 6.0).unwrap();
        assert_eq!(parts.len(), 4);
        for part in &parts {
            assert_abs_diff_eq!(line_length(part), 5.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn reverse_is_self_inverse() {
        let line = l_shape();
        assert_eq!(reverse_line(&reverse_line(&line)), line);
    }
}
