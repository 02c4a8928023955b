//! Round-capped buffers for points, lines and polygons.
//!
//! Circles are approximated with `4 * QUAD_SEGMENTS` vertices.

use std::f64::consts::PI;

use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};

use crate::error::{GeometryError, GeometryResult};

pub const QUAD_SEGMENTS: usize = 8;

fn circle(center: Coord<f64>, radius: f64) -> Polygon<f64> {
    let n = 4 * QUAD_SEGMENTS;
    let ring: Vec<Coord<f64>> = (0..=n)
        .map(|i| {
            let angle = 2.0 * PI * (i % n) as f64 / n as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::from(ring), vec![])
}

fn capsule(a: Coord<f64>, b: Coord<f64>, radius: f64) -> Polygon<f64> {
    let d = b - a;
    let len = d.x.hypot(d.y);
    if len == 0.0 {
        return circle(a, radius);
    }
    let base = d.y.atan2(d.x);
    let half = 2 * QUAD_SEGMENTS;
    let mut ring = Vec::with_capacity(2 * half + 3);
    // cap around b from +90 to -90 degrees, then around a from -90 to +90 (mirrored)
    for i in 0..=half {
        let angle = base + PI / 2.0 - PI * i as f64 / half as f64;
        ring.push(Coord {
            x: b.x + radius * angle.cos(),
            y: b.y + radius * angle.sin(),
        });
    }
    for i in 0..=half {
        let angle = base - PI / 2.0 - PI * i as f64 / half as f64;
        ring.push(Coord {
            x: a.x + radius * angle.cos(),
            y: a.y + radius * angle.sin(),
        });
    }
    ring.push(ring[0]);
    Polygon::new(LineString::from(ring), vec![])
}

fn check_distance(distance: f64) -> GeometryResult<()> {
    if distance > 0.0 && distance.is_finite() {
        Ok(())
    } else {
        Err(GeometryError::InvalidArg {
            what: format!("buffer distance must be positive, got {distance}"),
        })
    }
}

/// Disc of radius `distance` around a point.
pub fn buffer_point(point: geo::Point<f64>, distance: f64) -> GeometryResult<Polygon<f64>> {
    check_distance(distance)?;
    Ok(circle(point.0, distance))
}

/// Area within `distance` of a line.
pub fn buffer_line(line: &LineString<f64>, distance: f64) -> GeometryResult<MultiPolygon<f64>> {
    check_distance(distance)?;
    let mut coords = line.0.iter();
    let Some(first) = coords.next() else {
        return Err(GeometryError::Empty { what: "line" });
    };
    let mut result = MultiPolygon::new(vec![circle(*first, distance)]);
    let mut previous = *first;
    for coord in coords {
        let piece = MultiPolygon::new(vec![capsule(previous, *coord, distance)]);
        result = result.union(&piece);
        previous = *coord;
    }
    Ok(result)
}

/// Area within `distance` of a polygon (outward buffer).
pub fn buffer_polygon(polygon: &Polygon<f64>, distance: f64) -> GeometryResult<MultiPolygon<f64>> {
    check_distance(distance)?;
    let mut result = MultiPolygon::new(vec![Polygon::new(polygon.exterior().clone(), vec![])]);
    result = result.union(&buffer_line(polygon.exterior(), distance)?);
    let mut holes = MultiPolygon::new(vec![]);
    for interior in polygon.interiors() {
        let hole = MultiPolygon::new(vec![Polygon::new(interior.clone(), vec![])]);
        holes = holes.union(&hole.difference(&buffer_line(interior, distance)?));
    }
    Ok(result.difference(&holes))
}
