//! Cutting basin polygons with cut-lines.

use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{
    Contains, Coord, Distance, Euclidean, InteriorPoint, Intersects, LineString, MultiPolygon,
    Polygon,
};

use crate::basin::sort_basins;
use crate::error::{GeometryError, GeometryResult};
use crate::line::{interpolate, line_length};

const EPS: f64 = 1e-9;

/// A crossing of the cut-line with the polygon exterior.
#[derive(Debug, Clone, Copy)]
struct Crossing {
    /// Position along the ring, as `segment index + fraction`.
    ring_pos: f64,
    /// Position along the cut-line, as `segment index + fraction`.
    line_pos: f64,
    coord: Coord<f64>,
}

fn fraction(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> f64 {
    let d = b - a;
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        0.0
    } else {
        ((p.x - a.x) * d.x + (p.y - a.y) * d.y) / len2
    }
}

fn crossings(ring: &LineString<f64>, line: &LineString<f64>) -> Vec<Crossing> {
    let mut found: Vec<Crossing> = Vec::new();
    for (i, ring_segment) in ring.lines().enumerate() {
        for (j, cut_segment) in line.lines().enumerate() {
            let Some(LineIntersection::SinglePoint { intersection, .. }) =
                line_intersection(ring_segment, cut_segment)
            else {
                continue;
            };
            let crossing = Crossing {
                ring_pos: i as f64 + fraction(ring_segment.start, ring_segment.end, intersection),
                line_pos: j as f64 + fraction(cut_segment.start, cut_segment.end, intersection),
                coord: intersection,
            };
            let duplicate = found.iter().any(|c| {
                (c.coord.x - crossing.coord.x).abs() < EPS && (c.coord.y - crossing.coord.y).abs() < EPS
            });
            if !duplicate {
                found.push(crossing);
            }
        }
    }
    found.sort_by(|a, b| a.line_pos.total_cmp(&b.line_pos));
    found
}

/// Ring vertices strictly between two ring positions walking forward (wrapping).
fn ring_arc(ring: &[Coord<f64>], from: f64, to: f64) -> Vec<Coord<f64>> {
    // ring is closed: last == first; vertex k sits at position k
    let n = ring.len() - 1;
    let mut arc = Vec::new();
    let mut k = (from + EPS).floor() as usize + 1;
    let mut pos = k as f64;
    let end = if to > from { to } else { to + n as f64 };
    while pos < end - EPS {
        arc.push(ring[k % n]);
        k += 1;
        pos = k as f64;
    }
    arc
}

fn chord(line: &LineString<f64>, from: &Crossing, to: &Crossing) -> Vec<Coord<f64>> {
    let mut coords = vec![from.coord];
    let first = (from.line_pos + EPS).floor() as usize + 1;
    let mut k = first;
    while (k as f64) < to.line_pos - EPS {
        coords.push(line.0[k]);
        k += 1;
    }
    coords.push(to.coord);
    coords
}

fn close(mut coords: Vec<Coord<f64>>) -> LineString<f64> {
    if let Some(first) = coords.first().copied()
        && coords.last() != Some(&first)
    {
        coords.push(first);
    }
    LineString::from(coords)
}

/// Split a polygon with a line into two polygons, smallest first.
///
/// The cut-line must cross the exterior exactly twice; its ends should lie
/// outside the polygon.
pub fn split_basin(
    polygon: &Polygon<f64>,
    line: &LineString<f64>,
) -> GeometryResult<MultiPolygon<f64>> {
    if line.0.len() < 2 {
        return Err(GeometryError::Empty { what: "cut-line" });
    }
    let ring = &polygon.exterior().0;
    if ring.len() < 4 {
        return Err(GeometryError::Empty { what: "polygon" });
    }
    let found = crossings(polygon.exterior(), line);
    if found.len() != 2 {
        return Err(GeometryError::CutLineCrossings { found: found.len() });
    }
    let (p, q) = (found[0], found[1]);
    let cut = chord(line, &p, &q);

    // piece one: ring from p to q, back along the cut from q to p
    let mut one = vec![p.coord];
    one.extend(ring_arc(ring, p.ring_pos, q.ring_pos));
    one.push(q.coord);
    one.extend(cut.iter().rev().skip(1));

    // piece two: ring from q to p, then along the cut from p to q
    let mut two = vec![q.coord];
    two.extend(ring_arc(ring, q.ring_pos, p.ring_pos));
    two.push(p.coord);
    two.extend(cut.iter().skip(1));

    let mut pieces: Vec<Polygon<f64>> = [one, two]
        .into_iter()
        .map(|coords| Polygon::new(close(coords), vec![]))
        .collect();

    // holes go to the piece that contains them
    for interior in polygon.interiors() {
        if let Some(first) = interior.0.first()
            && let Some(piece) = pieces
                .iter_mut()
                .find(|piece| piece.contains(&geo::Point::from(*first)))
        {
            piece.interiors_push(interior.clone());
        }
    }

    let kept: Vec<Polygon<f64>> = pieces
        .into_iter()
        .filter(|piece| {
            piece
                .interior_point()
                .is_some_and(|point| polygon.contains(&point))
        })
        .collect();
    if kept.len() != 2 {
        return Err(GeometryError::SplitFailed { pieces: kept.len() });
    }
    Ok(MultiPolygon::new(sort_basins(kept)))
}

/// Split the polygon of a MultiPolygon that the cut-line runs through.
///
/// Remaining polygons are added to the closest half. Returns the (smallest
/// half, largest half) of the cut polygon with their companions.
pub fn split_basin_multi_polygon(
    basin: &MultiPolygon<f64>,
    line: &LineString<f64>,
) -> GeometryResult<(MultiPolygon<f64>, MultiPolygon<f64>)> {
    let polygons = &basin.0;
    if polygons.is_empty() {
        return Err(GeometryError::Empty { what: "multipolygon" });
    }
    let centre = interpolate(line, line_length(line) / 2.0)
        .ok_or(GeometryError::Empty { what: "cut-line" })?;
    let cut_idx = polygons
        .iter()
        .position(|p| p.contains(&centre))
        .or_else(|| polygons.iter().position(|p| p.intersects(line)))
        .ok_or(GeometryError::NoIntersection)?;

    let halves = split_basin(&polygons[cut_idx], line)?;
    let (first, second) = (halves.0[0].clone(), halves.0[1].clone());
    let mut right = vec![first.clone()];
    let mut left = vec![second.clone()];
    for (idx, polygon) in polygons.iter().enumerate() {
        if idx == cut_idx {
            continue;
        }
        if Euclidean::distance(polygon, &first) < Euclidean::distance(polygon, &second) {
            right.push(polygon.clone());
        } else {
            left.push(polygon.clone());
        }
    }
    Ok((MultiPolygon::new(right), MultiPolygon::new(left)))
}

/// Split every basin crossed by a cut-line.
///
/// Each basin carries attributes `T` which are copied onto both halves.
/// Lines that cross no basin exterior twice are reported as `NoIntersection`.
pub fn split_basins<T: Clone>(
    basins: Vec<(T, Polygon<f64>)>,
    lines: &[LineString<f64>],
) -> GeometryResult<Vec<(T, Polygon<f64>)>> {
    let mut basins = basins;
    for line in lines {
        let mut next = Vec::with_capacity(basins.len() + 1);
        let mut split_any = false;
        for (attrs, polygon) in basins {
            if polygon.intersects(line) && crossings(polygon.exterior(), line).len() >= 2 {
                for piece in split_basin(&polygon, line)? {
                    next.push((attrs.clone(), piece));
                }
                split_any = true;
            } else {
                next.push((attrs, polygon));
            }
        }
        if !split_any {
            return Err(GeometryError::NoIntersection);
        }
        basins = next;
    }
    Ok(basins)
}
