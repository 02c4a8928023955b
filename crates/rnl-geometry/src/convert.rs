//! Conversions between WKT text and geo types.

use std::str::FromStr;

use geo::{Distance, Euclidean, Geometry, LineString, Point};
use wkt::{ToWkt, Wkt};

use crate::error::{GeometryError, GeometryResult};

/// Parse WKT into a 2D geometry. Z and M ordinates are dropped.
pub fn from_wkt(text: &str) -> GeometryResult<Geometry<f64>> {
    let parsed = Wkt::<f64>::from_str(text).map_err(|e| GeometryError::InvalidWkt {
        message: e.to_string(),
    })?;
    Geometry::try_from(parsed).map_err(|e| GeometryError::InvalidWkt {
        message: e.to_string(),
    })
}

/// Serialize a geometry to WKT.
pub fn to_wkt(geometry: &Geometry<f64>) -> String {
    geometry.wkt_string()
}

/// Drop the z-coordinate of a WKT geometry (e.g. `POINT Z (1 2 3)`).
///
/// Only Point, LineString, Polygon and MultiPolygon are supported.
pub fn drop_z(text: &str) -> GeometryResult<Geometry<f64>> {
    let geometry = from_wkt(text)?;
    match geometry {
        Geometry::Point(_)
        | Geometry::LineString(_)
        | Geometry::Polygon(_)
        | Geometry::MultiPolygon(_) => Ok(geometry),
        other => Err(GeometryError::UnsupportedType {
            found: geometry_type_name(&other).to_string(),
            expected: "Point | LineString | Polygon | MultiPolygon",
        }),
    }
}

/// Straight line between two points.
pub fn edge(from: Point<f64>, to: Point<f64>) -> LineString<f64> {
    LineString::from(vec![from.0, to.0])
}

/// Return the closest target within `tolerance`, else `point` itself.
pub fn snap_point_to_target(point: Point<f64>, targets: &[Point<f64>], tolerance: f64) -> Point<f64> {
    targets
        .iter()
        .map(|t| (Euclidean::distance(&point, t), *t))
        .filter(|(d, _)| *d <= tolerance)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map_or(point, |(_, t)| t)
}

pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_is_dropped() {
        let g = drop_z("POINT Z (1 2 3)").unwrap();
        assert_eq!(g, Geometry::Point(Point::new(1.0, 2.0)));
        let g = drop_z("LINESTRING Z (0 0 1, 1 1 2)").unwrap();
        assert_eq!(
            g,
            Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]))
        );
    }

    #[test]
    fn unsupported_type_is_reported() {
        let err = drop_z("MULTIPOINT ((0 0), (1 1))").unwrap_err();
        assert!(matches!(err, GeometryError::UnsupportedType { .. }));
    }

    #[test]
    fn wkt_round_trip() {
        let g = from_wkt("POLYGON ((0 0, 1 0, 1 1, 0 0))").unwrap();
        assert_eq!(from_wkt(&to_wkt(&g)).unwrap(), g);
        assert!(from_wkt("POLYGON ((0 0,").is_err());
    }

    #[test]
    fn snapping_picks_closest() {
        let targets = [Point::new(0.0, 1.0), Point::new(0.0, 0.5)];
        let p = snap_point_to_target(Point::new(0.0, 0.0), &targets, 1.0);
        assert_eq!(p, Point::new(0.0, 0.5));
        let p = snap_point_to_target(Point::new(5.0, 5.0), &targets, 1.0);
        assert_eq!(p, Point::new(5.0, 5.0));
    }
}
