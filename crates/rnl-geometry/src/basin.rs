//! Basin area geometry.

use geo::{
    Area, BooleanOps, BoundingRect, Centroid, Contains, Distance, Euclidean, Geometry,
    InteriorPoint, Intersects, MultiPolygon, Point, Polygon, Rect,
};

use crate::buffer::buffer_polygon;
use crate::error::{GeometryError, GeometryResult};

/// Polygon or MultiPolygon describing the area of a Basin.
#[derive(Debug, Clone, PartialEq)]
pub enum BasinGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl BasinGeometry {
    pub fn from_geometry(geometry: Geometry<f64>) -> GeometryResult<Self> {
        match geometry {
            Geometry::Polygon(p) => Ok(Self::Polygon(p)),
            Geometry::MultiPolygon(mp) => Ok(Self::MultiPolygon(mp)),
            other => Err(GeometryError::UnsupportedType {
                found: crate::convert::geometry_type_name(&other).to_string(),
                expected: "Polygon | MultiPolygon",
            }),
        }
    }

    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            Self::Polygon(p) => Geometry::Polygon(p.clone()),
            Self::MultiPolygon(mp) => Geometry::MultiPolygon(mp.clone()),
        }
    }

    /// Constituent polygons (one for a Polygon).
    pub fn polygons(&self) -> Vec<&Polygon<f64>> {
        match self {
            Self::Polygon(p) => vec![p],
            Self::MultiPolygon(mp) => mp.0.iter().collect(),
        }
    }

    pub fn to_multi_polygon(&self) -> MultiPolygon<f64> {
        match self {
            Self::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
            Self::MultiPolygon(mp) => mp.clone(),
        }
    }

    pub fn into_multi_polygon(self) -> MultiPolygon<f64> {
        match self {
            Self::Polygon(p) => MultiPolygon::new(vec![p]),
            Self::MultiPolygon(mp) => mp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons().iter().all(|p| p.exterior().0.is_empty())
    }

    pub fn area(&self) -> f64 {
        match self {
            Self::Polygon(p) => p.unsigned_area(),
            Self::MultiPolygon(mp) => mp.unsigned_area(),
        }
    }

    /// Union of both areas, always a MultiPolygon.
    pub fn union(&self, other: &BasinGeometry) -> BasinGeometry {
        Self::MultiPolygon(self.to_multi_polygon().union(&other.to_multi_polygon()))
    }

    pub fn intersection(&self, other: &BasinGeometry) -> BasinGeometry {
        Self::MultiPolygon(
            self.to_multi_polygon()
                .intersection(&other.to_multi_polygon()),
        )
    }

    /// Area of the overlap with a polygon.
    pub fn intersection_area(&self, polygon: &Polygon<f64>) -> f64 {
        self.to_multi_polygon()
            .intersection(&MultiPolygon::new(vec![polygon.clone()]))
            .unsigned_area()
    }

    pub fn buffer(&self, distance: f64) -> GeometryResult<BasinGeometry> {
        let mut result = MultiPolygon::new(vec![]);
        for polygon in self.polygons() {
            result = result.union(&buffer_polygon(polygon, distance)?);
        }
        Ok(Self::MultiPolygon(result))
    }

    pub fn intersects<G>(&self, other: &G) -> bool
    where
        Polygon<f64>: Intersects<G>,
        MultiPolygon<f64>: Intersects<G>,
    {
        match self {
            Self::Polygon(p) => p.intersects(other),
            Self::MultiPolygon(mp) => mp.intersects(other),
        }
    }

    pub fn contains(&self, point: &Point<f64>) -> bool {
        match self {
            Self::Polygon(p) => p.contains(point),
            Self::MultiPolygon(mp) => mp.contains(point),
        }
    }

    pub fn centroid(&self) -> Option<Point<f64>> {
        match self {
            Self::Polygon(p) => p.centroid(),
            Self::MultiPolygon(mp) => mp.centroid(),
        }
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Self::Polygon(p) => p.bounding_rect(),
            Self::MultiPolygon(mp) => mp.bounding_rect(),
        }
    }

    /// Distance from a point to the area (0 inside).
    pub fn distance_to(&self, point: &Point<f64>) -> f64 {
        if self.contains(point) {
            return 0.0;
        }
        self.polygons()
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
            .map(|ring| Euclidean::distance(point, ring))
            .fold(f64::INFINITY, f64::min)
    }

    /// Split every MultiPolygon into its polygons.
    pub fn explode(&self) -> Vec<Polygon<f64>> {
        self.polygons().into_iter().cloned().collect()
    }
}

impl From<Polygon<f64>> for BasinGeometry {
    fn from(p: Polygon<f64>) -> Self {
        Self::Polygon(p)
    }
}

impl From<MultiPolygon<f64>> for BasinGeometry {
    fn from(mp: MultiPolygon<f64>) -> Self {
        Self::MultiPolygon(mp)
    }
}

/// Sort polygons on area, ascending (small to large).
pub fn sort_basins(mut polygons: Vec<Polygon<f64>>) -> Vec<Polygon<f64>> {
    polygons.sort_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()));
    polygons
}

/// Representative point of a basin: the centroid when it lies within the
/// area, otherwise an interior point of the largest polygon.
pub fn basin_to_point(basin: &BasinGeometry) -> GeometryResult<Point<f64>> {
    if let Some(centroid) = basin.centroid()
        && basin.contains(&centroid)
    {
        return Ok(centroid);
    }
    let largest = sort_basins(basin.explode())
        .pop()
        .ok_or(GeometryError::Empty { what: "basin" })?;
    largest
        .interior_point()
        .ok_or(GeometryError::Empty { what: "basin" })
}

pub fn basins_to_points(basins: &[BasinGeometry]) -> GeometryResult<Vec<Point<f64>>> {
    basins.iter().map(basin_to_point).collect()
}
