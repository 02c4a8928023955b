//! Generic layers: column schema plus features.

use std::collections::BTreeMap;

use geo::Geometry;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Geometry type name as registered in `gpkg_geometry_columns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Geometry,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Geometry => "GEOMETRY",
            Self::Point => "POINT",
            Self::LineString => "LINESTRING",
            Self::Polygon => "POLYGON",
            Self::MultiPoint => "MULTIPOINT",
            Self::MultiLineString => "MULTILINESTRING",
            Self::MultiPolygon => "MULTIPOLYGON",
            Self::GeometryCollection => "GEOMETRYCOLLECTION",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "POINT" => Self::Point,
            "LINESTRING" => Self::LineString,
            "POLYGON" => Self::Polygon,
            "MULTIPOINT" => Self::MultiPoint,
            "MULTILINESTRING" => Self::MultiLineString,
            "MULTIPOLYGON" => Self::MultiPolygon,
            "GEOMETRYCOLLECTION" => Self::GeometryCollection,
            _ => Self::Geometry,
        }
    }

    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => Self::Point,
            Geometry::Line(_) | Geometry::LineString(_) => Self::LineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => Self::Polygon,
            Geometry::MultiPoint(_) => Self::MultiPoint,
            Geometry::MultiLineString(_) => Self::MultiLineString,
            Geometry::MultiPolygon(_) => Self::MultiPolygon,
            Geometry::GeometryCollection(_) => Self::GeometryCollection,
        }
    }

    /// Whether a geometry of type `found` may be stored in a column of this type.
    pub fn accepts(self, found: GeometryType) -> bool {
        self == Self::Geometry || self == found
    }
}

/// SQLite column affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    Boolean,
    DateTime,
    Blob,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Boolean => "BOOLEAN",
            Self::DateTime => "DATETIME",
            Self::Blob => "BLOB",
        }
    }

    pub fn from_sql_type(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("BOOL") {
            Self::Boolean
        } else if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else if upper.contains("DATE") || upper.contains("TIME") {
            Self::DateTime
        } else if upper.contains("BLOB") {
            Self::Blob
        } else {
            Self::Text
        }
    }

    /// Kind that can store `value`, used when a schema is inferred.
    pub fn infer(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Integer(_) => Some(Self::Integer),
            Value::Real(_) => Some(Self::Real),
            Value::Text(_) => Some(Self::Text),
            Value::Blob(_) => Some(Self::Blob),
        }
    }

    /// Common kind of two observations; integers widen to reals, anything
    /// else mixed becomes text.
    pub fn widen(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Integer, Self::Real) | (Self::Real, Self::Integer) => Self::Real,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryColumn {
    pub name: String,
    pub geometry_type: GeometryType,
    pub srs_id: i32,
}

/// One row of a layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub fid: Option<i64>,
    pub geometry: Option<Geometry<f64>>,
    pub attributes: BTreeMap<String, Value>,
}

impl Feature {
    pub fn new(fid: Option<i64>, geometry: Option<Geometry<f64>>) -> Self {
        Self {
            fid,
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    /// Attribute value; missing columns read as `Null`.
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.attributes.get(name).unwrap_or(&NULL)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).as_f64()
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).as_i64()
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).as_str()
    }
}

/// A feature table (with geometry column) or attribute table (without).
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub columns: Vec<Column>,
    pub geometry_column: Option<GeometryColumn>,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            geometry_column: None,
            features: Vec::new(),
        }
    }

    pub fn with_geometry(mut self, geometry_type: GeometryType, srs_id: i32) -> Self {
        self.geometry_column = Some(GeometryColumn {
            name: "geom".to_string(),
            geometry_type,
            srs_id,
        });
        self
    }

    pub fn with_column(mut self, name: &str, kind: ColumnKind) -> Self {
        self.add_column(name, kind);
        self
    }

    /// Add a column unless one with this name exists.
    pub fn add_column(&mut self, name: &str, kind: ColumnKind) {
        if !self.has_column(name) {
            self.columns.push(Column::new(name, kind));
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// Add columns for attributes present in features but not declared,
    /// inferring their kinds from the values.
    pub fn infer_columns(&mut self) {
        let mut inferred: Vec<(String, Option<ColumnKind>)> = Vec::new();
        for feature in &self.features {
            for (name, value) in &feature.attributes {
                if self.has_column(name) {
                    continue;
                }
                let kind = ColumnKind::infer(value);
                match inferred.iter_mut().find(|(n, _)| n == name) {
                    Some((_, existing)) => {
                        *existing = match (*existing, kind) {
                            (Some(a), Some(b)) => Some(a.widen(b)),
                            (a, b) => a.or(b),
                        };
                    }
                    None => inferred.push((name.clone(), kind)),
                }
            }
        }
        for (name, kind) in inferred {
            self.columns
                .push(Column::new(name, kind.unwrap_or(ColumnKind::Text)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_widens_mixed_numbers() {
        let mut layer = Layer::new("t").with_column("a", ColumnKind::Text);
        layer.push(Feature::default().with("a", "x").with("b", 1i64).with("c", Value::Null));
        layer.push(Feature::default().with("b", 2.5).with("d", "t"));
        layer.infer_columns();
        assert_eq!(layer.column("b").map(|c| c.kind), Some(ColumnKind::Real));
        assert_eq!(layer.column("c").map(|c| c.kind), Some(ColumnKind::Text));
        assert_eq!(layer.column("d").map(|c| c.kind), Some(ColumnKind::Text));
        assert_eq!(layer.columns.len(), 4);
    }

    #[test]
    fn missing_attribute_reads_null() {
        let f = Feature::default().with("x", 1.0);
        assert!(f.get("y").is_null());
        assert_eq!(f.get_f64("x"), Some(1.0));
    }

    #[test]
    fn geometry_type_names() {
        assert_eq!(GeometryType::parse("multipolygon"), GeometryType::MultiPolygon);
        assert!(GeometryType::Geometry.accepts(GeometryType::Point));
        assert!(!GeometryType::Point.accepts(GeometryType::Polygon));
    }
}
