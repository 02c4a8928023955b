//! Validation schemas derived from the HyDAMO JSON definition.

use chrono::{NaiveDate, NaiveDateTime};
use rnl_gpkg::{ColumnKind, GeometryType, Value};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::{HydamoError, HydamoResult};

pub const GEOMETRY: &str = "geometry";

/// Column data type of a HyDAMO attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    DateTime,
}

impl FieldType {
    fn from_json(definition: &Map<String, Json>) -> Self {
        let named = |key: &str| definition.get(key).and_then(Json::as_str);
        match named("format").or(named("type")) {
            Some("integer") => FieldType::Integer,
            Some("number") => FieldType::Number,
            Some("date-time") => FieldType::DateTime,
            _ => FieldType::String,
        }
    }

    pub fn column_kind(self) -> ColumnKind {
        match self {
            FieldType::String => ColumnKind::Text,
            FieldType::Integer => ColumnKind::Integer,
            FieldType::Number => ColumnKind::Real,
            FieldType::DateTime => ColumnKind::DateTime,
        }
    }

    /// `value` converted to this type; `None` if it doesn't fit. Nulls pass.
    pub fn coerce(self, value: &Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }
        match self {
            FieldType::String => match value {
                Value::Text(_) => Some(value.clone()),
                Value::Integer(i) => Some(Value::Text(i.to_string())),
                Value::Real(f) => Some(Value::Text(f.to_string())),
                _ => None,
            },
            FieldType::Integer => value.as_i64().map(Value::Integer),
            FieldType::Number => value.as_f64().map(Value::Real),
            FieldType::DateTime => value.as_str().and_then(parse_datetime).map(|dt| {
                Value::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            }),
        }
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub dtype: FieldType,
    pub required: bool,
    pub unique: bool,
    /// Allowed values, if restricted.
    pub domain: Option<Vec<Value>>,
}

/// Columns and geometry types of one layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerSchema {
    pub fields: Vec<Field>,
    /// Accepted geometry types; empty for attribute tables.
    pub geometry: Vec<GeometryType>,
}

impl LayerSchema {
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn has_geometry(&self) -> bool {
        !self.geometry.is_empty()
    }

    /// Required attribute columns, plus `geometry` for feature layers.
    pub fn required_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.id.clone())
            .collect();
        if self.has_geometry() {
            columns.push(GEOMETRY.to_string());
        }
        columns
    }

    /// Geometry column type of the GeoPackage layer.
    pub fn column_geometry_type(&self) -> Option<GeometryType> {
        match self.geometry.as_slice() {
            [] => None,
            [single] => Some(*single),
            several => Some(
                several
                    .iter()
                    .copied()
                    .find(|g| matches!(g, GeometryType::MultiPolygon | GeometryType::MultiLineString))
                    .unwrap_or(GeometryType::Geometry),
            ),
        }
    }
}

fn geometry_type(name: &str) -> HydamoResult<GeometryType> {
    match name {
        "Point" | "PointZ" => Ok(GeometryType::Point),
        "LineString" | "LineStringZ" => Ok(GeometryType::LineString),
        "MultiLineString" => Ok(GeometryType::MultiLineString),
        "Polygon" => Ok(GeometryType::Polygon),
        "MultiPolygon" => Ok(GeometryType::MultiPolygon),
        other => Err(HydamoError::InvalidSchema(format!("unknown geometry type '{other}'"))),
    }
}

/// Schema of a layer from its `properties` object in the HyDAMO JSON.
///
/// `shape` holds the geometry type(s); `minItems: 1` marks a column as
/// required, `uniqueItems` as unique and `enum` restricts its values.
pub fn map_definition(properties: &Map<String, Json>) -> HydamoResult<LayerSchema> {
    let mut schema = LayerSchema::default();
    for (id, definition) in properties {
        let definition = definition
            .as_object()
            .ok_or_else(|| HydamoError::InvalidSchema(format!("property '{id}' is not an object")))?;
        if id == "shape" {
            schema.geometry = match definition.get("type") {
                Some(Json::String(name)) => vec![geometry_type(name)?],
                Some(Json::Array(names)) => names
                    .iter()
                    .map(|n| {
                        n.as_str()
                            .ok_or_else(|| HydamoError::InvalidSchema("geometry type is not a string".into()))
                            .and_then(geometry_type)
                    })
                    .collect::<HydamoResult<_>>()?,
                _ => return Err(HydamoError::InvalidSchema("shape without type".into())),
            };
            continue;
        }
        schema.fields.push(Field {
            id: id.to_lowercase(),
            dtype: FieldType::from_json(definition),
            required: definition.get("minItems").and_then(Json::as_u64) == Some(1),
            unique: definition
                .get("uniqueItems")
                .and_then(Json::as_bool)
                .unwrap_or(false),
            domain: definition
                .get("enum")
                .and_then(Json::as_array)
                .map(|values| values.iter().map(Value::from_json).collect()),
        });
    }
    Ok(schema)
}

/// Layer names and schemas of a HyDAMO JSON document, in document order.
pub fn read_schema(document: &str) -> HydamoResult<Vec<(String, LayerSchema)>> {
    let json: Json = serde_json::from_str(document)?;
    let refs = json
        .pointer("/properties/HyDAMO/anyOf")
        .and_then(Json::as_array)
        .ok_or_else(|| HydamoError::InvalidSchema("no HyDAMO layer list".into()))?;
    let mut layers = Vec::new();
    for item in refs {
        let name = item
            .get("$ref")
            .and_then(Json::as_str)
            .and_then(|r| r.rsplit('/').next())
            .ok_or_else(|| HydamoError::InvalidSchema("layer reference without $ref".into()))?;
        let properties = json
            .pointer(&format!("/definitions/{name}/properties"))
            .and_then(Json::as_object)
            .ok_or_else(|| HydamoError::InvalidSchema(format!("no definition for '{name}'")))?;
        layers.push((name.to_string(), map_definition(properties)?));
    }
    Ok(layers)
}
