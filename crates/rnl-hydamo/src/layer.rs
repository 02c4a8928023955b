//! A HyDAMO layer: features validated against their schema.

use std::collections::BTreeMap;

use geo::{Geometry, MultiLineString, MultiPolygon};
use rnl_gpkg::{Feature, GeometryType, Layer, Value};
use tracing::debug;

use crate::error::{HydamoError, HydamoResult};
use crate::schema::{GEOMETRY, LayerSchema};

/// Checks applied by [`ExtendedLayer::set_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct SetDataOptions {
    pub check_columns: bool,
    pub check_geotype: bool,
    /// Values for columns absent from the input.
    pub extra_attributes: BTreeMap<String, Value>,
}

impl Default for SetDataOptions {
    fn default() -> Self {
        Self {
            check_columns: true,
            check_geotype: true,
            extra_attributes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedLayer {
    pub name: String,
    pub schema: LayerSchema,
    pub required_columns: Vec<String>,
    pub features: Vec<Feature>,
}

impl ExtendedLayer {
    pub fn new(name: impl Into<String>, schema: LayerSchema) -> Self {
        let required_columns = schema.required_columns();
        Self {
            name: name.into(),
            schema,
            required_columns,
            features: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Schema columns plus any extra columns present in the data.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.schema.fields.iter().map(|f| f.id.clone()).collect();
        for feature in &self.features {
            for name in feature.attributes.keys() {
                if !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
        }
        columns
    }

    /// Feature with this `globalid`.
    pub fn get(&self, global_id: &str) -> Option<&Feature> {
        self.features
            .iter()
            .find(|f| f.get_str("globalid") == Some(global_id))
    }

    /// Replace the content of the layer.
    ///
    /// Column names are lower-cased. Values of schema columns are coerced to
    /// their type; rows that can't be coerced, lack a required value, repeat
    /// a unique value or fall outside a domain are rejected together with
    /// the offending row numbers. The layer is left untouched on error.
    pub fn set_data(&mut self, features: Vec<Feature>, options: &SetDataOptions) -> HydamoResult<()> {
        let mut features: Vec<Feature> = features
            .into_iter()
            .map(|mut f| {
                f.attributes = f
                    .attributes
                    .into_iter()
                    .map(|(k, v)| (k.to_lowercase(), v))
                    .collect();
                f
            })
            .collect();

        if options.check_columns {
            self.check_columns(&features)?;
        }
        self.coerce(&mut features)?;
        if options.check_geotype {
            self.check_geotype(&features)?;
        }
        for feature in &mut features {
            for (name, value) in &options.extra_attributes {
                feature
                    .attributes
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        debug!(layer = %self.name, rows = features.len(), "set HyDAMO data");
        self.features = features;
        Ok(())
    }

    fn check_columns(&self, features: &[Feature]) -> HydamoResult<()> {
        let mut present: Vec<String> = Vec::new();
        for feature in features {
            for name in feature.attributes.keys() {
                if !present.contains(name) {
                    present.push(name.clone());
                }
            }
        }
        if features.iter().any(|f| f.geometry.is_some()) {
            present.push(GEOMETRY.to_string());
        }
        for column in &self.required_columns {
            if !features.is_empty() && !present.contains(column) {
                return Err(HydamoError::MissingColumn {
                    layer: self.name.clone(),
                    column: column.clone(),
                    present,
                });
            }
        }
        Ok(())
    }

    fn coerce(&self, features: &mut [Feature]) -> HydamoResult<()> {
        for field in &self.schema.fields {
            let mut rows = Vec::new();
            let mut problem = "";
            let mut seen: Vec<Value> = Vec::new();
            for (row, feature) in features.iter_mut().enumerate() {
                let Some(value) = feature.attributes.get_mut(&field.id) else {
                    continue;
                };
                let Some(coerced) = field.dtype.coerce(value) else {
                    rows.push(row);
                    problem = "value of the wrong type";
                    continue;
                };
                *value = coerced;
                if value.is_null() {
                    if field.required {
                        rows.push(row);
                        problem = "missing required value";
                    }
                    continue;
                }
                if let Some(domain) = &field.domain
                    && !domain.contains(value)
                {
                    rows.push(row);
                    problem = "value outside the domain";
                } else if field.unique {
                    if seen.contains(value) {
                        rows.push(row);
                        problem = "duplicate value";
                    } else {
                        seen.push(value.clone());
                    }
                }
            }
            if !rows.is_empty() {
                return Err(HydamoError::Schema {
                    layer: self.name.clone(),
                    column: field.id.clone(),
                    problem: problem.to_string(),
                    rows,
                });
            }
        }
        Ok(())
    }

    fn check_geotype(&self, features: &[Feature]) -> HydamoResult<()> {
        if !self.schema.has_geometry() {
            return Ok(());
        }
        let mut rows = Vec::new();
        let mut found = Vec::new();
        for (row, feature) in features.iter().enumerate() {
            let Some(geometry) = &feature.geometry else {
                rows.push(row);
                continue;
            };
            let geometry_type = GeometryType::of(geometry);
            if !self.schema.geometry.contains(&geometry_type) {
                rows.push(row);
                if !found.contains(&geometry_type) {
                    found.push(geometry_type);
                }
            }
        }
        if rows.is_empty() {
            Ok(())
        } else {
            Err(HydamoError::GeometryType {
                layer: self.name.clone(),
                expected: self.schema.geometry.clone(),
                found,
                rows,
            })
        }
    }

    /// The layer for writing to a GeoPackage. With `use_schema` only schema
    /// columns are kept, typed as the schema says.
    pub fn to_layer(&self, srs_id: i32, use_schema: bool) -> Layer {
        let mut layer = Layer::new(&self.name);
        let column_type = self.schema.column_geometry_type();
        if let Some(geometry_type) = column_type {
            layer = layer.with_geometry(geometry_type, srs_id);
        }
        for field in &self.schema.fields {
            if self.features.iter().any(|f| f.attributes.contains_key(&field.id)) {
                layer.add_column(&field.id, field.dtype.column_kind());
            }
        }
        for feature in &self.features {
            let mut feature = feature.clone();
            if use_schema {
                feature
                    .attributes
                    .retain(|name, _| self.schema.field(name).is_some());
            }
            feature.fid = None;
            feature.geometry = feature.geometry.map(|g| promote(g, column_type));
            layer.push(feature);
        }
        if !use_schema {
            layer.infer_columns();
        }
        layer
    }
}

/// Single geometries stored in a multi-geometry column.
fn promote(geometry: Geometry<f64>, column: Option<GeometryType>) -> Geometry<f64> {
    match (geometry, column) {
        (Geometry::Polygon(p), Some(GeometryType::MultiPolygon)) => {
            Geometry::MultiPolygon(MultiPolygon::new(vec![p]))
        }
        (Geometry::LineString(l), Some(GeometryType::MultiLineString)) => {
            Geometry::MultiLineString(MultiLineString::new(vec![l]))
        }
        (geometry, _) => geometry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldType};
    use geo::{LineString, Point};

    fn stuw_schema() -> LayerSchema {
        let field = |id: &str, dtype, required, unique| Field {
            id: id.to_string(),
            dtype,
            required,
            unique,
            domain: None,
        };
        LayerSchema {
            fields: vec![
                field("code", FieldType::String, true, false),
                field("globalid", FieldType::String, true, true),
                field("kruinbreedte", FieldType::Number, false, false),
                Field {
                    domain: Some(vec![Value::Integer(1), Value::Integer(2)]),
                    ..field("soortstuw", FieldType::Integer, false, false)
                },
            ],
            geometry: vec![GeometryType::Point],
        }
    }

    fn stuw(code: &str, globalid: &str) -> Feature {
        Feature::new(None, Some(Geometry::Point(Point::new(1.0, 2.0))))
            .with("CODE", code)
            .with("globalid", globalid)
            .with("kruinbreedte", "2.5")
    }

    #[test]
    fn valid_rows_are_coerced() {
        let mut layer = ExtendedLayer::new("stuw", stuw_schema());
        layer
            .set_data(vec![stuw("KST-1", "a"), stuw("KST-2", "b")], &SetDataOptions::default())
            .unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.get("b").unwrap().get_str("code"), Some("KST-2"));
        assert_eq!(layer.features[0].get("kruinbreedte"), &Value::Real(2.5));
    }

    #[test]
    fn missing_required_column() {
        let mut layer = ExtendedLayer::new("stuw", stuw_schema());
        let mut feature = stuw("KST-1", "a");
        feature.attributes.remove("globalid");
        let err = layer.set_data(vec![feature], &SetDataOptions::default()).unwrap_err();
        assert!(matches!(err, HydamoError::MissingColumn { ref column, .. } if column == "globalid"));
        assert!(layer.is_empty());
    }

    #[test]
    fn offending_rows_are_listed() {
        let mut layer = ExtendedLayer::new("stuw", stuw_schema());
        let rows = vec![stuw("KST-1", "a"), stuw("KST-2", "a"), stuw("KST-3", "c").with("soortstuw", 7)];
        match layer.set_data(rows.clone(), &SetDataOptions::default()).unwrap_err() {
            HydamoError::Schema { column, rows, .. } => {
                assert_eq!(column, "globalid");
                assert_eq!(rows, vec![1]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut rows = rows;
        rows[1].set("globalid", "b");
        match layer.set_data(rows, &SetDataOptions::default()).unwrap_err() {
            HydamoError::Schema { column, rows, problem, .. } => {
                assert_eq!(column, "soortstuw");
                assert_eq!(rows, vec![2]);
                assert_eq!(problem, "value outside the domain");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_geometry_type() {
        let mut layer = ExtendedLayer::new("stuw", stuw_schema());
        let mut line = stuw("KST-1", "a");
        line.geometry = Some(Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)])));
        let err = layer
            .set_data(vec![stuw("KST-0", "z"), line], &SetDataOptions::default())
            .unwrap_err();
        match err {
            HydamoError::GeometryType { found, rows, .. } => {
                assert_eq!(found, vec![GeometryType::LineString]);
                assert_eq!(rows, vec![1]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let unchecked = SetDataOptions {
            check_geotype: false,
            ..SetDataOptions::default()
        };
        let mut line = stuw("KST-1", "a");
        line.geometry = Some(Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)])));
        assert!(layer.set_data(vec![line], &unchecked).is_ok());
    }

    #[test]
    fn schema_columns_only_when_writing() {
        let mut layer = ExtendedLayer::new("stuw", stuw_schema());
        let options = SetDataOptions {
            extra_attributes: [("bron".to_string(), Value::from("waterschap"))].into(),
            ..SetDataOptions::default()
        };
        layer.set_data(vec![stuw("KST-1", "a")], &options).unwrap();
        assert_eq!(layer.features[0].get_str("bron"), Some("waterschap"));

        let strict = layer.to_layer(28992, true);
        assert!(strict.has_column("kruinbreedte"));
        assert!(!strict.has_column("bron"));
        assert!(!strict.has_column("soortstuw"));
        let loose = layer.to_layer(28992, false);
        assert!(loose.has_column("bron"));
    }
}
