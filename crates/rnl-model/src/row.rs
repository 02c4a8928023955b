//! Bridge between typed table rows and GeoPackage attributes.
//!
//! Rows are converted through their serde representation, so a field's
//! serde name is also its column name. Null attributes are dropped before
//! deserialization: absent optional columns read as `None`, and unknown
//! columns end up in a row's flattened `meta` map when it has one.

use std::collections::BTreeMap;

use rnl_core::NodeId;
use rnl_gpkg::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ModelError, ModelResult};
use crate::tables::{Table, TableKind};

/// A row of a node sub-table, keyed on `node_id`.
pub trait NodeRow: Clone + std::fmt::Debug + Serialize + DeserializeOwned {
    const KIND: TableKind;

    fn node_id(&self) -> NodeId;
    fn set_node_id(&mut self, node_id: NodeId);

    /// Other nodes this row refers to (e.g. `listen_node_id`).
    fn referenced_nodes(&self) -> Vec<NodeId> {
        Vec::new()
    }

    fn remap_references(&mut self, _remap: &dyn Fn(NodeId) -> NodeId) {}

    fn rows(table: &Table) -> Option<&Vec<Self>>;
    fn rows_mut(table: &mut Table) -> Option<&mut Vec<Self>>;
    fn into_table(rows: Vec<Self>) -> Table;
}

pub(crate) fn to_attributes<T: Serialize>(
    row: &T,
    table: &str,
) -> ModelResult<BTreeMap<String, Value>> {
    match serde_json::to_value(row)? {
        serde_json::Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect()),
        other => Err(ModelError::InvalidRow {
            table: table.to_string(),
            message: format!("row serialized to {other}, expected an object"),
        }),
    }
}

pub(crate) fn from_attributes<T: DeserializeOwned>(
    attributes: &BTreeMap<String, Value>,
    table: &str,
) -> ModelResult<T> {
    let map: serde_json::Map<String, serde_json::Value> = attributes
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    serde_json::from_value(serde_json::Value::Object(map)).map_err(|e| ModelError::InvalidRow {
        table: table.to_string(),
        message: e.to_string(),
    })
}

/// Optional boolean columns, which SQLite stores as 0/1.
pub(crate) mod flag {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Int(i64),
            Real(f64),
            Text(String),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => None,
            Some(Raw::Bool(b)) => Some(b),
            Some(Raw::Int(i)) => Some(i != 0),
            Some(Raw::Real(f)) => Some(f != 0.0),
            Some(Raw::Text(t)) => match t.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{BasinProfile, PumpStatic};

    fn id(v: u32) -> NodeId {
        NodeId::new(v).unwrap()
    }

    #[test]
    fn attributes_use_serde_names() {
        let row = BasinProfile {
            node_id: id(3),
            level: 1.5,
            area: 10.0,
        };
        let attrs = to_attributes(&row, "Basin / profile").unwrap();
        assert_eq!(attrs["node_id"], Value::Integer(3));
        assert_eq!(attrs["level"], Value::Real(1.5));
        let back: BasinProfile = from_attributes(&attrs, "Basin / profile").unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn integer_flag_and_meta_columns_are_read() {
        let mut attrs = BTreeMap::new();
        attrs.insert("node_id".to_string(), Value::Integer(7));
        attrs.insert("flow_rate".to_string(), Value::Integer(2));
        attrs.insert("active".to_string(), Value::Integer(1));
        attrs.insert("meta_categorie".to_string(), Value::from("Afvoergemaal"));
        attrs.insert("min_upstream_level".to_string(), Value::Null);
        let row: PumpStatic = from_attributes(&attrs, "Pump / static").unwrap();
        assert_eq!(row.node_id, id(7));
        assert_eq!(row.flow_rate, 2.0);
        assert_eq!(row.active, Some(true));
        assert_eq!(row.min_upstream_level, None);
        assert_eq!(row.meta.get("meta_categorie"), Some(&Value::from("Afvoergemaal")));
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let mut attrs = BTreeMap::new();
        attrs.insert("node_id".to_string(), Value::Integer(1));
        let err = from_attributes::<BasinProfile>(&attrs, "Basin / profile").unwrap_err();
        assert!(matches!(err, ModelError::InvalidRow { .. }));
    }
}
