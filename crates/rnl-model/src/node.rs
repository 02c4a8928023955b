//! Rows of the Node and Link tables.

use std::collections::BTreeMap;

use geo::{Geometry, LineString, Point};
use rnl_core::{LinkId, NodeId};
use rnl_gpkg::{Feature, Value};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::node_type::{LinkType, NodeFunction, NodeType};
use crate::row::{from_attributes, to_attributes};

fn origin() -> Point<f64> {
    Point::new(0.0, 0.0)
}

fn empty_line() -> LineString<f64> {
    LineString::new(Vec::new())
}

fn set_or_clear(meta: &mut BTreeMap<String, Value>, key: &str, value: Value) {
    if value.is_null() {
        meta.remove(key);
    } else {
        meta.insert(key.to_string(), value);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub node_type: NodeType,
    #[serde(skip, default = "origin")]
    pub geometry: Point<f64>,
    pub name: Option<String>,
    pub subnetwork_id: Option<i32>,
    pub meta_categorie: Option<String>,
    pub meta_code_waterbeheerder: Option<String>,
    pub meta_function: Option<NodeFunction>,
    /// Remaining `meta_*` columns.
    #[serde(flatten)]
    pub meta: BTreeMap<String, Value>,
}

impl Node {
    pub fn new(node_id: NodeId, node_type: NodeType, geometry: Point<f64>) -> Self {
        Self {
            node_id,
            node_type,
            geometry,
            name: None,
            subnetwork_id: None,
            meta_categorie: None,
            meta_code_waterbeheerder: None,
            meta_function: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta.get(key).filter(|v| !v.is_null())
    }

    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        self.meta_value(key).and_then(Value::as_f64)
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta_value(key).and_then(Value::as_str)
    }

    pub fn meta_bool(&self, key: &str) -> Option<bool> {
        self.meta_value(key).and_then(Value::as_bool)
    }

    /// Set a meta column; `Null` removes it.
    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        set_or_clear(&mut self.meta, key, value.into());
    }

    pub fn to_feature(&self) -> ModelResult<Feature> {
        Ok(Feature {
            fid: None,
            geometry: Some(Geometry::Point(self.geometry)),
            attributes: to_attributes(self, "Node")?,
        })
    }

    /// Read a Node row; `node_id` falls back to the feature id.
    pub fn from_feature(feature: &Feature) -> ModelResult<Self> {
        let mut attributes = feature.attributes.clone();
        if feature.get("node_id").is_null()
            && let Some(fid) = feature.fid
        {
            attributes.insert("node_id".to_string(), Value::Integer(fid));
        }
        if let Some(Value::Text(t)) = attributes.get("node_type")
            && let Ok(node_type) = t.parse::<NodeType>()
        {
            // accept snake_case spellings
            attributes.insert("node_type".to_string(), Value::from(node_type.as_str()));
        }
        let mut node: Node = from_attributes(&attributes, "Node")?;
        node.geometry = match &feature.geometry {
            Some(Geometry::Point(p)) => *p,
            Some(Geometry::MultiPoint(mp)) if mp.0.len() == 1 => mp.0[0],
            _ => {
                return Err(ModelError::InvalidRow {
                    table: "Node".to_string(),
                    message: format!("node {} has no point geometry", node.node_id),
                });
            }
        };
        Ok(node)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub link_id: LinkId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    /// Type of the from-node as recorded when the link was last touched.
    pub from_node_type: Option<NodeType>,
    pub to_node_type: Option<NodeType>,
    #[serde(default)]
    pub link_type: LinkType,
    #[serde(skip, default = "empty_line")]
    pub geometry: LineString<f64>,
    pub name: Option<String>,
    pub meta_categorie: Option<String>,
    #[serde(flatten)]
    pub meta: BTreeMap<String, Value>,
}

impl Link {
    pub fn new(
        link_id: LinkId,
        from_node_id: NodeId,
        to_node_id: NodeId,
        geometry: LineString<f64>,
    ) -> Self {
        Self {
            link_id,
            from_node_id,
            to_node_id,
            from_node_type: None,
            to_node_type: None,
            link_type: LinkType::Flow,
            geometry,
            name: None,
            meta_categorie: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn touches(&self, node_id: NodeId) -> bool {
        self.from_node_id == node_id || self.to_node_id == node_id
    }

    pub fn is_flow(&self) -> bool {
        self.link_type == LinkType::Flow
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        set_or_clear(&mut self.meta, key, value.into());
    }

    pub fn to_feature(&self) -> ModelResult<Feature> {
        Ok(Feature {
            fid: None,
            geometry: Some(Geometry::LineString(self.geometry.clone())),
            attributes: to_attributes(self, "Link")?,
        })
    }

    /// Read a Link row; older databases name the id `edge_id` and the type
    /// `edge_type`.
    pub fn from_feature(feature: &Feature) -> ModelResult<Self> {
        let mut attributes = feature.attributes.clone();
        for (old, new) in [("edge_id", "link_id"), ("edge_type", "link_type")] {
            if let Some(value) = attributes.remove(old)
                && attributes.get(new).is_none_or(Value::is_null)
            {
                attributes.insert(new.to_string(), value);
            }
        }
        if attributes.get("link_id").is_none_or(Value::is_null)
            && let Some(fid) = feature.fid
        {
            attributes.insert("link_id".to_string(), Value::Integer(fid));
        }
        let mut link: Link = from_attributes(&attributes, "Link")?;
        link.geometry = match &feature.geometry {
            Some(Geometry::LineString(l)) => l.clone(),
            Some(Geometry::MultiLineString(ml)) if ml.0.len() == 1 => ml.0[0].clone(),
            Some(Geometry::Line(l)) => LineString::from(vec![l.start, l.end]),
            _ => {
                return Err(ModelError::InvalidRow {
                    table: "Link".to_string(),
                    message: format!("link {} has no line geometry", link.link_id),
                });
            }
        };
        Ok(link)
    }
}
