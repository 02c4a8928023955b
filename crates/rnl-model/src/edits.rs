//! Operator edits: a closed set of typed operations read from a YAML list
//! or from a GeoPackage whose layer names are operation tags.
//!
//! Parameters are checked when the edits are loaded. Unknown tags and
//! unknown parameters are load errors, so a file either applies as a whole
//! or is rejected before the model is touched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use geo::{Geometry, MultiPolygon, Point};
use rnl_core::{LinkId, NodeId};
use rnl_gpkg::{GeoPackage, Value};
use tracing::{debug, info};

use crate::edit::StaticUpdate;
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, NodeAttrs};
use crate::node_type::NodeType;
use crate::tables::{Table, TableKind};

pub const TAGS: [&str; 14] = [
    "remove_node",
    "add_basin",
    "merge_basins",
    "reverse_link",
    "update_node",
    "connect_basins",
    "add_basin_outlet",
    "add_basin_area",
    "update_basin_area",
    "move_node",
    "deactivate_node",
    "redirect_link",
    "remove_link",
    "update_static",
];

/// How `reverse_link` finds its link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkRef {
    Id(LinkId),
    Between { from_node_id: NodeId, to_node_id: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    RemoveNode {
        node_id: NodeId,
        remove_edges: bool,
    },
    AddBasin {
        geometry: Point<f64>,
        attrs: NodeAttrs,
    },
    MergeBasins {
        basin_id: NodeId,
        to_basin_id: NodeId,
        are_connected: bool,
    },
    ReverseLink(LinkRef),
    UpdateNode {
        node_id: NodeId,
        node_type: NodeType,
        data: Vec<Table>,
    },
    ConnectBasins {
        from_basin_id: NodeId,
        to_basin_id: NodeId,
        node_type: NodeType,
        geometry: Point<f64>,
        attrs: NodeAttrs,
    },
    AddBasinOutlet {
        basin_id: NodeId,
        geometry: Point<f64>,
        node_type: NodeType,
        attrs: NodeAttrs,
    },
    AddBasinArea {
        node_id: NodeId,
        geometry: MultiPolygon<f64>,
    },
    UpdateBasinArea {
        node_id: NodeId,
        geometry: MultiPolygon<f64>,
    },
    MoveNode {
        node_id: NodeId,
        geometry: Point<f64>,
    },
    DeactivateNode {
        node_id: NodeId,
    },
    RedirectLink {
        link_id: LinkId,
        from_node_id: Option<NodeId>,
        to_node_id: Option<NodeId>,
    },
    RemoveLink {
        link_id: LinkId,
    },
    UpdateStatic {
        node_id: NodeId,
        update: StaticUpdate,
    },
}

impl EditOp {
    pub fn tag(&self) -> &'static str {
        match self {
            EditOp::RemoveNode { .. } => "remove_node",
            EditOp::AddBasin { .. } => "add_basin",
            EditOp::MergeBasins { .. } => "merge_basins",
            EditOp::ReverseLink(_) => "reverse_link",
            EditOp::UpdateNode { .. } => "update_node",
            EditOp::ConnectBasins { .. } => "connect_basins",
            EditOp::AddBasinOutlet { .. } => "add_basin_outlet",
            EditOp::AddBasinArea { .. } => "add_basin_area",
            EditOp::UpdateBasinArea { .. } => "update_basin_area",
            EditOp::MoveNode { .. } => "move_node",
            EditOp::DeactivateNode { .. } => "deactivate_node",
            EditOp::RedirectLink { .. } => "redirect_link",
            EditOp::RemoveLink { .. } => "remove_link",
            EditOp::UpdateStatic { .. } => "update_static",
        }
    }
}

/// One edit with its position in the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEdit {
    pub order: Option<i64>,
    pub layer: usize,
    pub row: usize,
    pub op: EditOp,
}

/// Parameters of one row, tracking which ones were read.
struct Params<'a> {
    tag: &'a str,
    values: BTreeMap<String, Value>,
    geometry: Option<Geometry<f64>>,
    used: BTreeSet<String>,
}

impl<'a> Params<'a> {
    fn new(tag: &'a str, values: BTreeMap<String, Value>, geometry: Option<Geometry<f64>>) -> Self {
        let values = values.into_iter().filter(|(_, v)| !v.is_null()).collect();
        Self {
            tag,
            values,
            geometry,
            used: BTreeSet::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> ModelError {
        ModelError::Edit {
            tag: self.tag.to_string(),
            message: message.into(),
        }
    }

    fn take(&mut self, key: &str) -> Option<Value> {
        self.used.insert(key.to_string());
        self.values.get(key).cloned()
    }

    fn opt_i64(&mut self, key: &str) -> ModelResult<Option<i64>> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| self.error(format!("{key} is not an integer: {v:?}"))),
        }
    }

    fn opt_node_id(&mut self, key: &str) -> ModelResult<Option<NodeId>> {
        match self.opt_i64(key)? {
            None => Ok(None),
            Some(v) => Ok(Some(NodeId::try_from(v)?)),
        }
    }

    fn node_id(&mut self, key: &str) -> ModelResult<NodeId> {
        self.opt_node_id(key)?
            .ok_or_else(|| self.error(format!("missing {key}")))
    }

    fn opt_link_id(&mut self, key: &str) -> ModelResult<Option<LinkId>> {
        match self.opt_i64(key)? {
            None => Ok(None),
            Some(v) => Ok(Some(LinkId::try_from(v)?)),
        }
    }

    fn opt_f64(&mut self, key: &str) -> ModelResult<Option<f64>> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.error(format!("{key} is not a number: {v:?}"))),
        }
    }

    fn opt_bool(&mut self, key: &str) -> ModelResult<Option<bool>> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.error(format!("{key} is not a boolean: {v:?}"))),
        }
    }

    fn opt_str(&mut self, key: &str) -> Option<String> {
        self.take(key).and_then(|v| v.as_str().map(str::to_string))
    }

    fn opt_node_type(&mut self, key: &str) -> ModelResult<Option<NodeType>> {
        self.opt_str(key).map(|s| s.parse()).transpose()
    }

    fn node_type(&mut self, key: &str) -> ModelResult<NodeType> {
        self.opt_node_type(key)?
            .ok_or_else(|| self.error(format!("missing {key}")))
    }

    fn point(&mut self) -> ModelResult<Point<f64>> {
        self.used.insert("geometry".to_string());
        match &self.geometry {
            Some(Geometry::Point(p)) => Ok(*p),
            Some(Geometry::MultiPoint(mp)) if mp.0.len() == 1 => Ok(mp.0[0]),
            Some(other) => Err(self.error(format!("expected a point geometry, got {other:?}"))),
            None => Err(self.error("missing geometry")),
        }
    }

    fn area(&mut self) -> ModelResult<MultiPolygon<f64>> {
        self.used.insert("geometry".to_string());
        match &self.geometry {
            Some(Geometry::Polygon(p)) => Ok(MultiPolygon::new(vec![p.clone()])),
            Some(Geometry::MultiPolygon(mp)) => Ok(mp.clone()),
            Some(_) => Err(self.error("expected a polygon geometry")),
            None => Err(self.error("missing geometry")),
        }
    }

    /// Optional node attributes: name and every `meta_*` column.
    fn node_attrs(&mut self) -> NodeAttrs {
        let meta_keys: Vec<String> = self
            .values
            .keys()
            .filter(|k| k.starts_with("meta_"))
            .cloned()
            .collect();
        let mut attrs = NodeAttrs {
            name: self.opt_str("name"),
            ..NodeAttrs::default()
        };
        for key in meta_keys {
            let Some(value) = self.take(&key) else {
                continue;
            };
            match key.as_str() {
                "meta_categorie" => attrs.meta_categorie = value.as_str().map(str::to_string),
                "meta_code_waterbeheerder" => {
                    attrs.meta_code_waterbeheerder = value.as_str().map(str::to_string)
                }
                _ => {
                    attrs.meta.insert(key, value);
                }
            }
        }
        attrs
    }

    /// `data` of `update_node`: a JSON object from table name to rows.
    fn tables(&mut self, node_type: NodeType) -> ModelResult<Vec<Table>> {
        let Some(text) = self.opt_str("data") else {
            return Ok(Vec::new());
        };
        let json: BTreeMap<String, Vec<BTreeMap<String, serde_json::Value>>> =
            serde_json::from_str(&text).map_err(|e| self.error(format!("invalid data: {e}")))?;
        let mut tables = Vec::new();
        for (name, rows) in json {
            let kind = TableKind::for_node_type(node_type)
                .find(|k| k.table_name() == name)
                .ok_or_else(|| self.error(format!("{node_type} has no table '{name}'")))?;
            let rows: Vec<BTreeMap<String, Value>> = rows
                .iter()
                .map(|row| {
                    let mut attrs: BTreeMap<String, Value> = row
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect();
                    // placeholder, re-keyed on insertion
                    attrs.insert("node_id".to_string(), Value::Integer(1));
                    attrs
                })
                .collect();
            tables.push(Table::from_attribute_rows(kind, &rows)?);
        }
        Ok(tables)
    }

    fn finish(self) -> ModelResult<()> {
        let unknown: Vec<&String> = self
            .values
            .keys()
            .filter(|k| !self.used.contains(*k))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(self.error(format!("unknown parameters {unknown:?}")))
        }
    }
}

/// Parse one row of a tagged edit.
pub fn parse_edit(
    tag: &str,
    values: BTreeMap<String, Value>,
    geometry: Option<Geometry<f64>>,
) -> ModelResult<(Option<i64>, EditOp)> {
    let mut p = Params::new(tag, values, geometry);
    let order = p.opt_i64("order")?;
    p.used.insert("fid".to_string());
    let op = match tag {
        "remove_node" => {
            let node_id = p.node_id("node_id")?;
            let remove_edges = match p.opt_bool("remove_edges")? {
                Some(v) => v,
                None => p.opt_bool("remove_links")?.unwrap_or(true),
            };
            EditOp::RemoveNode {
                node_id,
                remove_edges,
            }
        }
        "add_basin" => {
            let node_id = p.opt_node_id("node_id")?;
            let geometry = p.point()?;
            let mut attrs = p.node_attrs();
            attrs.node_id = node_id;
            EditOp::AddBasin { geometry, attrs }
        }
        "merge_basins" => EditOp::MergeBasins {
            basin_id: p.node_id("basin_id")?,
            to_basin_id: p.node_id("to_basin_id")?,
            are_connected: p.opt_bool("are_connected")?.unwrap_or(true),
        },
        "reverse_link" => {
            let link_id = match p.opt_link_id("link_id")? {
                Some(id) => Some(id),
                None => p.opt_link_id("edge_id")?,
            };
            let from = p.opt_node_id("from_node_id")?;
            let to = p.opt_node_id("to_node_id")?;
            match (link_id, from, to) {
                (Some(id), _, _) => EditOp::ReverseLink(LinkRef::Id(id)),
                (None, Some(from_node_id), Some(to_node_id)) => EditOp::ReverseLink(LinkRef::Between {
                    from_node_id,
                    to_node_id,
                }),
                _ => return Err(p.error("needs link_id or from_node_id and to_node_id")),
            }
        }
        "update_node" => {
            let node_id = p.node_id("node_id")?;
            let node_type = p.node_type("node_type")?;
            let data = p.tables(node_type)?;
            EditOp::UpdateNode {
                node_id,
                node_type,
                data,
            }
        }
        "connect_basins" => {
            let from_basin_id = p.node_id("from_basin_id")?;
            let to_basin_id = p.node_id("to_basin_id")?;
            let node_type = p.node_type("node_type")?;
            let geometry = p.point()?;
            EditOp::ConnectBasins {
                from_basin_id,
                to_basin_id,
                node_type,
                geometry,
                attrs: p.node_attrs(),
            }
        }
        "add_basin_outlet" => {
            let basin_id = p.node_id("basin_id")?;
            let geometry = p.point()?;
            let node_type = p.opt_node_type("node_type")?.unwrap_or(NodeType::Outlet);
            EditOp::AddBasinOutlet {
                basin_id,
                geometry,
                node_type,
                attrs: p.node_attrs(),
            }
        }
        "add_basin_area" => EditOp::AddBasinArea {
            node_id: p.node_id("node_id")?,
            geometry: p.area()?,
        },
        "update_basin_area" => EditOp::UpdateBasinArea {
            node_id: p.node_id("node_id")?,
            geometry: p.area()?,
        },
        "move_node" => EditOp::MoveNode {
            node_id: p.node_id("node_id")?,
            geometry: p.point()?,
        },
        "deactivate_node" => EditOp::DeactivateNode {
            node_id: p.node_id("node_id")?,
        },
        "redirect_link" => {
            let link_id = match p.opt_link_id("link_id")? {
                Some(id) => id,
                None => p
                    .opt_link_id("edge_id")?
                    .ok_or_else(|| p.error("missing link_id"))?,
            };
            EditOp::RedirectLink {
                link_id,
                from_node_id: p.opt_node_id("from_node_id")?,
                to_node_id: p.opt_node_id("to_node_id")?,
            }
        }
        "remove_link" => {
            let link_id = match p.opt_link_id("link_id")? {
                Some(id) => id,
                None => p
                    .opt_link_id("edge_id")?
                    .ok_or_else(|| p.error("missing link_id"))?,
            };
            EditOp::RemoveLink { link_id }
        }
        "update_static" => EditOp::UpdateStatic {
            node_id: p.node_id("node_id")?,
            update: StaticUpdate {
                flow_rate: p.opt_f64("flow_rate")?,
                min_upstream_level: p.opt_f64("min_upstream_level")?,
                max_downstream_level: p.opt_f64("max_downstream_level")?,
                level: p.opt_f64("level")?,
                active: p.opt_bool("active")?,
            },
        },
        other => return Err(ModelError::Edit {
            tag: other.to_string(),
            message: format!("unknown edit, expected one of {TAGS:?}"),
        }),
    };
    p.finish()?;
    Ok((order, op))
}

/// Sort on (order, layer, row); edits without order run after ordered ones.
fn sorted(mut edits: Vec<ModelEdit>) -> Vec<ModelEdit> {
    edits.sort_by_key(|e| (e.order.unwrap_or(i64::MAX), e.layer, e.row));
    edits
}

/// Read edits from a YAML list of maps with a `tag` key; geometries are WKT.
pub fn edits_from_yaml(text: &str) -> ModelResult<Vec<ModelEdit>> {
    let rows: Vec<BTreeMap<String, serde_yaml::Value>> = serde_yaml::from_str(text)?;
    let mut layers: Vec<String> = Vec::new();
    let mut edits = Vec::with_capacity(rows.len());
    for (row, raw) in rows.into_iter().enumerate() {
        let mut values: BTreeMap<String, Value> = BTreeMap::new();
        for (key, value) in raw {
            values.insert(key, Value::from_json(&serde_json::to_value(value)?));
        }
        let tag = values
            .remove("tag")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| ModelError::Edit {
                tag: String::new(),
                message: format!("row {row} has no tag"),
            })?;
        let geometry = match values.remove("geometry") {
            Some(Value::Text(wkt)) => Some(rnl_geometry::from_wkt(&wkt)?),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(ModelError::Edit {
                    tag,
                    message: format!("geometry must be WKT text, got {other:?}"),
                });
            }
        };
        let layer = match layers.iter().position(|l| *l == tag) {
            Some(i) => i,
            None => {
                layers.push(tag.clone());
                layers.len() - 1
            }
        };
        let (order, op) = parse_edit(&tag, values, geometry)?;
        edits.push(ModelEdit {
            order,
            layer,
            row,
            op,
        });
    }
    Ok(sorted(edits))
}

/// Read edits from a GeoPackage with one layer per tag.
pub fn edits_from_gpkg(gpkg: &GeoPackage) -> ModelResult<Vec<ModelEdit>> {
    let mut edits = Vec::new();
    for (layer_index, name) in gpkg.list_layers()?.into_iter().enumerate() {
        let layer = gpkg.read_layer(&name)?;
        for (row, feature) in layer.features.into_iter().enumerate() {
            let (order, op) = parse_edit(&name, feature.attributes, feature.geometry)?;
            edits.push(ModelEdit {
                order,
                layer: layer_index,
                row,
                op,
            });
        }
    }
    Ok(sorted(edits))
}

/// Read edits from `.yaml`/`.yml` or `.gpkg`.
pub fn read_edits(path: &Path) -> ModelResult<Vec<ModelEdit>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let edits = match extension.as_deref() {
        Some("yaml") | Some("yml") => edits_from_yaml(&std::fs::read_to_string(path)?)?,
        Some("gpkg") => edits_from_gpkg(&GeoPackage::open(path)?)?,
        _ => {
            return Err(ModelError::invalid(format!(
                "unsupported edit file {}",
                path.display()
            )));
        }
    };
    info!(path = %path.display(), edits = edits.len(), "read model edits");
    Ok(edits)
}

impl Model {
    pub fn apply_edit(&mut self, op: &EditOp) -> ModelResult<()> {
        debug!(tag = op.tag(), "applying edit");
        match op.clone() {
            EditOp::RemoveNode {
                node_id,
                remove_edges,
            } => self.remove_node(node_id, remove_edges),
            EditOp::AddBasin { geometry, attrs } => {
                self.add_node(NodeType::Basin, geometry, attrs).map(|_| ())
            }
            EditOp::MergeBasins {
                basin_id,
                to_basin_id,
                are_connected,
            } => self.merge_basins(basin_id, to_basin_id, are_connected),
            EditOp::ReverseLink(LinkRef::Id(link_id)) => self.reverse_link(link_id),
            EditOp::ReverseLink(LinkRef::Between {
                from_node_id,
                to_node_id,
            }) => {
                let link_id = self
                    .find_link(from_node_id, to_node_id)
                    .map(|l| l.link_id)
                    .ok_or_else(|| ModelError::Edit {
                        tag: "reverse_link".to_string(),
                        message: format!("no link {from_node_id} -> {to_node_id}"),
                    })?;
                self.reverse_link(link_id)
            }
            EditOp::UpdateNode {
                node_id,
                node_type,
                data,
            } => self.update_node(node_id, node_type, data),
            EditOp::ConnectBasins {
                from_basin_id,
                to_basin_id,
                node_type,
                geometry,
                attrs,
            } => self
                .add_and_connect_node(from_basin_id, to_basin_id, geometry, node_type, attrs)
                .map(|_| ()),
            EditOp::AddBasinOutlet {
                basin_id,
                geometry,
                node_type,
                attrs,
            } => self
                .add_basin_outlet(basin_id, geometry, node_type, attrs)
                .map(|_| ()),
            EditOp::AddBasinArea { node_id, geometry } => self.add_basin_area(node_id, geometry),
            EditOp::UpdateBasinArea { node_id, geometry } => {
                self.update_basin_area(node_id, geometry)
            }
            EditOp::MoveNode { node_id, geometry } => self.move_node(node_id, geometry),
            EditOp::DeactivateNode { node_id } => self.deactivate_node(node_id),
            EditOp::RedirectLink {
                link_id,
                from_node_id,
                to_node_id,
            } => self.redirect_link(link_id, from_node_id, to_node_id),
            EditOp::RemoveLink { link_id } => self.remove_link(link_id),
            EditOp::UpdateStatic { node_id, update } => self.update_static(node_id, update),
        }
    }

    /// Apply edits in order, stopping at the first failure.
    pub fn apply_edits(&mut self, edits: &[ModelEdit]) -> ModelResult<()> {
        for edit in edits {
            self.apply_edit(&edit.op).map_err(|e| match e {
                ModelError::Edit { .. } => e,
                other => ModelError::Edit {
                    tag: edit.op.tag().to_string(),
                    message: format!("row {} of layer {}: {other}", edit.row, edit.layer),
                },
            })?;
        }
        info!(edits = edits.len(), "applied model edits");
        Ok(())
    }
}
