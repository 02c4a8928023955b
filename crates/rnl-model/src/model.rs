//! The Ribasim model: node and link tables plus typed sub-tables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo::{LineString, Point};
use rnl_core::{LinkId, NodeId};
use rnl_gpkg::Value;
use tracing::debug;

use crate::config::ModelConfig;
use crate::defaults::default_tables;
use crate::error::{ModelError, ModelResult};
use crate::node::{Link, Node};
use crate::node_type::{LinkType, NodeFunction, NodeType};
use crate::row::NodeRow;
use crate::tables::{Table, TableKind};

/// Maximum distance between a link end and its node geometry.
pub const DEFAULT_LINK_TOLERANCE: f64 = 1.0;

/// Optional attributes for [`Model::add_node`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAttrs {
    /// Use this id instead of `max + 1`.
    pub node_id: Option<NodeId>,
    pub name: Option<String>,
    pub subnetwork_id: Option<i32>,
    pub meta_categorie: Option<String>,
    pub meta_code_waterbeheerder: Option<String>,
    pub meta_function: Option<NodeFunction>,
    pub meta: BTreeMap<String, Value>,
    /// Sub-table rows for the new node; placeholder rows when empty.
    pub tables: Vec<Table>,
}

impl NodeAttrs {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Optional attributes for [`Model::add_link`].
#[derive(Debug, Clone, Default)]
pub struct LinkAttrs {
    pub link_id: Option<LinkId>,
    pub link_type: LinkType,
    pub geometry: Option<LineString<f64>>,
    pub name: Option<String>,
    pub meta_categorie: Option<String>,
    pub meta: BTreeMap<String, Value>,
}

impl LinkAttrs {
    pub fn control() -> Self {
        Self {
            link_type: LinkType::Control,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub config: ModelConfig,
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeMap<LinkId, Link>,
    tables: BTreeMap<TableKind, Table>,
    tolerance: f64,
    filepath: Option<PathBuf>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

impl Model {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
            tables: BTreeMap::new(),
            tolerance: DEFAULT_LINK_TOLERANCE,
            filepath: None,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    /// Path of the root descriptor this model was read from or written to.
    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }

    pub(crate) fn set_filepath(&mut self, path: &Path) {
        self.filepath = Some(path.to_path_buf());
    }

    // ---- nodes ----

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn has_node(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn node(&self, node_id: NodeId) -> ModelResult<&Node> {
        self.nodes
            .get(&node_id)
            .ok_or(ModelError::NodeNotFound { node_id })
    }

    pub fn node_mut(&mut self, node_id: NodeId) -> ModelResult<&mut Node> {
        self.nodes
            .get_mut(&node_id)
            .ok_or(ModelError::NodeNotFound { node_id })
    }

    pub fn node_type(&self, node_id: NodeId) -> ModelResult<NodeType> {
        self.node(node_id).map(|n| n.node_type)
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.node_type == node_type)
    }

    pub fn node_ids_of_type(&self, node_type: NodeType) -> Vec<NodeId> {
        self.nodes_of_type(node_type).map(|n| n.node_id).collect()
    }

    pub fn max_node_id(&self) -> Option<NodeId> {
        self.nodes.keys().next_back().copied()
    }

    pub fn next_node_id(&self) -> ModelResult<NodeId> {
        match self.max_node_id() {
            Some(id) => Ok(id.offset(1)?),
            None => Ok(NodeId::MIN),
        }
    }

    /// Check that `node_id` is of `expected` type.
    pub fn expect_node_type(&self, node_id: NodeId, expected: NodeType) -> ModelResult<&Node> {
        let node = self.node(node_id)?;
        if node.node_type == expected {
            Ok(node)
        } else {
            Err(ModelError::WrongNodeType {
                node_id,
                found: node.node_type,
                expected: expected.as_str(),
            })
        }
    }

    /// Insert a node row as-is.
    pub fn insert_node(&mut self, node: Node) -> ModelResult<()> {
        if self.nodes.contains_key(&node.node_id) {
            return Err(ModelError::DuplicateNode {
                node_id: node.node_id,
            });
        }
        self.nodes.insert(node.node_id, node);
        Ok(())
    }

    pub(crate) fn take_node(&mut self, node_id: NodeId) -> ModelResult<Node> {
        self.nodes
            .remove(&node_id)
            .ok_or(ModelError::NodeNotFound { node_id })
    }

    // ---- links ----

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn links_mut(&mut self) -> impl Iterator<Item = &mut Link> {
        self.links.values_mut()
    }

    pub fn flow_links(&self) -> impl Iterator<Item = &Link> {
        self.links.values().filter(|l| l.is_flow())
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn link(&self, link_id: LinkId) -> ModelResult<&Link> {
        self.links
            .get(&link_id)
            .ok_or(ModelError::LinkNotFound { link_id })
    }

    pub fn link_mut(&mut self, link_id: LinkId) -> ModelResult<&mut Link> {
        self.links
            .get_mut(&link_id)
            .ok_or(ModelError::LinkNotFound { link_id })
    }

    pub fn max_link_id(&self) -> Option<LinkId> {
        self.links.keys().next_back().copied()
    }

    pub fn next_link_id(&self) -> ModelResult<LinkId> {
        match self.max_link_id() {
            Some(id) => Ok(id.offset(1)?),
            None => Ok(LinkId::MIN),
        }
    }

    /// Links with `node_id` as either end.
    pub fn incident_links(&self, node_id: NodeId) -> Vec<&Link> {
        self.links.values().filter(|l| l.touches(node_id)).collect()
    }

    pub fn incoming_links(&self, node_id: NodeId) -> Vec<&Link> {
        self.links
            .values()
            .filter(|l| l.to_node_id == node_id)
            .collect()
    }

    pub fn outgoing_links(&self, node_id: NodeId) -> Vec<&Link> {
        self.links
            .values()
            .filter(|l| l.from_node_id == node_id)
            .collect()
    }

    /// Find the link between two nodes, in this direction.
    pub fn find_link(&self, from_node_id: NodeId, to_node_id: NodeId) -> Option<&Link> {
        self.links
            .values()
            .find(|l| l.from_node_id == from_node_id && l.to_node_id == to_node_id)
    }

    /// Insert a link row as-is, refreshing its node-type columns.
    pub fn insert_link(&mut self, mut link: Link) -> ModelResult<()> {
        if self.links.contains_key(&link.link_id) {
            return Err(ModelError::invalid(format!(
                "link {} already exists",
                link.link_id
            )));
        }
        link.from_node_type = self.nodes.get(&link.from_node_id).map(|n| n.node_type);
        link.to_node_type = self.nodes.get(&link.to_node_id).map(|n| n.node_type);
        self.links.insert(link.link_id, link);
        Ok(())
    }

    pub(crate) fn take_link(&mut self, link_id: LinkId) -> ModelResult<Link> {
        self.links
            .remove(&link_id)
            .ok_or(ModelError::LinkNotFound { link_id })
    }

    /// Refresh `from_node_type`/`to_node_type` on all links touching `node_id`.
    pub(crate) fn refresh_link_types(&mut self, node_id: NodeId) {
        let node_type = self.nodes.get(&node_id).map(|n| n.node_type);
        for link in self.links.values_mut() {
            if link.from_node_id == node_id {
                link.from_node_type = node_type;
            }
            if link.to_node_id == node_id {
                link.to_node_type = node_type;
            }
        }
    }

    // ---- sub-tables ----

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table_by_kind(&self, kind: TableKind) -> Option<&Table> {
        self.tables.get(&kind)
    }

    /// Rows of a typed sub-table; empty when absent.
    pub fn table<T: NodeRow>(&self) -> &[T] {
        self.tables
            .get(&T::KIND)
            .and_then(T::rows)
            .map_or(&[], Vec::as_slice)
    }

    /// Mutable rows of a typed sub-table, created when absent.
    pub fn table_mut<T: NodeRow>(&mut self) -> &mut Vec<T> {
        let table = self
            .tables
            .entry(T::KIND)
            .or_insert_with(|| T::into_table(Vec::new()));
        match T::rows_mut(table) {
            Some(rows) => rows,
            None => unreachable!("table stored under {:?} has another kind", T::KIND),
        }
    }

    /// Rows of one node in a typed sub-table.
    pub fn rows_of<'a, T: NodeRow + 'a>(&'a self, node_id: NodeId) -> impl Iterator<Item = &'a T> {
        self.table::<T>()
            .iter()
            .filter(move |row| row.node_id() == node_id)
    }

    /// Replace a whole sub-table.
    pub fn set_table(&mut self, table: Table) {
        self.tables.insert(table.kind(), table);
    }

    pub fn remove_table(&mut self, kind: TableKind) -> Option<Table> {
        self.tables.remove(&kind)
    }

    /// Replace the rows of the nodes present in `table`, keeping other rows.
    pub fn update_table(&mut self, table: Table) -> ModelResult<()> {
        let node_ids = table.node_ids();
        let existing = self
            .tables
            .entry(table.kind())
            .or_insert_with(|| Table::empty(table.kind()));
        existing.retain_nodes(|id| !node_ids.contains(&id));
        existing.append(table)
    }

    /// Drop all sub-table rows of `node_id`.
    pub(crate) fn remove_rows(&mut self, node_id: NodeId) {
        for table in self.tables.values_mut() {
            table.retain_nodes(|id| id != node_id);
        }
    }

    /// Drop empty sub-tables.
    pub fn prune_tables(&mut self) {
        self.tables.retain(|_, table| !table.is_empty());
    }

    // ---- construction ----

    /// Add a node at `geometry` with its sub-table rows.
    ///
    /// The id is `attrs.node_id` when given, else `max(node_id) + 1`.
    pub fn add_node(
        &mut self,
        node_type: NodeType,
        geometry: Point<f64>,
        attrs: NodeAttrs,
    ) -> ModelResult<NodeId> {
        let node_id = match attrs.node_id {
            Some(id) => id,
            None => self.next_node_id()?,
        };
        if self.has_node(node_id) {
            return Err(ModelError::DuplicateNode { node_id });
        }
        for table in &attrs.tables {
            if table.kind().node_type() != node_type {
                return Err(ModelError::WrongTable {
                    table: table.kind().to_string(),
                    node_type,
                });
            }
        }
        let node = Node {
            node_id,
            node_type,
            geometry,
            name: attrs.name,
            subnetwork_id: attrs.subnetwork_id,
            meta_categorie: attrs.meta_categorie,
            meta_code_waterbeheerder: attrs.meta_code_waterbeheerder,
            meta_function: attrs.meta_function,
            meta: attrs.meta,
        };
        self.insert_node(node)?;
        self.insert_rows(node_type, node_id, attrs.tables)?;
        debug!(%node_id, %node_type, "added node");
        Ok(node_id)
    }

    /// Insert supplied rows (re-keyed on `node_id`), filling tables without
    /// rows with placeholders.
    pub(crate) fn insert_rows(
        &mut self,
        node_type: NodeType,
        node_id: NodeId,
        tables: Vec<Table>,
    ) -> ModelResult<()> {
        let supplied: Vec<TableKind> = tables.iter().map(Table::kind).collect();
        for mut table in tables {
            table.set_node_ids(node_id);
            self.update_table(table)?;
        }
        for table in default_tables(node_type, node_id) {
            if !supplied.contains(&table.kind()) {
                self.update_table(table)?;
            }
        }
        Ok(())
    }

    /// Add a link between two existing nodes.
    ///
    /// Without a geometry the straight line between both nodes is used.
    pub fn add_link(
        &mut self,
        from_node_id: NodeId,
        to_node_id: NodeId,
        attrs: LinkAttrs,
    ) -> ModelResult<LinkId> {
        let from = self.node(from_node_id)?.geometry;
        let to = self.node(to_node_id)?.geometry;
        if from_node_id == to_node_id && attrs.link_type == LinkType::Flow {
            return Err(ModelError::SelfLoop {
                node_id: from_node_id,
            });
        }
        if self.links.values().any(|l| {
            l.from_node_id == from_node_id && l.to_node_id == to_node_id && l.link_type == attrs.link_type
        }) {
            return Err(ModelError::invalid(format!(
                "{} link {from_node_id} -> {to_node_id} already exists",
                attrs.link_type
            )));
        }
        let link_id = match attrs.link_id {
            Some(id) => id,
            None => self.next_link_id()?,
        };
        let geometry = attrs
            .geometry
            .unwrap_or_else(|| LineString::from(vec![from.0, to.0]));
        let mut link = Link::new(link_id, from_node_id, to_node_id, geometry);
        link.link_type = attrs.link_type;
        link.name = attrs.name;
        link.meta_categorie = attrs.meta_categorie;
        link.meta = attrs.meta;
        self.insert_link(link)?;
        debug!(%link_id, %from_node_id, %to_node_id, "added link");
        Ok(link_id)
    }
}
