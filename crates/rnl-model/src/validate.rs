//! Topology checks on the node and link tables.
//!
//! Checks never fail on bad data: they return the offending rows, and
//! [`NetworkValidator::report`] collects them all.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use geo::{Distance, Euclidean, Point};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use rnl_core::{LinkId, NodeId};
use rnl_gpkg::{GeoPackage, GeometryType, Layer};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ModelResult;
use crate::io::Frames;
use crate::model::{DEFAULT_LINK_TOLERANCE, Model};
use crate::node::{Link, Node};
use crate::node_type::NodeType;
use crate::tables::BasinArea;

/// Link node-type pairs the solver does not accept.
pub const DISALLOWED_CONNECTIVITY: [(NodeType, NodeType); 2] = [
    (NodeType::ManningResistance, NodeType::LevelBoundary),
    (NodeType::LevelBoundary, NodeType::ManningResistance),
];

pub struct NetworkValidator {
    frames: Frames,
    /// Basins with a `Basin / area` row, when areas are known.
    basins_with_area: Option<BTreeSet<NodeId>>,
    tolerance: f64,
}

/// Ids of the offending rows per check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub node_overlapping: Vec<NodeId>,
    pub node_duplicated: Vec<NodeId>,
    pub node_internal_basin: Vec<NodeId>,
    pub basin_area_missing: Vec<NodeId>,
    pub link_duplicated: Vec<LinkId>,
    pub link_missing_nodes: Vec<LinkId>,
    pub link_incorrect_from_node: Vec<LinkId>,
    pub link_incorrect_to_node: Vec<LinkId>,
    pub link_incorrect_connectivity: Vec<LinkId>,
    pub link_incorrect_type_connectivity: Vec<LinkId>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.counts().values().all(|n| *n == 0)
    }

    /// Number of offending rows per check.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("node_overlapping", self.node_overlapping.len()),
            ("node_duplicated", self.node_duplicated.len()),
            ("node_internal_basin", self.node_internal_basin.len()),
            ("basin_area_missing", self.basin_area_missing.len()),
            ("link_duplicated", self.link_duplicated.len()),
            ("link_missing_nodes", self.link_missing_nodes.len()),
            ("link_incorrect_from_node", self.link_incorrect_from_node.len()),
            ("link_incorrect_to_node", self.link_incorrect_to_node.len()),
            ("link_incorrect_connectivity", self.link_incorrect_connectivity.len()),
            (
                "link_incorrect_type_connectivity",
                self.link_incorrect_type_connectivity.len(),
            ),
        ])
    }

    pub fn write_json(&self, path: &Path) -> ModelResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

impl NetworkValidator {
    pub fn new(model: &Model) -> Self {
        let basins_with_area = model
            .table::<BasinArea>()
            .iter()
            .map(|a| a.node_id)
            .collect();
        Self {
            frames: Frames::from_model(model),
            basins_with_area: Some(basins_with_area),
            tolerance: DEFAULT_LINK_TOLERANCE,
        }
    }

    /// Validate frames as read from a database, before they are loaded into
    /// a model.
    pub fn from_frames(frames: Frames) -> Self {
        Self {
            frames,
            basins_with_area: None,
            tolerance: DEFAULT_LINK_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn node_types(&self) -> BTreeMap<NodeId, NodeType> {
        self.frames
            .nodes
            .iter()
            .map(|n| (n.node_id, n.node_type))
            .collect()
    }

    fn node_points(&self) -> BTreeMap<NodeId, Point<f64>> {
        self.frames
            .nodes
            .iter()
            .map(|n| (n.node_id, n.geometry))
            .collect()
    }

    /// Nodes within `tolerance` of another node.
    pub fn node_overlapping(&self) -> Vec<&Node> {
        let nodes = &self.frames.nodes;
        let tree: RTree<GeomWithData<[f64; 2], usize>> = RTree::bulk_load(
            nodes
                .iter()
                .enumerate()
                .map(|(i, n)| GeomWithData::new([n.geometry.x(), n.geometry.y()], i))
                .collect(),
        );
        let radius = self.tolerance * self.tolerance;
        nodes
            .iter()
            .enumerate()
            .filter(|(i, node)| {
                tree.locate_within_distance([node.geometry.x(), node.geometry.y()], radius)
                    .any(|other| {
                        other.data != *i
                            && Euclidean::distance(&node.geometry, &nodes[other.data].geometry)
                                < self.tolerance
                    })
            })
            .map(|(_, node)| node)
            .collect()
    }

    /// Second and later rows sharing a node_id.
    pub fn node_duplicated(&self) -> Vec<&Node> {
        let mut seen = BTreeSet::new();
        self.frames
            .nodes
            .iter()
            .filter(|n| !seen.insert(n.node_id))
            .collect()
    }

    /// Basins without an outgoing link.
    pub fn node_internal_basin(&self) -> Vec<&Node> {
        let sources: BTreeSet<NodeId> = self.frames.links.iter().map(|l| l.from_node_id).collect();
        self.frames
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Basin && !sources.contains(&n.node_id))
            .collect()
    }

    pub fn basin_area_missing(&self) -> Vec<&Node> {
        let Some(with_area) = &self.basins_with_area else {
            return Vec::new();
        };
        self.frames
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Basin && !with_area.contains(&n.node_id))
            .collect()
    }

    /// All links sharing a (from, to) pair.
    pub fn link_duplicated(&self) -> Vec<&Link> {
        let mut counts: BTreeMap<(NodeId, NodeId), usize> = BTreeMap::new();
        for link in &self.frames.links {
            *counts.entry((link.from_node_id, link.to_node_id)).or_default() += 1;
        }
        self.frames
            .links
            .iter()
            .filter(|l| counts[&(l.from_node_id, l.to_node_id)] > 1)
            .collect()
    }

    pub fn link_missing_nodes(&self) -> Vec<&Link> {
        let types = self.node_types();
        self.frames
            .links
            .iter()
            .filter(|l| !types.contains_key(&l.from_node_id) || !types.contains_key(&l.to_node_id))
            .collect()
    }

    /// Links whose recorded from_node_type differs from the node table.
    pub fn link_incorrect_from_node(&self) -> Vec<&Link> {
        let types = self.node_types();
        self.frames
            .links
            .iter()
            .filter(|l| types.get(&l.from_node_id).copied() != l.from_node_type || l.from_node_type.is_none())
            .collect()
    }

    pub fn link_incorrect_to_node(&self) -> Vec<&Link> {
        let types = self.node_types();
        self.frames
            .links
            .iter()
            .filter(|l| types.get(&l.to_node_id).copied() != l.to_node_type || l.to_node_type.is_none())
            .collect()
    }

    /// Links whose first/last vertex is further than `tolerance` from the
    /// from/to node. Links with a missing endpoint count as incorrect.
    pub fn link_incorrect_connectivity(&self) -> Vec<&Link> {
        let points = self.node_points();
        self.frames
            .links
            .iter()
            .filter(|link| {
                let (Some(first), Some(last)) = (link.geometry.0.first(), link.geometry.0.last()) else {
                    return true;
                };
                let off = |node_id: &NodeId, vertex: &geo::Coord<f64>| match points.get(node_id) {
                    Some(p) => Euclidean::distance(p, &Point::from(*vertex)) > self.tolerance,
                    None => true,
                };
                off(&link.from_node_id, first) || off(&link.to_node_id, last)
            })
            .collect()
    }

    /// Links from `from` to `to` node types.
    pub fn link_incorrect_type_connectivity(&self, from: NodeType, to: NodeType) -> Vec<&Link> {
        let types = self.node_types();
        self.frames
            .links
            .iter()
            .filter(|l| {
                types.get(&l.from_node_id) == Some(&from) && types.get(&l.to_node_id) == Some(&to)
            })
            .collect()
    }

    pub fn report(&self) -> ValidationReport {
        let node_ids = |nodes: Vec<&Node>| nodes.iter().map(|n| n.node_id).collect();
        let link_ids = |links: Vec<&Link>| links.iter().map(|l| l.link_id).collect();
        let type_connectivity: Vec<&Link> = DISALLOWED_CONNECTIVITY
            .iter()
            .flat_map(|(from, to)| self.link_incorrect_type_connectivity(*from, *to))
            .collect();
        let report = ValidationReport {
            node_overlapping: node_ids(self.node_overlapping()),
            node_duplicated: node_ids(self.node_duplicated()),
            node_internal_basin: node_ids(self.node_internal_basin()),
            basin_area_missing: node_ids(self.basin_area_missing()),
            link_duplicated: link_ids(self.link_duplicated()),
            link_missing_nodes: link_ids(self.link_missing_nodes()),
            link_incorrect_from_node: link_ids(self.link_incorrect_from_node()),
            link_incorrect_to_node: link_ids(self.link_incorrect_to_node()),
            link_incorrect_connectivity: link_ids(self.link_incorrect_connectivity()),
            link_incorrect_type_connectivity: link_ids(type_connectivity),
        };
        for (check, count) in report.counts() {
            if count > 0 {
                warn!(check, count, "validation failed");
            }
        }
        if report.is_clean() {
            info!(nodes = self.frames.nodes.len(), links = self.frames.links.len(), "network is valid");
        }
        report
    }

    /// Write the offending rows of every failing check as layers named after
    /// the check.
    pub fn write_diagnostics(&self, gpkg: &mut GeoPackage, srs_id: i32) -> ModelResult<()> {
        let node_checks = [
            ("node_overlapping", self.node_overlapping()),
            ("node_duplicated", self.node_duplicated()),
            ("node_internal_basin", self.node_internal_basin()),
            ("basin_area_missing", self.basin_area_missing()),
        ];
        for (name, nodes) in node_checks {
            if nodes.is_empty() {
                continue;
            }
            let mut layer = Layer::new(name).with_geometry(GeometryType::Point, srs_id);
            for node in nodes {
                layer.push(node.to_feature()?);
            }
            layer.infer_columns();
            gpkg.write_layer(&layer)?;
        }
        let type_connectivity: Vec<&Link> = DISALLOWED_CONNECTIVITY
            .iter()
            .flat_map(|(from, to)| self.link_incorrect_type_connectivity(*from, *to))
            .collect();
        let link_checks = [
            ("link_duplicated", self.link_duplicated()),
            ("link_missing_nodes", self.link_missing_nodes()),
            ("link_incorrect_from_node", self.link_incorrect_from_node()),
            ("link_incorrect_to_node", self.link_incorrect_to_node()),
            ("link_incorrect_connectivity", self.link_incorrect_connectivity()),
            ("link_incorrect_type_connectivity", type_connectivity),
        ];
        for (name, links) in link_checks {
            if links.is_empty() {
                continue;
            }
            let mut layer = Layer::new(name).with_geometry(GeometryType::LineString, srs_id);
            for link in links {
                layer.push(link.to_feature()?);
            }
            layer.infer_columns();
            gpkg.write_layer(&layer)?;
        }
        Ok(())
    }
}
