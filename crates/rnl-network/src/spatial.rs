//! R-tree over network nodes and link envelopes.

use std::collections::BTreeMap;

use geo::{BoundingRect, Point};
use rstar::RTree;
use rstar::primitives::{GeomWithData, Rectangle};

use crate::types::{NetworkLink, NetworkNode};

type NodeEntry = GeomWithData<[f64; 2], u32>;
type LinkEntry = GeomWithData<Rectangle<[f64; 2]>, u32>;

#[derive(Debug, Clone, Default)]
pub(crate) struct SpatialIndex {
    nodes: RTree<NodeEntry>,
    links: RTree<LinkEntry>,
}

fn node_entry(node: &NetworkNode) -> NodeEntry {
    GeomWithData::new([node.point.x(), node.point.y()], node.id)
}

fn link_entry(link: &NetworkLink) -> Option<LinkEntry> {
    let r = link.geometry.bounding_rect()?;
    Some(GeomWithData::new(
        Rectangle::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]),
        link.id,
    ))
}

impl SpatialIndex {
    pub(crate) fn build(nodes: &BTreeMap<u32, NetworkNode>, links: &BTreeMap<u32, NetworkLink>) -> Self {
        Self {
            nodes: RTree::bulk_load(nodes.values().map(node_entry).collect()),
            links: RTree::bulk_load(links.values().filter_map(link_entry).collect()),
        }
    }

    pub(crate) fn insert_node(&mut self, node: &NetworkNode) {
        self.nodes.insert(node_entry(node));
    }

    pub(crate) fn remove_node(&mut self, node: &NetworkNode) {
        self.nodes.remove(&node_entry(node));
    }

    pub(crate) fn insert_link(&mut self, link: &NetworkLink) {
        if let Some(entry) = link_entry(link) {
            self.links.insert(entry);
        }
    }

    /// Remove a link as it was inserted, i.e. with its old geometry.
    pub(crate) fn remove_link(&mut self, link: &NetworkLink) {
        if let Some(entry) = link_entry(link) {
            self.links.remove(&entry);
        }
    }

    /// Node ids with their squared distance to `point`, nearest first.
    pub(crate) fn nodes_by_distance(&self, point: Point<f64>) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.nodes
            .nearest_neighbor_iter_with_distance_2(&[point.x(), point.y()])
            .map(|(entry, d2)| (entry.data, d2))
    }

    /// Link ids with the squared distance from `point` to their envelope,
    /// nearest first. The envelope distance never exceeds the link distance.
    pub(crate) fn links_by_distance(&self, point: Point<f64>) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.links
            .nearest_neighbor_iter_with_distance_2(&[point.x(), point.y()])
            .map(|(entry, d2)| (entry.data, d2))
    }
}
