//! The `Network` container: frames, graphs and editing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use geo::{Intersects, LineString, Point, Polygon};
use petgraph::graph::{DiGraph, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rnl_geometry::{project, split_line_at_distance};
use tracing::debug;

use crate::build::build;
use crate::error::{NetworkError, NetworkResult};
use crate::spatial::SpatialIndex;
use crate::types::{InputLine, NetworkLink, NetworkNode, NetworkNodeType, NetworkOptions};

/// Routing network built from line geometries.
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub(crate) nodes: BTreeMap<u32, NetworkNode>,
    pub(crate) links: BTreeMap<u32, NetworkLink>,
    pub(crate) options: NetworkOptions,
    /// Directed graph; node weights are node ids, edge weights link ids.
    pub(crate) directed: DiGraph<u32, u32>,
    /// Undirected projection; edge weights are (link id, length).
    pub(crate) undirected: UnGraph<u32, (u32, f64)>,
    pub(crate) index: HashMap<u32, NodeIndex>,
    spatial: SpatialIndex,
}

impl Network {
    /// Build a network from input lines.
    pub fn from_lines(lines: &[InputLine], options: NetworkOptions) -> NetworkResult<Self> {
        if !(options.tolerance >= 0.0) {
            return Err(NetworkError::InvalidInput {
                what: format!("tolerance must be >= 0, got {}", options.tolerance),
            });
        }
        let (nodes, links) = build(lines, options.tolerance)?;
        let mut network = Self {
            nodes,
            links,
            options,
            ..Self::default()
        };
        network.rebuild_graphs();
        Ok(network)
    }

    /// Assemble a network from existing frames (e.g. read from file).
    pub fn from_frames(
        nodes: BTreeMap<u32, NetworkNode>,
        links: BTreeMap<u32, NetworkLink>,
        options: NetworkOptions,
    ) -> NetworkResult<Self> {
        for link in links.values() {
            for id in [link.node_from, link.node_to] {
                if !nodes.contains_key(&id) {
                    return Err(NetworkError::NodeNotFound(id));
                }
            }
        }
        let mut network = Self {
            nodes,
            links,
            options,
            ..Self::default()
        };
        network.rebuild_graphs();
        Ok(network)
    }

    pub(crate) fn rebuild_graphs(&mut self) {
        let mut directed = DiGraph::with_capacity(self.nodes.len(), self.links.len());
        let mut undirected = UnGraph::with_capacity(self.nodes.len(), self.links.len());
        let mut index = HashMap::with_capacity(self.nodes.len());
        for id in self.nodes.keys() {
            let d = directed.add_node(*id);
            let u = undirected.add_node(*id);
            debug_assert_eq!(d, u);
            index.insert(*id, d);
        }
        for link in self.links.values() {
            let (Some(&a), Some(&b)) = (index.get(&link.node_from), index.get(&link.node_to)) else {
                continue;
            };
            directed.add_edge(a, b, link.id);
            undirected.add_edge(a, b, (link.id, link.length()));
        }
        self.directed = directed;
        self.undirected = undirected;
        self.index = index;
        self.spatial = SpatialIndex::build(&self.nodes, &self.links);
    }

    fn retype_nodes(&mut self) {
        let mut in_degree: HashMap<u32, usize> = HashMap::new();
        let mut out_degree: HashMap<u32, usize> = HashMap::new();
        for link in self.links.values() {
            *out_degree.entry(link.node_from).or_default() += 1;
            *in_degree.entry(link.node_to).or_default() += 1;
        }
        for node in self.nodes.values_mut() {
            node.node_type = NetworkNodeType::from_degree(
                in_degree.get(&node.id).copied().unwrap_or(0),
                out_degree.get(&node.id).copied().unwrap_or(0),
            );
        }
    }

    fn refresh(&mut self) {
        self.retype_nodes();
        self.rebuild_graphs();
    }

    pub fn tolerance(&self) -> f64 {
        self.options.tolerance
    }

    pub fn options(&self) -> &NetworkOptions {
        &self.options
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NetworkNode> {
        self.nodes.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &NetworkLink> {
        self.links.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn node(&self, id: u32) -> NetworkResult<&NetworkNode> {
        self.nodes.get(&id).ok_or(NetworkError::NodeNotFound(id))
    }

    pub fn link(&self, id: u32) -> NetworkResult<&NetworkLink> {
        self.links.get(&id).ok_or(NetworkError::LinkNotFound(id))
    }

    pub fn directed_graph(&self) -> &DiGraph<u32, u32> {
        &self.directed
    }

    pub fn undirected_graph(&self) -> &UnGraph<u32, (u32, f64)> {
        &self.undirected
    }

    pub(crate) fn node_index(&self, id: u32) -> NetworkResult<NodeIndex> {
        self.index
            .get(&id)
            .copied()
            .ok_or(NetworkError::NodeNotFound(id))
    }

    /// Links starting or ending at a node.
    pub fn incident_links(&self, node_id: u32) -> Vec<&NetworkLink> {
        self.links
            .values()
            .filter(|l| l.node_from == node_id || l.node_to == node_id)
            .collect()
    }

    /// Closest node to a point, optionally restricted to node types; ties go
    /// to the lowest node id.
    pub fn nearest_node(
        &self,
        point: Point<f64>,
        node_types: Option<&[NetworkNodeType]>,
    ) -> Option<(u32, f64)> {
        let mut candidates = self.spatial.nodes_by_distance(point).filter(|(id, _)| {
            node_types.is_none_or(|types| {
                self.nodes
                    .get(id)
                    .is_some_and(|n| types.contains(&n.node_type))
            })
        });
        let (first, d2) = candidates.next()?;
        let id = candidates
            .take_while(|(_, other)| *other <= d2)
            .fold(first, |lowest, (id, _)| lowest.min(id));
        Some((id, d2.sqrt()))
    }

    /// Closest link to a point; ties go to the lowest link id.
    pub fn nearest_link(&self, point: Point<f64>) -> Option<(u32, f64)> {
        let mut best: Option<(u32, f64)> = None;
        for (link_id, envelope_d2) in self.spatial.links_by_distance(point) {
            if best.is_some_and(|(_, d)| envelope_d2 > d * d) {
                break;
            }
            let Some(projection) = self.links.get(&link_id).and_then(|l| project(&l.geometry, point)) else {
                continue;
            };
            let closer = best.is_none_or(|(id, d)| {
                projection.offset < d || (projection.offset == d && link_id < id)
            });
            if closer {
                best = Some((link_id, projection.offset));
            }
        }
        best
    }

    fn next_node_id(&self) -> u32 {
        self.nodes.keys().next_back().map_or(1, |id| id + 1)
    }

    fn next_link_id(&self) -> u32 {
        self.links.keys().next_back().map_or(1, |id| id + 1)
    }

    /// Insert a node on the nearest link within `max_distance`.
    ///
    /// When an existing node lies within `align_distance` of the projected
    /// point its id is returned and nothing changes. Otherwise the link is
    /// split at the projection and the id of the new node is returned.
    /// Returns `None` when no link lies within `max_distance`.
    pub fn add_node(
        &mut self,
        point: Point<f64>,
        max_distance: f64,
        align_distance: f64,
    ) -> NetworkResult<Option<u32>> {
        let Some((link_id, offset)) = self.nearest_link(point) else {
            return Ok(None);
        };
        if offset > max_distance {
            return Ok(None);
        }
        let link = self.link(link_id)?.clone();
        let Some(projection) = project(&link.geometry, point) else {
            return Ok(None);
        };
        if let Some((existing, distance)) = self.nearest_node(projection.point, None)
            && distance <= align_distance
        {
            return Ok(Some(existing));
        }
        if projection.distance_along <= 0.0 {
            return Ok(Some(link.node_from));
        }
        if projection.distance_along >= link.length() {
            return Ok(Some(link.node_to));
        }

        let (upstream, downstream) =
            split_line_at_distance(&link.geometry, projection.distance_along)?;
        let node_id = self.next_node_id();
        let new_link_id = self.next_link_id();
        let node = NetworkNode {
            id: node_id,
            point: projection.point,
            node_type: NetworkNodeType::from_degree(1, 1),
        };
        let first = NetworkLink {
            node_to: node_id,
            geometry: upstream,
            ..link.clone()
        };
        let second = NetworkLink {
            id: new_link_id,
            node_from: node_id,
            node_to: link.node_to,
            geometry: downstream,
            attributes: link.attributes.clone(),
        };
        self.split_link(&link, node, first, second)?;
        debug!(node_id, link_id, new_link_id, "added network node");
        Ok(Some(node_id))
    }

    /// Move the nearest node of an allowed type within `max_distance` to
    /// `point` and return its id.
    ///
    /// Vertices of incident links within `align_distance` of the new location
    /// are dropped so the links join the moved node directly.
    pub fn move_node(
        &mut self,
        point: Point<f64>,
        max_distance: f64,
        align_distance: f64,
        node_types: Option<&[NetworkNodeType]>,
    ) -> NetworkResult<Option<u32>> {
        let types = node_types.unwrap_or(&NetworkNodeType::MOVABLE);
        let Some((node_id, distance)) = self.nearest_node(point, Some(types)) else {
            return Ok(None);
        };
        if distance > max_distance {
            return Ok(None);
        }
        if let Some(node) = self.nodes.get_mut(&node_id) {
            self.spatial.remove_node(node);
            node.point = point;
            self.spatial.insert_node(node);
        }
        for link in self.links.values_mut() {
            if link.node_from != node_id && link.node_to != node_id {
                continue;
            }
            self.spatial.remove_link(link);
            if link.node_from == node_id {
                let mut coords = link.geometry.0.clone();
                coords.reverse();
                let mut aligned = realign_end(coords, point, align_distance);
                aligned.reverse();
                link.geometry = LineString::from(aligned);
            }
            if link.node_to == node_id {
                let aligned = realign_end(link.geometry.0.clone(), point, align_distance);
                link.geometry = LineString::from(aligned);
            }
            self.spatial.insert_link(link);
        }
        self.update_lengths(node_id)?;
        debug!(node_id, "moved network node");
        Ok(Some(node_id))
    }

    /// Replace `old` by `first` (same id) and `second`, joined at `node`.
    fn split_link(
        &mut self,
        old: &NetworkLink,
        node: NetworkNode,
        first: NetworkLink,
        second: NetworkLink,
    ) -> NetworkResult<()> {
        let from = self.node_index(old.node_from)?;
        let to = self.node_index(old.node_to)?;
        let d = self.directed.add_node(node.id);
        let u = self.undirected.add_node(node.id);
        debug_assert_eq!(d, u);
        self.index.insert(node.id, d);
        if let Some(edge) = self
            .directed
            .edges_connecting(from, to)
            .find(|e| *e.weight() == old.id)
            .map(|e| e.id())
        {
            self.directed.remove_edge(edge);
        }
        if let Some(edge) = self
            .undirected
            .edges_connecting(from, to)
            .find(|e| e.weight().0 == old.id)
            .map(|e| e.id())
        {
            self.undirected.remove_edge(edge);
        }
        self.directed.add_edge(from, d, first.id);
        self.directed.add_edge(d, to, second.id);
        self.undirected.add_edge(from, d, (first.id, first.length()));
        self.undirected.add_edge(d, to, (second.id, second.length()));

        self.spatial.remove_link(old);
        self.spatial.insert_node(&node);
        self.spatial.insert_link(&first);
        self.spatial.insert_link(&second);
        self.nodes.insert(node.id, node);
        self.links.insert(first.id, first);
        self.links.insert(second.id, second);
        Ok(())
    }

    /// Refresh the undirected edge lengths of the links at a node.
    fn update_lengths(&mut self, node_id: u32) -> NetworkResult<()> {
        let index = self.node_index(node_id)?;
        let edges: Vec<_> = self.undirected.edges(index).map(|e| e.id()).collect();
        for edge in edges {
            if let Some(weight) = self.undirected.edge_weight_mut(edge)
                && let Some(link) = self.links.get(&weight.0)
            {
                weight.1 = link.length();
            }
        }
        Ok(())
    }

    /// Reverse the direction of a link.
    pub fn reverse_link(&mut self, link_id: u32) -> NetworkResult<()> {
        let link = self
            .links
            .get_mut(&link_id)
            .ok_or(NetworkError::LinkNotFound(link_id))?;
        std::mem::swap(&mut link.node_from, &mut link.node_to);
        link.geometry.0.reverse();
        self.refresh();
        Ok(())
    }

    /// Orient a link so it starts at `node_from`.
    pub fn set_direction(&mut self, link_id: u32, node_from: u32) -> NetworkResult<()> {
        let link = self.link(link_id)?;
        if link.node_from == node_from {
            return Ok(());
        }
        if link.node_to != node_from {
            return Err(NetworkError::NotAdjacent(node_from, link.node_to));
        }
        self.reverse_link(link_id)
    }

    /// Reverse every link touching a node.
    pub fn reverse_direction_at_node(&mut self, node_id: u32) -> NetworkResult<Vec<u32>> {
        self.node(node_id)?;
        let ids: Vec<u32> = self
            .incident_links(node_id)
            .iter()
            .map(|l| l.id)
            .collect();
        for link in self.links.values_mut() {
            if ids.contains(&link.id) {
                std::mem::swap(&mut link.node_from, &mut link.node_to);
                link.geometry.0.reverse();
            }
        }
        self.refresh();
        Ok(ids)
    }

    /// Ids of nodes within (or on the boundary of) a polygon.
    pub fn nodes_within(&self, polygon: &Polygon<f64>) -> Vec<u32> {
        self.nodes
            .values()
            .filter(|n| polygon.intersects(&n.point))
            .map(|n| n.id)
            .collect()
    }

    /// Network restricted to the given nodes and the links between them.
    pub fn subgraph(&self, node_ids: &BTreeSet<u32>) -> Network {
        let nodes = self
            .nodes
            .iter()
            .filter(|(id, _)| node_ids.contains(id))
            .map(|(id, n)| (*id, n.clone()))
            .collect();
        let links = self
            .links
            .iter()
            .filter(|(_, l)| node_ids.contains(&l.node_from) && node_ids.contains(&l.node_to))
            .map(|(id, l)| (*id, l.clone()))
            .collect();
        let mut network = Network {
            nodes,
            links,
            options: self.options.clone(),
            ..Network::default()
        };
        network.refresh();
        network
    }
}

/// Replace the end of `coords` with `point`, dropping trailing vertices
/// within `align_distance` of it (the first vertex is always kept).
fn realign_end(
    mut coords: Vec<geo::Coord<f64>>,
    point: Point<f64>,
    align_distance: f64,
) -> Vec<geo::Coord<f64>> {
    coords.pop();
    while coords.len() > 1 {
        let Some(last) = coords.last() else {
            break;
        };
        if (last.x - point.x()).hypot(last.y - point.y()) < align_distance {
            coords.pop();
        } else {
            break;
        }
    }
    coords.push(point.0);
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight() -> Network {
        Network::from_lines(
            &[InputLine::new(LineString::from(vec![(0.0, 0.0), (100.0, 0.0)]))],
            NetworkOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn add_node_splits_link() {
        let mut network = straight();
        let id = network.add_node(Point::new(40.0, 3.0), 5.0, 1.0).unwrap();
        assert_eq!(id, Some(3));
        assert_eq!(network.link_count(), 2);
        assert_eq!(network.node(3).unwrap().point, Point::new(40.0, 0.0));
        assert_eq!(network.link(1).unwrap().node_to, 3);
        assert_eq!(network.link(2).unwrap().node_from, 3);
    }

    #[test]
    fn add_node_aligns_to_existing_node() {
        let mut network = straight();
        assert_eq!(network.add_node(Point::new(99.5, 1.0), 5.0, 1.0).unwrap(), Some(2));
        assert_eq!(network.node_count(), 2);
    }

    #[test]
    fn add_node_beyond_max_distance_is_none() {
        let mut network = straight();
        assert_eq!(network.add_node(Point::new(50.0, 20.0), 5.0, 1.0).unwrap(), None);
    }

    #[test]
    fn equidistant_point_snaps_to_lowest_link() {
        let mut network = Network::from_lines(
            &[
                InputLine::new(LineString::from(vec![(0.0, 0.0), (100.0, 0.0)])),
                InputLine::new(LineString::from(vec![(0.0, 10.0), (100.0, 10.0)])),
            ],
            NetworkOptions::default(),
        )
        .unwrap();
        assert_eq!(network.nearest_link(Point::new(50.0, 5.0)).map(|l| l.0), Some(1));
        let id = network.add_node(Point::new(50.0, 5.0), 6.0, 1.0).unwrap().unwrap();
        assert_eq!(network.node(id).unwrap().point, Point::new(50.0, 0.0));
    }

    #[test]
    fn move_node_realigns_links() {
        let mut network = Network::from_lines(
            &[InputLine::new(LineString::from(vec![
                (0.0, 0.0),
                (50.0, 0.0),
                (99.0, 0.0),
                (100.0, 0.0),
            ]))],
            NetworkOptions::default(),
        )
        .unwrap();
        let id = network.move_node(Point::new(100.0, 0.4), 0.5, 10.0, None).unwrap();
        assert_eq!(id, Some(2));
        let link = network.link(1).unwrap();
        assert_eq!(
            link.geometry,
            LineString::from(vec![(0.0, 0.0), (50.0, 0.0), (100.0, 0.4)])
        );
    }

    #[test]
    fn reversing_updates_types() {
        let mut network = straight();
        network.reverse_link(1).unwrap();
        assert_eq!(network.node(2).unwrap().node_type, NetworkNodeType::UpstreamBoundary);
        network.set_direction(1, 1).unwrap();
        assert_eq!(network.link(1).unwrap().node_from, 1);
        assert!(network.set_direction(1, 7).is_err());
    }

    #[test]
    fn repeated_inserts_keep_the_index_current() {
        let mut network = Network::from_lines(
            &[InputLine::new(LineString::from(vec![(0.0, 0.0), (1000.0, 0.0)]))],
            NetworkOptions::default(),
        )
        .unwrap();
        for i in 1..100 {
            let id = network.add_node(Point::new(i as f64 * 10.0, 2.0), 5.0, 1.0).unwrap();
            assert_eq!(id, Some(i + 2));
        }
        assert_eq!(network.link_count(), 100);
        let (nearest, distance) = network.nearest_node(Point::new(503.0, 1.0), None).unwrap();
        assert_eq!(nearest, 52);
        assert!((distance - 10.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(network.nearest_link(Point::new(505.0, 3.0)).map(|l| l.0), Some(51));

        let path = network.shortest_path(1, 2).unwrap();
        assert_eq!(path.len(), 101);
        let rebuilt = Network::from_frames(
            network.nodes.clone(),
            network.links.clone(),
            NetworkOptions::default(),
        )
        .unwrap();
        assert_eq!(rebuilt.shortest_path(1, 2).unwrap(), path);

        assert_eq!(network.move_node(Point::new(500.0, 1.0), 1.5, 0.0, None).unwrap(), Some(52));
        assert_eq!(network.nearest_node(Point::new(500.0, 30.0), None).map(|n| n.0), Some(52));
    }
}
