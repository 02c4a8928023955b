//! Breadth-first traversal of the flow graph.

use std::collections::{BTreeSet, VecDeque};

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use rnl_core::{LinkId, NodeId};

use crate::error::ModelResult;
use crate::model::Model;
use crate::node_type::{NodeFunction, NodeType};

/// Neighbours of a node on one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Neighbours {
    None,
    One(NodeId),
    Many(Vec<NodeId>),
}

impl Neighbours {
    fn from_vec(mut ids: Vec<NodeId>) -> Self {
        ids.sort();
        ids.dedup();
        match ids.len() {
            0 => Neighbours::None,
            1 => Neighbours::One(ids[0]),
            _ => Neighbours::Many(ids),
        }
    }

    /// The single neighbour, if unique.
    pub fn single(&self) -> Option<NodeId> {
        match self {
            Neighbours::One(id) => Some(*id),
            _ => None,
        }
    }

    pub fn to_vec(&self) -> Vec<NodeId> {
        match self {
            Neighbours::None => Vec::new(),
            Neighbours::One(id) => vec![*id],
            Neighbours::Many(ids) => ids.clone(),
        }
    }
}

/// Where a traversal stops expanding. Stop nodes are still part of the result.
#[derive(Debug, Clone, Default)]
pub struct StopAt {
    /// Stop at inlets when walking upstream, at outlets when walking downstream.
    pub function: bool,
    pub node_type: Option<NodeType>,
    pub node_ids: BTreeSet<NodeId>,
}

impl StopAt {
    pub fn function() -> Self {
        Self {
            function: true,
            ..Self::default()
        }
    }

    pub fn node_type(node_type: NodeType) -> Self {
        Self {
            node_type: Some(node_type),
            ..Self::default()
        }
    }
}

/// Directed graph over flow links, keyed on node_id.
pub struct FlowGraph<'a> {
    model: &'a Model,
    graph: DiGraphMap<NodeId, LinkId>,
}

impl<'a> FlowGraph<'a> {
    pub fn new(model: &'a Model) -> Self {
        let mut graph = DiGraphMap::new();
        for node_id in model.node_ids() {
            graph.add_node(node_id);
        }
        for link in model.flow_links() {
            graph.add_edge(link.from_node_id, link.to_node_id, link.link_id);
        }
        Self { model, graph }
    }

    pub fn predecessors(&self, node_id: NodeId) -> Vec<NodeId> {
        self.graph
            .neighbors_directed(node_id, Direction::Incoming)
            .collect()
    }

    pub fn successors(&self, node_id: NodeId) -> Vec<NodeId> {
        self.graph
            .neighbors_directed(node_id, Direction::Outgoing)
            .collect()
    }

    fn halts(&self, node_id: NodeId, direction: Direction, stop: &StopAt) -> bool {
        let Ok(node) = self.model.node(node_id) else {
            return true;
        };
        if direction == Direction::Incoming && node.node_type == NodeType::LevelBoundary {
            return true;
        }
        let marker = match direction {
            Direction::Incoming => NodeFunction::Inlet,
            Direction::Outgoing => NodeFunction::Outlet,
        };
        (stop.function && node.meta_function == Some(marker))
            || stop.node_type == Some(node.node_type)
            || stop.node_ids.contains(&node_id)
    }

    /// All nodes reached from `node_id`, the start node included.
    pub fn walk(&self, node_id: NodeId, direction: Direction, stop: &StopAt) -> BTreeSet<NodeId> {
        let mut found = BTreeSet::from([node_id]);
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([node_id]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            for next in self.graph.neighbors_directed(current, direction) {
                if visited.contains(&next) {
                    continue;
                }
                found.insert(next);
                if !self.halts(next, direction, stop) {
                    queue.push_back(next);
                }
            }
        }
        found
    }
}

impl Model {
    pub fn flow_graph(&self) -> FlowGraph<'_> {
        FlowGraph::new(self)
    }

    pub fn upstream_node_id(&self, node_id: NodeId) -> ModelResult<Neighbours> {
        self.node(node_id)?;
        Ok(Neighbours::from_vec(
            self.flow_links()
                .filter(|l| l.to_node_id == node_id)
                .map(|l| l.from_node_id)
                .collect(),
        ))
    }

    pub fn downstream_node_id(&self, node_id: NodeId) -> ModelResult<Neighbours> {
        self.node(node_id)?;
        Ok(Neighbours::from_vec(
            self.flow_links()
                .filter(|l| l.from_node_id == node_id)
                .map(|l| l.to_node_id)
                .collect(),
        ))
    }

    /// Nodes upstream of `node_id`, including itself. LevelBoundary nodes
    /// are never expanded.
    pub fn upstream_nodes(&self, node_id: NodeId, stop: &StopAt) -> ModelResult<BTreeSet<NodeId>> {
        self.node(node_id)?;
        Ok(self.flow_graph().walk(node_id, Direction::Incoming, stop))
    }

    /// Nodes downstream of `node_id`, including itself.
    pub fn downstream_nodes(
        &self,
        node_id: NodeId,
        stop: &StopAt,
    ) -> ModelResult<BTreeSet<NodeId>> {
        self.node(node_id)?;
        Ok(self.flow_graph().walk(node_id, Direction::Outgoing, stop))
    }

    /// Basins upstream of `node_id`, excluding `node_id` itself.
    pub fn get_upstream_basins(&self, node_id: NodeId, stop: &StopAt) -> ModelResult<Vec<NodeId>> {
        let found = self.upstream_nodes(node_id, stop)?;
        Ok(self.basins_in(found, node_id))
    }

    /// Basins downstream of `node_id`, excluding `node_id` itself.
    pub fn get_downstream_basins(
        &self,
        node_id: NodeId,
        stop: &StopAt,
    ) -> ModelResult<Vec<NodeId>> {
        let found = self.downstream_nodes(node_id, stop)?;
        Ok(self.basins_in(found, node_id))
    }

    fn basins_in(&self, found: BTreeSet<NodeId>, start: NodeId) -> Vec<NodeId> {
        found
            .into_iter()
            .filter(|id| *id != start)
            .filter(|id| matches!(self.node_type(*id), Ok(NodeType::Basin)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinkAttrs;
    use crate::test_support::{add_basin, add_connector, id, two_basin_model};

    /// LB 10 -> Outlet 11 -> Basin 1 -> Pump 2 -> Basin 3 -> Outlet 4 -> Basin 5
    fn chain() -> Model {
        let mut model = two_basin_model();
        add_connector(&mut model, NodeType::LevelBoundary, 10, -20.0);
        add_connector(&mut model, NodeType::Outlet, 11, -10.0);
        add_connector(&mut model, NodeType::Outlet, 4, 30.0);
        add_basin(&mut model, 5, 40.0);
        for (a, b) in [(10, 11), (11, 1), (3, 4), (4, 5)] {
            model.add_link(id(a), id(b), LinkAttrs::default()).unwrap();
        }
        model
    }

    #[test]
    fn neighbours() {
        let model = chain();
        assert_eq!(model.upstream_node_id(id(2)).unwrap(), Neighbours::One(id(1)));
        assert_eq!(model.upstream_node_id(id(10)).unwrap(), Neighbours::None);
        let mut model = model;
        model.add_link(id(2), id(5), LinkAttrs::default()).unwrap();
        assert_eq!(
            model.downstream_node_id(id(2)).unwrap(),
            Neighbours::Many(vec![id(3), id(5)])
        );
    }

    #[test]
    fn upstream_walk_includes_start_and_stops_at_boundary() {
        let mut model = chain();
        // a node upstream of the LevelBoundary is never reached
        add_connector(&mut model, NodeType::FlowBoundary, 12, -30.0);
        model.add_link(id(12), id(10), LinkAttrs::default()).unwrap();
        let found = model.upstream_nodes(id(3), &StopAt::default()).unwrap();
        assert_eq!(found, BTreeSet::from([id(1), id(2), id(3), id(10), id(11)]));
    }

    #[test]
    fn upstream_walk_stops_at_inlet() {
        let mut model = chain();
        model.node_mut(id(2)).unwrap().meta_function = Some(NodeFunction::Inlet);
        let found = model.upstream_nodes(id(3), &StopAt::function()).unwrap();
        assert_eq!(found, BTreeSet::from([id(2), id(3)]));
        assert_eq!(model.get_upstream_basins(id(4), &StopAt::function()).unwrap(), vec![id(3)]);
    }

    #[test]
    fn downstream_walk_stops() {
        let model = chain();
        let all = model.downstream_nodes(id(1), &StopAt::default()).unwrap();
        assert_eq!(all.len(), 5);
        let basins = model
            .get_downstream_basins(id(1), &StopAt::node_type(NodeType::Basin))
            .unwrap();
        assert_eq!(basins, vec![id(3)]);
        let stop = StopAt {
            node_ids: BTreeSet::from([id(3)]),
            ..StopAt::default()
        };
        assert!(!model.downstream_nodes(id(1), &stop).unwrap().contains(&id(5)));
    }
}
