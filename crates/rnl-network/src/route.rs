//! Routing queries on the network graphs.

use std::collections::{BTreeSet, VecDeque};

use geo::{Coord, LineString};
use petgraph::Direction;
use petgraph::algo::astar;
use petgraph::visit::EdgeRef;

use crate::error::{NetworkError, NetworkResult};
use crate::network::Network;

impl Network {
    /// Node ids along the shortest path (by link length) in the undirected
    /// projection of the graph.
    pub fn shortest_path(&self, source: u32, target: u32) -> NetworkResult<Vec<u32>> {
        let start = self.node_index(source)?;
        let goal = self.node_index(target)?;
        let (_, path) = astar(
            &self.undirected,
            start,
            |n| n == goal,
            |e| e.weight().1,
            |_| 0.0,
        )
        .ok_or(NetworkError::NoPath {
            source_id: source,
            target_id: target,
        })?;
        Ok(path.into_iter().map(|i| self.undirected[i]).collect())
    }

    /// LineString along the shortest path between two nodes.
    pub fn get_line(&self, source: u32, target: u32) -> NetworkResult<LineString<f64>> {
        let path = self.shortest_path(source, target)?;
        self.path_to_line(&path)
    }

    /// Join the links along a node sequence into one LineString, reversing
    /// link geometries where needed so consecutive pieces connect.
    pub fn path_to_line(&self, path: &[u32]) -> NetworkResult<LineString<f64>> {
        let mut coords: Vec<Coord<f64>> = Vec::new();
        for pair in path.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a == b {
                continue;
            }
            let link = self
                .links
                .values()
                .filter(|l| l.other(a) == Some(b))
                .min_by(|x, y| x.length().total_cmp(&y.length()))
                .ok_or(NetworkError::NotAdjacent(a, b))?;
            let mut piece = link.geometry.0.clone();
            if link.node_from != a {
                piece.reverse();
            }
            let skip = usize::from(!coords.is_empty());
            coords.extend(piece.into_iter().skip(skip));
        }
        if coords.is_empty()
            && let Some(id) = path.first()
        {
            let point = self.node(*id)?.point;
            coords = vec![point.0, point.0];
        }
        Ok(LineString::from(coords))
    }

    fn traverse(&self, node_id: u32, direction: Direction) -> NetworkResult<Vec<u32>> {
        let start = self.node_index(node_id)?;
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut found = Vec::new();
        while let Some(current) = queue.pop_front() {
            for edge in self.directed.edges_directed(current, direction) {
                let next = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                if seen.insert(next) {
                    found.push(self.directed[next]);
                    queue.push_back(next);
                }
            }
        }
        Ok(found)
    }

    /// All nodes reachable following link direction.
    pub fn downstream_nodes(&self, node_id: u32) -> NetworkResult<Vec<u32>> {
        self.traverse(node_id, Direction::Outgoing)
    }

    /// All nodes from which `node_id` is reachable.
    pub fn upstream_nodes(&self, node_id: u32) -> NetworkResult<Vec<u32>> {
        self.traverse(node_id, Direction::Incoming)
    }
}

#[cfg(test)]
mod tests {
    use crate::{InputLine, Network, NetworkError, NetworkOptions};
    use geo::LineString;

    fn y_network() -> Network {
        Network::from_lines(
            &[
                InputLine::new(LineString::from(vec![(0.0, 0.0), (10.0, 0.0)])),
                InputLine::new(LineString::from(vec![(20.0, 0.0), (10.0, 0.0)])),
                InputLine::new(LineString::from(vec![(10.0, 0.0), (10.0, 5.0), (10.0, 10.0)])),
                InputLine::new(LineString::from(vec![(50.0, 0.0), (60.0, 0.0)])),
            ],
            NetworkOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn line_ignores_direction() {
        let network = y_network();
        // node ids: 1 (0,0), 2 (10,0), 3 (20,0), 4 (10,10)
        let line = network.get_line(3, 4).unwrap();
        assert_eq!(
            line,
            LineString::from(vec![(20.0, 0.0), (10.0, 0.0), (10.0, 5.0), (10.0, 10.0)])
        );
    }

    #[test]
    fn disconnected_nodes_have_no_path() {
        let network = y_network();
        assert!(matches!(
            network.get_line(1, 5),
            Err(NetworkError::NoPath { source_id: 1, target_id: 5 })
        ));
    }

    #[test]
    fn traversal_follows_direction() {
        let network = y_network();
        assert_eq!(network.downstream_nodes(1).unwrap(), vec![2, 4]);
        let mut upstream = network.upstream_nodes(4).unwrap();
        upstream.sort();
        assert_eq!(upstream, vec![1, 2, 3]);
    }

    #[test]
    fn path_to_line_requires_adjacency() {
        let network = y_network();
        assert!(matches!(
            network.path_to_line(&[1, 4]),
            Err(NetworkError::NotAdjacent(1, 4))
        ));
    }
}
