//! Redraw Basin links along the hydro-object network.

use geo::{Coord, Distance, Euclidean, LineString, Point};
use rnl_core::{LinkId, NodeId};
use rnl_geometry::{edge, line_length};
use rnl_model::{Model, NodeType};
use rnl_network::Network;
use tracing::{debug, info};

use crate::error::ParamResult;

/// Settings of [`fix_link_geometries`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkGeometryOptions {
    /// Search radius when moving an existing network node onto a model node.
    pub move_distance: f64,
    /// Search radius when inserting a network node on the nearest link.
    pub add_distance: f64,
    pub align_distance: f64,
    /// Paths longer than this multiple of the straight distance are dropped.
    pub max_straight_line_ratio: f64,
}

impl Default for LinkGeometryOptions {
    fn default() -> Self {
        Self {
            move_distance: 0.5,
            add_distance: 5.0,
            align_distance: 10.0,
            max_straight_line_ratio: 5.0,
        }
    }
}

fn network_node(network: &mut Network, point: Point<f64>, options: &LinkGeometryOptions) -> ParamResult<Option<u32>> {
    if let Some(id) = network.move_node(point, options.move_distance, options.align_distance, None)? {
        return Ok(Some(id));
    }
    Ok(network.add_node(point, options.add_distance, options.align_distance)?)
}

/// Path between two network nodes that avoids `forbidden`; `None` when there
/// is none or it degenerates.
fn routed_line(network: &Network, source: u32, target: u32, forbidden: &[u32]) -> Option<LineString<f64>> {
    let path = network.shortest_path(source, target).ok()?;
    if path.iter().any(|id| forbidden.contains(id)) {
        return None;
    }
    let line = network.path_to_line(&path).ok()?;
    (line_length(&line) > 0.0).then_some(line)
}

fn anchored(mut line: LineString<f64>, from: Point<f64>, to: Point<f64>) -> LineString<f64> {
    if let Some(first) = line.0.first_mut() {
        *first = Coord::from(from);
    }
    if let Some(last) = line.0.last_mut() {
        *last = Coord::from(to);
    }
    line
}

struct Candidate {
    link_id: LinkId,
    model_node: NodeId,
    network_node: u32,
    outgoing: bool,
}

/// Redraw every flow link touching a Basin along the shortest network path
/// between the network nodes of both ends.
///
/// Network nodes are found by moving a nearby node onto the model node, else
/// by inserting one on the nearest network link. Links whose ends have no
/// network node keep their geometry. The straight line is used when no path
/// exists, when the path runs through the network node of another neighbour
/// of the Basin, or when it is longer than `max_straight_line_ratio` times
/// the straight distance. Returns the number of routed links.
pub fn fix_link_geometries(
    model: &mut Model,
    network: &mut Network,
    options: &LinkGeometryOptions,
) -> ParamResult<usize> {
    let mut routed = 0;
    for basin_id in model.node_ids_of_type(NodeType::Basin) {
        let basin_point = model.node(basin_id)?.geometry;
        let Some(basin_node) = network_node(network, basin_point, options)? else {
            debug!(%basin_id, "basin not on network");
            continue;
        };

        let mut candidates = Vec::new();
        let neighbours = model
            .incoming_links(basin_id)
            .into_iter()
            .filter(|l| l.is_flow())
            .map(|l| (l.link_id, l.from_node_id, false))
            .chain(
                model
                    .outgoing_links(basin_id)
                    .into_iter()
                    .filter(|l| l.is_flow())
                    .map(|l| (l.link_id, l.to_node_id, true)),
            )
            .collect::<Vec<_>>();
        for (link_id, model_node, outgoing) in neighbours {
            let point = model.node(model_node)?.geometry;
            if let Some(network_node) = network_node(network, point, options)? {
                candidates.push(Candidate {
                    link_id,
                    model_node,
                    network_node,
                    outgoing,
                });
            }
        }

        for candidate in &candidates {
            let forbidden: Vec<u32> = candidates
                .iter()
                .map(|c| c.network_node)
                .filter(|id| *id != candidate.network_node)
                .collect();
            let (source, target) = if candidate.outgoing {
                (basin_node, candidate.network_node)
            } else {
                (candidate.network_node, basin_node)
            };
            let other = model.node(candidate.model_node)?.geometry;
            let (from, to) = if candidate.outgoing {
                (basin_point, other)
            } else {
                (other, basin_point)
            };
            let straight = Euclidean::distance(&from, &to);
            let geometry = match routed_line(network, source, target, &forbidden) {
                Some(line) if line_length(&line) <= options.max_straight_line_ratio * straight => {
                    routed += 1;
                    anchored(line, from, to)
                }
                _ => edge(from, to),
            };
            model.link_mut(candidate.link_id)?.geometry = geometry;
        }
    }
    info!(routed, "fixed link geometries");
    Ok(routed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{canal, id};
    use rnl_network::{InputLine, NetworkOptions};

    fn waterway() -> Network {
        let line = LineString::from(vec![
            (0.0, 0.0),
            (1000.0, 0.0),
            (1250.0, 100.0),
            (1500.0, 0.0),
            (3000.0, 0.0),
        ]);
        Network::from_lines(&[InputLine::new(line)], NetworkOptions::with_tolerance(0.01)).unwrap()
    }

    #[test]
    fn links_follow_the_waterway() {
        let mut model = canal();
        let mut network = waterway();
        let routed = fix_link_geometries(&mut model, &mut network, &LinkGeometryOptions::default()).unwrap();
        assert!(routed >= 3);

        let link = model.find_link(id(2), id(3)).unwrap();
        assert!(link.geometry.0.contains(&Coord { x: 1250.0, y: 100.0 }));
        assert_eq!(link.geometry.0.first(), Some(&Coord { x: 1000.0, y: 0.0 }));
        assert_eq!(link.geometry.0.last(), Some(&Coord { x: 1500.0, y: 0.0 }));

        // Pump 8 lies 200 m off the waterway and keeps its straight links
        let pump = model.find_link(id(2), id(8)).unwrap();
        assert_eq!(pump.geometry.0.len(), 2);
    }

    #[test]
    fn detours_fall_back_to_a_straight_line() {
        let mut model = canal();
        let mut network = waterway();
        let options = LinkGeometryOptions {
            max_straight_line_ratio: 1.01,
            ..LinkGeometryOptions::default()
        };
        fix_link_geometries(&mut model, &mut network, &options).unwrap();
        let link = model.find_link(id(2), id(3)).unwrap();
        assert_eq!(link.geometry.0.len(), 2);
    }
}
