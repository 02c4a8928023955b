//! Placing DiscreteControl nodes and wiring their control links.

use geo::{Centroid, MultiPoint, Point};
use rnl_core::NodeId;
use rnl_model::{LinkAttrs, Model, NodeAttrs, NodeType};
use tracing::debug;

use crate::discrete::DiscreteControlTables;
use crate::error::{ControlError, ControlResult};

/// Where a new control node goes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// `offset` metres to the left of the first controlled node, seen along
    /// its incoming flow link.
    LeftOfIncoming { offset: f64 },
    /// `offset` metres from the first controlled node, clockwise from north.
    Bearing { offset: f64, angle: f64 },
    /// Centroid of the controlled nodes and any extra nodes.
    Centroid,
    At(Point<f64>),
}

/// `point` moved `offset` along a bearing in degrees, clockwise from north.
pub fn offset_point(point: Point<f64>, offset: f64, angle: f64) -> Point<f64> {
    let theta = angle.to_radians();
    Point::new(point.x() + offset * theta.sin(), point.y() + offset * theta.cos())
}

/// Point `offset` to the left of `node_id`, relative to the last segment of
/// its incoming flow link.
pub fn left_of_incoming_link(model: &Model, node_id: NodeId, offset: f64) -> ControlResult<Point<f64>> {
    let point = model.node(node_id)?.geometry;
    let link = model
        .incoming_links(node_id)
        .into_iter()
        .find(|l| l.is_flow())
        .ok_or(ControlError::NoIncomingLink { node_id })?;
    let coords = &link.geometry.0;
    let segment = coords.windows(2).rev().find(|w| w[0] != w[1]);
    let Some([start, end]) = segment.map(|w| [w[0], w[1]]) else {
        return Err(ControlError::NoIncomingLink { node_id });
    };
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let length = dx.hypot(dy);
    Ok(Point::new(
        point.x() - dy / length * offset,
        point.y() + dx / length * offset,
    ))
}

fn centroid(model: &Model, node_ids: &[NodeId]) -> ControlResult<Point<f64>> {
    let points = node_ids
        .iter()
        .map(|id| Ok(model.node(*id)?.geometry))
        .collect::<ControlResult<Vec<_>>>()?;
    MultiPoint::new(points)
        .centroid()
        .ok_or_else(|| ControlError::invalid("no nodes to place a control node between"))
}

fn position(
    model: &Model,
    controlled: &[NodeId],
    extra: &[NodeId],
    placement: Placement,
) -> ControlResult<Point<f64>> {
    let first = controlled
        .first()
        .copied()
        .ok_or_else(|| ControlError::invalid("no controlled nodes"))?;
    match placement {
        Placement::LeftOfIncoming { offset } => left_of_incoming_link(model, first, offset),
        Placement::Bearing { offset, angle } => Ok(offset_point(model.node(first)?.geometry, offset, angle)),
        Placement::Centroid => {
            let all: Vec<NodeId> = controlled.iter().chain(extra).copied().collect();
            centroid(model, &all)
        }
        Placement::At(point) => Ok(point),
    }
}

/// Add a DiscreteControl node with `tables` and a control link to every
/// node in `controlled`.
///
/// `listened` only counts for [`Placement::Centroid`]. Returns the id of
/// the new node.
pub fn add_discrete_control(
    model: &mut Model,
    controlled: &[NodeId],
    listened: &[NodeId],
    placement: Placement,
    tables: DiscreteControlTables,
    attrs: NodeAttrs,
) -> ControlResult<NodeId> {
    for node_id in controlled {
        let node_type = model.node_type(*node_id)?;
        if !node_type.is_controllable() {
            return Err(ControlError::NotControllable {
                node_id: *node_id,
                node_type,
            });
        }
    }
    for node_id in listened {
        model.node(*node_id)?;
    }
    let point = position(model, controlled, listened, placement)?;
    let node_id = model.add_node(
        NodeType::DiscreteControl,
        point,
        NodeAttrs {
            tables: tables.into_tables(),
            ..attrs
        },
    )?;
    for target in controlled {
        model.add_link(node_id, *target, LinkAttrs::control())?;
    }
    debug!(%node_id, controlled = controlled.len(), "added discrete control");
    Ok(node_id)
}

/// Add a DiscreteControl node beside one connector node.
pub fn add_and_connect_discrete_control_node(
    model: &mut Model,
    node_id: NodeId,
    offset: f64,
    angle: f64,
    tables: DiscreteControlTables,
    attrs: NodeAttrs,
) -> ControlResult<NodeId> {
    add_discrete_control(model, &[node_id], &[], Placement::Bearing { offset, angle }, tables, attrs)
}
