//! Small models shared by the unit tests.

use geo::{MultiPolygon, Point, polygon};
use rnl_core::NodeId;

use crate::model::{LinkAttrs, Model, NodeAttrs};
use crate::node_type::NodeType;
use crate::tables::{BasinArea, Table};

pub fn id(v: u32) -> NodeId {
    NodeId::new(v).unwrap()
}

pub fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: x0, y: y0),
        (x: x0 + size, y: y0),
        (x: x0 + size, y: y0 + size),
        (x: x0, y: y0 + size),
        (x: x0, y: y0),
    ]])
}

pub fn add_basin(model: &mut Model, node_id: u32, x: f64) -> NodeId {
    let node_id = model
        .add_node(
            NodeType::Basin,
            Point::new(x, 0.0),
            NodeAttrs {
                node_id: Some(id(node_id)),
                ..NodeAttrs::default()
            },
        )
        .unwrap();
    model
        .update_table(Table::BasinArea(vec![BasinArea::new(
            node_id,
            square(x - 5.0, -5.0, 10.0),
        )]))
        .unwrap();
    node_id
}

pub fn add_connector(model: &mut Model, node_type: NodeType, node_id: u32, x: f64) -> NodeId {
    model
        .add_node(
            node_type,
            Point::new(x, 0.0),
            NodeAttrs {
                node_id: Some(id(node_id)),
                ..NodeAttrs::default()
            },
        )
        .unwrap()
}

/// Basin 1 -> Pump 2 -> Basin 3, along the x-axis.
pub fn two_basin_model() -> Model {
    let mut model = Model::default();
    add_basin(&mut model, 1, 0.0);
    add_connector(&mut model, NodeType::Pump, 2, 10.0);
    add_basin(&mut model, 3, 20.0);
    model.add_link(id(1), id(2), LinkAttrs::default()).unwrap();
    model.add_link(id(2), id(3), LinkAttrs::default()).unwrap();
    model
}
