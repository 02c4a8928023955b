use std::collections::BTreeSet;

use geo::{Area, MultiPolygon, Point, polygon};
use proptest::prelude::*;
use rnl_core::{LinkId, NodeId};
use rnl_model::{
    BasinArea, BasinProfile, LinkAttrs, Model, NodeAttrs, NodeType, PumpStatic, concat,
};

fn id(v: u32) -> NodeId {
    NodeId::new(v).unwrap()
}

fn square(x0: f64, size: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: x0, y: 0.0),
        (x: x0 + size, y: 0.0),
        (x: x0 + size, y: size),
        (x: x0, y: size),
        (x: x0, y: 0.0),
    ]])
}

fn basin(model: &mut Model, node_id: u32, x: f64) {
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
    model.add_basin_area(node_id, square(x, 10.0)).unwrap();
}

/// Basin 10 -> Outlet 15 -> Basin 20
fn merge_fixture() -> Model {
    let mut model = Model::default();
    basin(&mut model, 10, 0.0);
    basin(&mut model, 20, 50.0);
    model
        .add_node(
            NodeType::Outlet,
            Point::new(25.0, 0.0),
            NodeAttrs {
                node_id: Some(id(15)),
                ..NodeAttrs::default()
            },
        )
        .unwrap();
    model.add_link(id(10), id(15), LinkAttrs::default()).unwrap();
    model.add_link(id(15), id(20), LinkAttrs::default()).unwrap();
    model
}

#[test]
fn merge_basins_connected() {
    let mut model = merge_fixture();
    model.merge_basins(id(20), id(10), true).unwrap();

    assert!(!model.has_node(id(20)));
    assert!(!model.has_node(id(15)));
    assert!(model.tables().all(|t| !t.node_ids().contains(&id(20))));
    assert!(model.links().all(|l| l.from_node_id != l.to_node_id));
    let areas = model.table::<BasinArea>();
    assert_eq!(areas.len(), 1);
    approx::assert_relative_eq!(areas[0].geometry.unsigned_area(), 200.0, epsilon = 1e-9);
}

#[test]
fn merge_basins_unconnected_keeps_loop_through_connector() {
    let mut model = merge_fixture();
    model.merge_basins(id(20), id(10), false).unwrap();

    assert!(!model.has_node(id(20)));
    assert!(model.find_link(id(10), id(15)).is_some());
    let back = model.find_link(id(15), id(10)).unwrap();
    assert_eq!(back.geometry.0.last().map(|c| c.x), Some(0.0));
    assert_eq!(model.rows_of::<BasinProfile>(id(20)).count(), 0);
}

#[test]
fn reverse_direction_at_node_flips_all_links() {
    let mut model = merge_fixture();
    let flipped = model.reverse_direction_at_node(id(15)).unwrap();
    assert_eq!(flipped.len(), 2);
    assert!(model.find_link(id(20), id(15)).is_some());
    assert!(model.find_link(id(15), id(10)).is_some());
}

fn chain(n: u32, gap: u32) -> Model {
    let mut model = Model::default();
    for i in 0..n {
        let node_type = if i % 2 == 0 { NodeType::Basin } else { NodeType::Pump };
        model
            .add_node(
                node_type,
                Point::new(f64::from(i) * 10.0, 0.0),
                NodeAttrs {
                    node_id: Some(id(1 + i * gap)),
                    ..NodeAttrs::default()
                },
            )
            .unwrap();
    }
    for i in 1..n {
        model
            .add_link(id(1 + (i - 1) * gap), id(1 + i * gap), LinkAttrs::default())
            .unwrap();
    }
    model
}

proptest! {
    #[test]
    fn reset_index_makes_ids_dense(n in 1u32..12, gap in 1u32..7, start in 1u32..50) {
        let mut model = chain(n, gap);
        let start = id(start);
        model.reset_index(start).unwrap();
        let ids: Vec<u32> = model.node_ids().map(NodeId::get).collect();
        let expected: Vec<u32> = (0..n).map(|i| start.get() + i).collect();
        prop_assert_eq!(ids, expected);
        let known: BTreeSet<NodeId> = model.node_ids().collect();
        for table in model.tables() {
            prop_assert!(table.node_ids().iter().all(|id| known.contains(id)));
        }
        for link in model.links() {
            prop_assert!(known.contains(&link.from_node_id) && known.contains(&link.to_node_id));
        }
    }

    #[test]
    fn reverse_link_is_self_inverse(n in 2u32..8, pick in 0usize..7) {
        let mut model = chain(n, 1);
        let before = model.clone();
        let link_ids: Vec<LinkId> = model.links().map(|l| l.link_id).collect();
        let link_id = link_ids[pick % link_ids.len()];
        model.reverse_link(link_id).unwrap();
        prop_assert_ne!(&model, &before);
        model.reverse_link(link_id).unwrap();
        prop_assert_eq!(model, before);
    }

    #[test]
    fn concat_keeps_ids_disjoint(a in 1u32..8, b in 1u32..8, gap in 1u32..4) {
        let first = chain(a, gap);
        let second = chain(b, 1);
        let combined = concat(vec![first.clone(), second.clone()]).unwrap();
        prop_assert_eq!(combined.node_count(), first.node_count() + second.node_count());
        prop_assert_eq!(combined.link_count(), first.link_count() + second.link_count());
        prop_assert_eq!(
            combined.table::<PumpStatic>().len(),
            first.table::<PumpStatic>().len() + second.table::<PumpStatic>().len()
        );
    }
}
