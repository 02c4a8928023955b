//! A small canal shared by the unit tests.
//!
//! ```text
//!                      Pump 8 (Afvoergemaal)
//!                    /        \
//! FlowBoundary 1 -> Basin 2 -> Manning 3 -> Basin 4 -> Outlet 5 (Uitlaat) -> LevelBoundary 6
//!                    ^
//! LevelBoundary 9 -> Outlet 10 (Inlaat)
//! ```

use geo::{MultiPolygon, Point, polygon};
use rnl_core::NodeId;
use rnl_model::{BasinArea, LinkAttrs, Model, NodeAttrs, NodeType, Table};

pub fn id(v: u32) -> NodeId {
    NodeId::new(v).unwrap()
}

pub fn square(cx: f64, cy: f64, size: f64) -> MultiPolygon<f64> {
    let h = size / 2.0;
    MultiPolygon::new(vec![polygon![
        (x: cx - h, y: cy - h),
        (x: cx + h, y: cy - h),
        (x: cx + h, y: cy + h),
        (x: cx - h, y: cy + h),
        (x: cx - h, y: cy - h),
    ]])
}

pub fn add(model: &mut Model, node_type: NodeType, node_id: u32, x: f64, y: f64, attrs: NodeAttrs) {
    model
        .add_node(
            node_type,
            Point::new(x, y),
            NodeAttrs {
                node_id: Some(id(node_id)),
                ..attrs
            },
        )
        .unwrap();
}

fn structure(categorie: &str, code: &str) -> NodeAttrs {
    NodeAttrs {
        meta_categorie: Some(categorie.to_string()),
        meta_code_waterbeheerder: Some(code.to_string()),
        ..NodeAttrs::default()
    }
}

pub fn add_basin(model: &mut Model, node_id: u32, x: f64, size: f64, streefpeil: f64, categorie: &str) {
    add(
        model,
        NodeType::Basin,
        node_id,
        x,
        0.0,
        NodeAttrs {
            meta_categorie: Some(categorie.to_string()),
            ..NodeAttrs::default()
        },
    );
    let mut area = BasinArea::new(id(node_id), square(x, 0.0, size));
    area.meta_streefpeil = Some(streefpeil);
    model.update_table(Table::BasinArea(vec![area])).unwrap();
}

pub fn canal() -> Model {
    let mut model = Model::default();
    add(&mut model, NodeType::FlowBoundary, 1, 0.0, 0.0, NodeAttrs::default());
    add_basin(&mut model, 2, 1000.0, 100.0, 1.0, "doorgaand");
    add(&mut model, NodeType::ManningResistance, 3, 1500.0, 0.0, NodeAttrs::default());
    add_basin(&mut model, 4, 2000.0, 200.0, 0.5, "hoofdwater");
    add(&mut model, NodeType::Outlet, 5, 2500.0, 0.0, structure("Uitlaat", "KST5"));
    add(&mut model, NodeType::LevelBoundary, 6, 3000.0, 0.0, NodeAttrs::default());
    add(&mut model, NodeType::Pump, 8, 1500.0, 200.0, structure("Afvoergemaal", "KGM8"));
    add(&mut model, NodeType::LevelBoundary, 9, 1000.0, -1000.0, NodeAttrs::default());
    add(&mut model, NodeType::Outlet, 10, 1000.0, -500.0, structure("Inlaat", "KIN10"));
    for (a, b) in [(1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (2, 8), (8, 4), (9, 10), (10, 2)] {
        model.add_link(id(a), id(b), LinkAttrs::default()).unwrap();
    }
    model
}
