use chrono::NaiveDate;
use geo::{MultiPolygon, Point, polygon};
use rnl_core::NodeId;
use rnl_model::{
    BasinArea, BasinForcing, BasinProfile, BasinState, BasinTime, DiscreteControlCondition,
    DiscreteControlLogic, LinkAttrs, Model, ModelConfig, NetworkValidator, NodeAttrs, NodeType,
    OutletStatic, StructureStatic, Table,
};

fn id(v: u32) -> NodeId {
    NodeId::new(v).unwrap()
}

fn node(model: &mut Model, node_type: NodeType, node_id: u32, x: f64, tables: Vec<Table>) {
    model
        .add_node(
            node_type,
            Point::new(x, 0.0),
            NodeAttrs {
                node_id: Some(id(node_id)),
                tables,
                ..NodeAttrs::default()
            },
        )
        .unwrap();
}

fn profile(node_id: u32, rows: &[(f64, f64)]) -> Table {
    Table::BasinProfile(
        rows.iter()
            .map(|&(level, area)| BasinProfile {
                node_id: id(node_id),
                level,
                area,
            })
            .collect(),
    )
}

/// FlowBoundary -> Basin -> Manning -> Basin -> Outlet -> LevelBoundary,
/// plus a DiscreteControl on the outlet.
fn canal() -> Model {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)).unwrap();
    let end = NaiveDate::from_ymd_opt(2021, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)).unwrap();
    let mut model = Model::new(ModelConfig::new(start, end).unwrap());

    node(&mut model, NodeType::FlowBoundary, 1, 0.0, Vec::new());
    node(
        &mut model,
        NodeType::Basin,
        2,
        1000.0,
        vec![
            profile(2, &[(0.5, 5000.0), (4.5, 6000.0)]),
            Table::BasinState(vec![BasinState { node_id: id(2), level: 1.3 }]),
        ],
    );
    node(&mut model, NodeType::ManningResistance, 3, 1500.0, Vec::new());
    node(
        &mut model,
        NodeType::Basin,
        4,
        2000.0,
        vec![
            profile(4, &[(-0.5, 5000.0), (3.5, 6000.0)]),
            Table::BasinState(vec![BasinState { node_id: id(4), level: 0.3 }]),
        ],
    );
    node(
        &mut model,
        NodeType::Outlet,
        5,
        2500.0,
        vec![Table::OutletStatic(vec![OutletStatic(StructureStatic::new(id(5), 7.5))])],
    );
    node(&mut model, NodeType::LevelBoundary, 6, 3000.0, Vec::new());
    node(&mut model, NodeType::DiscreteControl, 7, 2500.0, Vec::new());
    model.node_mut(id(7)).unwrap().geometry = Point::new(2500.0, 50.0);
    for (a, b) in [(1, 2), (2, 3), (3, 4), (4, 5), (5, 6)] {
        model.add_link(id(a), id(b), LinkAttrs::default()).unwrap();
    }
    model.add_link(id(7), id(5), LinkAttrs::control()).unwrap();
    model.update_table(Table::DiscreteControlCondition(vec![DiscreteControlCondition {
        node_id: id(7),
        listen_node_id: id(4),
        variable: "level".to_string(),
        greater_than: 0.5,
        meta: Default::default(),
    }])).unwrap();
    model.update_table(Table::DiscreteControlLogic(vec![
        DiscreteControlLogic { node_id: id(7), truth_state: "F".into(), control_state: "closed".into() },
        DiscreteControlLogic { node_id: id(7), truth_state: "T".into(), control_state: "open".into() },
    ])).unwrap();
    for (basin, x) in [(2, 975.0), (4, 1975.0)] {
        let area: MultiPolygon<f64> = MultiPolygon::new(vec![polygon![
            (x: x, y: -25.0), (x: x + 50.0, y: -25.0), (x: x + 50.0, y: 25.0), (x: x, y: 25.0), (x: x, y: -25.0),
        ]]);
        let mut row = BasinArea::new(id(basin), area);
        row.meta_streefpeil = Some(1.0);
        model.update_table(Table::BasinArea(vec![row])).unwrap();
    }
    let day = |d| NaiveDate::from_ymd_opt(2020, 1, d).and_then(|d| d.and_hms_opt(0, 0, 0)).unwrap();
    model.update_table(Table::BasinTime(vec![
        BasinTime { node_id: id(2), time: day(1), forcing: BasinForcing { precipitation: Some(1e-9), ..Default::default() } },
        BasinTime { node_id: id(2), time: day(2), forcing: BasinForcing { precipitation: Some(2e-9), ..Default::default() } },
    ])).unwrap();
    model
}

#[test]
fn bundle_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let toml_path = dir.path().join("canal.toml");
    let mut model = canal();
    model.write(&toml_path).unwrap();

    assert!(dir.path().join("database.gpkg").exists());
    assert!(!dir.path().join("basin_time.csv").exists());

    let read = Model::read(&toml_path).unwrap();
    assert_eq!(read.config, model.config);
    assert_eq!(read.nodes().collect::<Vec<_>>(), model.nodes().collect::<Vec<_>>());
    assert_eq!(read.links().collect::<Vec<_>>(), model.links().collect::<Vec<_>>());
    for table in model.tables() {
        let mut expected = table.clone();
        expected.sort();
        assert_eq!(read.table_by_kind(table.kind()), Some(&expected), "{}", table.kind());
    }
}

#[test]
fn canal_passes_network_validation() {
    let model = canal();
    let report = NetworkValidator::new(&model).report();
    assert!(report.node_overlapping.is_empty());
    assert!(report.node_internal_basin.is_empty());
    assert!(report.link_incorrect_connectivity.is_empty());
    assert!(report.link_incorrect_type_connectivity.is_empty());
    assert!(report.is_clean());
}
