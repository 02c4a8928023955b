use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use geo::{Geometry, Point, Polygon, line_string, polygon};
use rnl_app::{
    AppError, BergingPaths, ParameterizeRequest, PeilgebiedSource, apply_edits, concat_models,
    get_results_summary, hot_start, load_model, parameterize_model, reset_index, route_links,
    validate_model,
};
use rnl_core::{LinkId, NodeId};
use rnl_gpkg::{ColumnKind, Feature, GeoPackage, GeometryType, Layer};
use rnl_model::{BasinArea, BasinState, BasinTime, LinkAttrs, Model, NodeAttrs, NodeType};
use rnl_parametrize::{AanvoerSummary, BudgetSeries};
use rnl_raster::{Raster, write_geotiff};
use rnl_results::{
    BasinResult, FlowResult, read_basin_results, write_basin_results, write_flow_results,
};

fn id(v: u32) -> NodeId {
    NodeId::new(v).unwrap()
}

fn new_year(year: i32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

fn basin_level(year: i32, node_id: u32, level: f64) -> BasinResult {
    BasinResult {
        time: new_year(year),
        node_id: id(node_id),
        level,
        storage: Some(level * 100.0),
    }
}

fn flow(year: i32, link_id: u32, from: u32, to: u32, flow_rate: f64) -> FlowResult {
    FlowResult {
        time: new_year(year),
        link_id: LinkId::new(link_id),
        from_node_id: id(from),
        to_node_id: id(to),
        flow_rate,
    }
}

/// Basin 1 -> Pump 2 -> Basin 3 -> Outlet 4 -> LevelBoundary 5.
fn reach(dir: &Path, name: &str) -> PathBuf {
    let mut model = Model::default();
    let types = [
        NodeType::Basin,
        NodeType::Pump,
        NodeType::Basin,
        NodeType::Outlet,
        NodeType::LevelBoundary,
    ];
    for (i, node_type) in types.into_iter().enumerate() {
        model
            .add_node(
                node_type,
                Point::new(i as f64 * 100.0, 0.0),
                NodeAttrs {
                    node_id: Some(id(i as u32 + 1)),
                    ..NodeAttrs::default()
                },
            )
            .unwrap();
    }
    for i in 1..5 {
        model.add_link(id(i), id(i + 1), LinkAttrs::default()).unwrap();
    }
    let toml_path = dir.join(name).join(format!("{name}.toml"));
    model.write(&toml_path).unwrap();
    toml_path
}

#[test]
fn edit_then_renumber() {
    let dir = tempfile::tempdir().unwrap();
    let toml_path = reach(dir.path(), "reach");
    let edits = dir.path().join("model_edits.yaml");
    fs::write(&edits, "- tag: remove_node\n  node_id: 3\n").unwrap();

    let edited = dir.path().join("edited").join("reach.toml");
    let summary = apply_edits(&toml_path, &edits, &edited).unwrap();
    assert_eq!(summary.node_count, 4);
    assert_eq!(summary.link_count, 2);

    let renumbered = dir.path().join("renumbered").join("reach.toml");
    reset_index(&edited, 1, &renumbered).unwrap();
    let model = load_model(&renumbered).unwrap();
    let ids: Vec<u32> = model.node_ids().map(|n| n.get()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(model.node_type(id(3)).unwrap(), NodeType::Outlet);

    assert!(matches!(
        reset_index(&edited, 0, &renumbered),
        Err(AppError::InvalidInput(_))
    ));
}

#[test]
fn concatenated_models_are_disjoint() {
    let dir = tempfile::tempdir().unwrap();
    let a = reach(dir.path(), "a");
    let b = reach(dir.path(), "b");
    let output = dir.path().join("lhm").join("lhm.toml");
    let summary = concat_models(&[a.as_path(), b.as_path()], &output).unwrap();
    assert_eq!(summary.node_count, 10);
    assert_eq!(summary.link_count, 8);
    assert!(summary.node_types.contains(&("Basin".to_string(), 4)));
    assert!(concat_models(&[], &output).is_err());
}

#[test]
fn validation_of_a_clean_reach() {
    let dir = tempfile::tempdir().unwrap();
    let toml_path = reach(dir.path(), "reach");
    let diagnostics = dir.path().join("validation_result.gpkg");
    let report = validate_model(&toml_path, Some(&diagnostics)).unwrap();
    assert!(report.link_missing_nodes.is_empty());
    assert!(report.link_duplicated.is_empty());
    assert!(report.link_incorrect_connectivity.is_empty());

    assert!(matches!(
        validate_model(&dir.path().join("absent.toml"), None),
        Err(AppError::FileNotFound { .. })
    ));
}

#[test]
fn results_feed_a_hot_start() {
    let dir = tempfile::tempdir().unwrap();
    let toml_path = reach(dir.path(), "reach");
    let results = toml_path.parent().unwrap().join("results");
    write_basin_results(
        &results,
        &[
            basin_level(2020, 1, 0.5),
            basin_level(2020, 3, 0.4),
            basin_level(2021, 1, 0.75),
            basin_level(2021, 3, 0.45),
        ],
    )
    .unwrap();
    write_flow_results(
        &results,
        &[
            flow(2020, 1, 1, 2, 0.1),
            flow(2021, 1, 1, 2, 0.2),
            flow(2021, 2, 2, 3, 0.2),
        ],
    )
    .unwrap();

    let summary = get_results_summary(&toml_path).unwrap();
    assert_eq!(summary.basin_count, 2);
    assert_eq!(summary.link_count, 2);
    assert_eq!(summary.time_range.0.to_string(), "2020-01-01 00:00:00");
    assert_eq!(summary.final_levels[&id(1)], 0.75);

    let output = dir.path().join("hot").join("reach.toml");
    assert_eq!(hot_start(&toml_path, &output).unwrap(), 2);
    let model = load_model(&output).unwrap();
    let state: Vec<&BasinState> = model.rows_of::<BasinState>(id(3)).collect();
    assert_eq!(state[0].level, 0.45);
}

#[cfg(unix)]
#[test]
fn runs_are_cached_per_bundle() {
    use rnl_app::{RunRequest, Settings, ensure_run, list_runs};
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let toml_path = reach(dir.path(), "reach");
    let output = dir.path().join("solver_output");
    write_basin_results(&output, &[basin_level(2020, 1, 0.5)]).unwrap();
    let solver = dir.path().join("ribasim.sh");
    fs::write(
        &solver,
        format!(
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo 2025.1.0; exit 0; fi\n\
             mkdir -p \"$(dirname \"$1\")/results\"\n\
             cp {}/basin.arrow \"$(dirname \"$1\")/results/\"\necho done\n",
            output.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&solver, fs::Permissions::from_mode(0o755)).unwrap();

    let settings = Settings {
        ribasim_exe: solver,
        ..Settings::default()
    };
    let request = RunRequest::new(&toml_path, &settings);
    let first = ensure_run(&request).unwrap();
    assert!(!first.loaded_from_cache);
    assert_eq!(first.manifest.solver_version, "2025.1.0");
    assert_eq!(first.manifest.model_name, "reach");

    // results removed from the bundle come back from the run archive
    let results = toml_path.parent().unwrap().join("results");
    fs::remove_dir_all(&results).unwrap();
    let second = ensure_run(&request).unwrap();
    assert!(second.loaded_from_cache);
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(list_runs(&toml_path).unwrap().len(), 1);
    assert_eq!(read_basin_results(&results).unwrap().len(), 1);
}

fn square(cx: f64, size: f64) -> Polygon<f64> {
    let h = size / 2.0;
    polygon![
        (x: cx - h, y: -h),
        (x: cx + h, y: -h),
        (x: cx + h, y: h),
        (x: cx - h, y: h),
        (x: cx - h, y: -h),
    ]
}

/// LevelBoundary 1 -> Inlaat 2 -> Basin 3 -> Afvoergemaal 4 -> Basin 5 -> Uitlaat 6 -> LevelBoundary 7.
/// Only Basin 3 has an area.
fn polder(dir: &Path) -> PathBuf {
    let mut model = Model::default();
    let nodes = [
        (NodeType::LevelBoundary, None),
        (NodeType::Outlet, Some(("Inlaat", "KIN2"))),
        (NodeType::Basin, None),
        (NodeType::Pump, Some(("Afvoergemaal", "KGM4"))),
        (NodeType::Basin, None),
        (NodeType::Outlet, Some(("Uitlaat", "KST6"))),
        (NodeType::LevelBoundary, None),
    ];
    for (i, (node_type, categorie)) in nodes.into_iter().enumerate() {
        model
            .add_node(
                node_type,
                Point::new(i as f64 * 500.0, 0.0),
                NodeAttrs {
                    node_id: Some(id(i as u32 + 1)),
                    meta_categorie: categorie.map(|c| c.0.to_string()),
                    meta_code_waterbeheerder: categorie.map(|c| c.1.to_string()),
                    ..NodeAttrs::default()
                },
            )
            .unwrap();
    }
    for i in 1..7 {
        model.add_link(id(i), id(i + 1), LinkAttrs::default()).unwrap();
    }
    model.add_basin_area(id(3), square(1000.0, 500.0).into()).unwrap();
    let toml_path = dir.join("polder").join("polder.toml");
    model.write(&toml_path).unwrap();
    toml_path
}

/// Polygon layer with `streefpeil` and `code` columns.
fn write_polygons(path: &Path, name: &str, polygons: &[(Polygon<f64>, f64, &str)]) {
    let mut gpkg = if path.exists() {
        GeoPackage::open(path).unwrap()
    } else {
        GeoPackage::create(path).unwrap()
    };
    let mut layer = Layer::new(name)
        .with_geometry(GeometryType::Polygon, 28992)
        .with_column("streefpeil", ColumnKind::Real)
        .with_column("code", ColumnKind::Text);
    for (polygon, level, code) in polygons {
        layer.push(
            Feature::new(None, Some(Geometry::Polygon(polygon.clone())))
                .with("streefpeil", *level)
                .with("code", *code),
        );
    }
    gpkg.write_layer(&layer).unwrap();
}

/// Berging rasters of 10 m cells over x 0..3500, y -300..300.
fn write_berging(dir: &Path) -> BergingPaths {
    fs::create_dir_all(dir).unwrap();
    let paths = BergingPaths::in_dir(dir);
    for (path, value) in [(&paths.maaiveld, 0.0), (&paths.ghg, -0.25), (&paths.glg, -0.75), (&paths.ma, 1.0)] {
        write_geotiff(&Raster::filled(350, 60, 0.0, 300.0, 10.0, value).unwrap(), path).unwrap();
    }
    paths
}

#[test]
fn parameterize_runs_the_optional_steps() {
    let dir = tempfile::tempdir().unwrap();
    let toml_path = polder(dir.path());
    let hydamo = dir.path().join("hydamo.gpkg");
    write_polygons(
        &hydamo,
        "peilgebiedpraktijk",
        &[(square(1000.0, 500.0), -0.5, "PG-A"), (square(2000.0, 500.0), -1.2, "PG-B")],
    );
    write_polygons(&hydamo, "waterdeel", &[(square(2000.0, 30.0), 0.0, "W1")]);
    // covers the Inlaat only
    write_polygons(&hydamo, "aanvoergebieden", &[(square(500.0, 200.0), 0.0, "A1")]);
    let budgets = dir.path().join("budgets.arrow");
    let mut series = BudgetSeries::new();
    series.insert(id(3), new_year(2011), -0.25);
    series.insert(id(5), new_year(2011), 0.1);
    series.write_arrow(&budgets).unwrap();

    let output = dir.path().join("parameterized").join("polder.toml");
    let request = ParameterizeRequest {
        toml_path: toml_path.clone(),
        output: output.clone(),
        peilgebieden: Some(PeilgebiedSource::hydamo(&hydamo)),
        water_bodies: Some((hydamo.clone(), "waterdeel".to_string())),
        supply_areas: Some((hydamo.clone(), "aanvoergebieden".to_string())),
        berging: Some(write_berging(&dir.path().join("rasters"))),
        budgets: Some(budgets),
        ..ParameterizeRequest::default()
    };
    let report = parameterize_model(&request).unwrap();
    assert_eq!(report.estimated_areas, 1);
    assert_eq!(report.storage_basins, 2);
    assert_eq!(
        report.aanvoer,
        Some(AanvoerSummary {
            pumps: 0,
            outlets: 1,
            basins: 0
        })
    );
    // two primary and two storage Basins, one time step
    assert_eq!(report.forcing_rows, 4);

    let model = load_model(&output).unwrap();
    let area = model.rows_of::<BasinArea>(id(5)).next().unwrap();
    assert_eq!(area.meta_streefpeil, Some(-1.2));
    let forcing = model.rows_of::<BasinTime>(id(3)).next().unwrap();
    assert_eq!(forcing.time, new_year(2020));
    assert_eq!(forcing.forcing.drainage, Some(0.25));

    let missing_rasters = ParameterizeRequest {
        berging: Some(BergingPaths::in_dir(&dir.path().join("absent"))),
        ..request
    };
    assert!(matches!(
        parameterize_model(&missing_rasters),
        Err(AppError::FileNotFound { .. })
    ));
}

#[test]
fn links_follow_the_line_network() {
    let dir = tempfile::tempdir().unwrap();
    let toml_path = reach(dir.path(), "reach");
    let lines = dir.path().join("hydroobject.gpkg");
    let mut gpkg = GeoPackage::create(&lines).unwrap();
    let mut layer = Layer::new("hydroobject").with_geometry(GeometryType::LineString, 28992);
    layer.push(Feature::new(
        None,
        Some(Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 400.0, y: 0.0)])),
    ));
    gpkg.write_layer(&layer).unwrap();

    let output = dir.path().join("routed").join("reach.toml");
    // Basin 1 to the Pump, the Pump to Basin 3 and Basin 3 to the Outlet
    assert_eq!(route_links(&toml_path, &lines, "hydroobject", 0.01, &output).unwrap(), 3);
    assert_eq!(load_model(&output).unwrap().link_count(), 4);
}
