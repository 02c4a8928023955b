use geo::{Geometry, LineString, MultiPolygon, Point, polygon};
use rnl_gpkg::{ColumnKind, EPSG_RD_NEW, Feature, GeoPackage, GeometryType, Layer, Value};

fn node_layer() -> Layer {
    let mut layer = Layer::new("Node")
        .with_geometry(GeometryType::Point, EPSG_RD_NEW)
        .with_column("node_type", ColumnKind::Text)
        .with_column("meta_streefpeil", ColumnKind::Real);
    layer.push(
        Feature::new(Some(7), Some(Geometry::Point(Point::new(155000.0, 463000.0))))
            .with("node_type", "Basin")
            .with("meta_streefpeil", -0.4),
    );
    layer.push(
        Feature::new(Some(9), Some(Geometry::Point(Point::new(155010.0, 463000.0))))
            .with("node_type", "Pump")
            .with("meta_streefpeil", Value::Null),
    );
    layer
}

#[test]
fn layers_survive_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("database.gpkg");

    {
        let mut gpkg = GeoPackage::create(&path).unwrap();
        gpkg.write_layer(&node_layer()).unwrap();

        let mut links = Layer::new("Link").with_geometry(GeometryType::LineString, EPSG_RD_NEW);
        links.push(
            Feature::new(
                Some(1),
                Some(Geometry::LineString(LineString::from(vec![
                    (155000.0, 463000.0),
                    (155010.0, 463000.0),
                ]))),
            )
            .with("from_node_id", 7i64)
            .with("to_node_id", 9i64),
        );
        links.infer_columns();
        gpkg.write_layer(&links).unwrap();

        let area = polygon![
            (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 0.0),
        ];
        let mut basin_area =
            Layer::new("Basin / area").with_geometry(GeometryType::MultiPolygon, EPSG_RD_NEW);
        basin_area.push(
            Feature::new(None, Some(Geometry::MultiPolygon(MultiPolygon::new(vec![area]))))
                .with("node_id", 7i64),
        );
        basin_area.infer_columns();
        gpkg.write_layer(&basin_area).unwrap();
    }

    let gpkg = GeoPackage::open(&path).unwrap();
    assert_eq!(gpkg.list_layers().unwrap(), vec!["Basin / area", "Link", "Node"]);

    let nodes = gpkg.read_layer("Node").unwrap();
    assert_eq!(nodes, node_layer());

    let links = gpkg.read_layer("Link").unwrap();
    assert_eq!(links.features[0].get_i64("to_node_id"), Some(9));
    assert_eq!(
        links.column("from_node_id").map(|c| c.kind),
        Some(ColumnKind::Integer)
    );

    let area = gpkg.read_layer("Basin / area").unwrap();
    assert_eq!(area.features[0].fid, Some(1));
    assert!(matches!(
        area.features[0].geometry,
        Some(Geometry::MultiPolygon(_))
    ));
}

#[test]
fn rewriting_a_layer_replaces_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edits.gpkg");
    let mut gpkg = GeoPackage::create(&path).unwrap();
    gpkg.write_layer(&node_layer()).unwrap();

    let mut smaller = node_layer();
    smaller.features.truncate(1);
    gpkg.write_layer(&smaller).unwrap();
    assert_eq!(gpkg.read_layer("Node").unwrap().len(), 1);

    gpkg.delete_layer("Node").unwrap();
    assert!(!gpkg.has_layer("Node").unwrap());
}

#[test]
fn opening_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(GeoPackage::open(&dir.path().join("missing.gpkg")).is_err());
}
