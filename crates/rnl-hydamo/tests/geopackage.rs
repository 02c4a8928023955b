use geo::{Geometry, Point, polygon};
use rnl_gpkg::{Feature, GeoPackage, Layer, Value};
use rnl_hydamo::{HyDAMO, HydamoError, SetDataOptions};

fn stuwen() -> Vec<Feature> {
    vec![
        Feature::new(None, Some(Geometry::Point(Point::new(155_000.0, 463_000.0))))
            .with("code", "KST-01")
            .with("globalid", "{a1}")
            .with("kruinbreedte", 2.5)
            .with("laagstedoorstroomhoogte", "-0.4"),
        Feature::new(None, Some(Geometry::Point(Point::new(155_100.0, 463_050.0))))
            .with("code", "KST-02")
            .with("globalid", "{a2}")
            .with("soortstuw", 11),
    ]
}

fn peilgebied() -> Feature {
    let area = polygon![
        (x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 100.0, y: 100.0), (x: 0.0, y: 100.0), (x: 0.0, y: 0.0)
    ];
    Feature::new(None, Some(Geometry::Polygon(area)))
        .with("code", "PG-1")
        .with("globalid", "{p1}")
}

#[test]
fn layers_survive_a_geopackage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hydamo.gpkg");

    let mut hydamo = HyDAMO::new().unwrap();
    let options = SetDataOptions::default();
    hydamo.set_data("stuw", stuwen(), &options).unwrap();
    hydamo.set_data("peilgebiedpraktijk", vec![peilgebied()], &options).unwrap();
    hydamo.to_geopackage(&path, true).unwrap();

    let gpkg = GeoPackage::open(&path).unwrap();
    let mut layers = gpkg.list_layers().unwrap();
    layers.sort();
    assert_eq!(layers, vec!["peilgebiedpraktijk", "stuw"]);

    let read = HyDAMO::from_geopackage(&path, &options).unwrap();
    assert_eq!(read.data_layers(), vec!["stuw", "peilgebiedpraktijk"]);
    let stuw = read.get("stuw", "{a1}").unwrap().unwrap();
    assert_eq!(stuw.get_str("code"), Some("KST-01"));
    assert_eq!(stuw.get_f64("laagstedoorstroomhoogte"), Some(-0.4));
    assert_eq!(read.get("stuw", "{a2}").unwrap().unwrap().get_i64("soortstuw"), Some(11));

    let area = &read.layer("peilgebiedpraktijk").unwrap().features[0];
    assert!(matches!(area.geometry, Some(Geometry::MultiPolygon(_))));
}

#[test]
fn foreign_layers_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.gpkg");
    let mut gpkg = GeoPackage::create(&path).unwrap();
    let mut other = Layer::new("notities");
    other.push(Feature::new(None, None).with("tekst", "los"));
    other.infer_columns();
    gpkg.write_layer(&other).unwrap();
    drop(gpkg);

    let read = HyDAMO::from_geopackage(&path, &SetDataOptions::default()).unwrap();
    assert!(read.data_layers().is_empty());
}

#[test]
fn invalid_rows_are_reported() {
    let mut hydamo = HyDAMO::new().unwrap();
    let mut rows = stuwen();
    rows[1].set("kruinbreedte", "breed");
    let err = hydamo
        .set_data("stuw", rows, &SetDataOptions::default())
        .unwrap_err();
    match err {
        HydamoError::Schema { column, rows, .. } => {
            assert_eq!(column, "kruinbreedte");
            assert_eq!(rows, vec![1]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(hydamo.layer("stuw").unwrap().is_empty());

    let mut category = HyDAMO::new().unwrap();
    let object = Feature::new(
        None,
        Some(Geometry::LineString(vec![(0.0, 0.0), (10.0, 0.0)].into())),
    )
    .with("code", "OWL-1")
    .with("globalid", "{h1}")
    .with("categorieoppwaterlichaam", Value::Integer(9));
    assert!(matches!(
        category.set_data("hydroobject", vec![object], &SetDataOptions::default()),
        Err(HydamoError::Schema { .. })
    ));
}
