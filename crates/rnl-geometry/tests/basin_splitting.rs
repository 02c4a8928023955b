use approx::assert_relative_eq;
use geo::{Area, Contains, Geometry, line_string, polygon};
use rnl_geometry::{
    BasinGeometry, basins_to_points, from_wkt, line_length, split_basins, subdivide_line, to_wkt,
};

#[test]
fn split_basins_keep_their_attributes_and_area() {
    let basin = polygon![
        (x: 0.0, y: 0.0), (x: 20.0, y: 0.0), (x: 20.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0),
    ];
    let other = polygon![
        (x: 50.0, y: 0.0), (x: 60.0, y: 0.0), (x: 60.0, y: 10.0), (x: 50.0, y: 10.0), (x: 50.0, y: 0.0),
    ];
    let cut = line_string![(x: 5.0, y: -1.0), (x: 5.0, y: 11.0)];

    let pieces = split_basins(vec![("a", basin.clone()), ("b", other)], &[cut]).unwrap();
    assert_eq!(pieces.len(), 3);
    let a: Vec<_> = pieces.iter().filter(|(name, _)| *name == "a").collect();
    assert_eq!(a.len(), 2);
    let total: f64 = a.iter().map(|(_, p)| p.unsigned_area()).sum();
    assert_relative_eq!(total, basin.unsigned_area(), epsilon = 1e-9);
    assert_relative_eq!(a[0].1.unsigned_area(), 50.0, epsilon = 1e-9);

    // every representative point lies inside its own piece
    let basins: Vec<BasinGeometry> = pieces
        .iter()
        .map(|(_, p)| BasinGeometry::Polygon(p.clone()))
        .collect();
    let points = basins_to_points(&basins).unwrap();
    for ((_, polygon), point) in pieces.iter().zip(points) {
        assert!(polygon.contains(&point));
    }
}

#[test]
fn cut_line_missing_every_basin() {
    let basin = polygon![
        (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0),
    ];
    let cut = line_string![(x: 20.0, y: -1.0), (x: 20.0, y: 11.0)];
    assert!(split_basins(vec![((), basin)], &[cut]).is_err());
}

#[test]
fn wkt_lines_subdivide_evenly() {
    let Geometry::LineString(line) = from_wkt("LINESTRING (0 0, 30 0, 30 40)").unwrap() else {
        panic!("expected a line");
    };
    let parts = subdivide_line(&line, 25.0).unwrap();
    assert_eq!(parts.len(), 3);
    for part in &parts {
        assert_relative_eq!(line_length(part), 70.0 / 3.0, epsilon = 1e-9);
    }
    let text = to_wkt(&Geometry::LineString(parts[0].clone()));
    assert!(text.starts_with("LINESTRING"));
}

proptest::proptest! {
    #[test]
    fn subdivided_parts_add_up(length in 1.0f64..500.0, max_length in 1.0f64..100.0) {
        let line = line_string![(x: 0.0, y: 0.0), (x: length, y: 0.0)];
        let parts = subdivide_line(&line, max_length).unwrap();
        let total: f64 = parts.iter().map(line_length).sum();
        proptest::prop_assert!((total - length).abs() < 1e-6);
        proptest::prop_assert!(parts.iter().all(|p| line_length(p) <= max_length + 1e-9));
    }
}
