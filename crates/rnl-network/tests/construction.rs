use geo::LineString;
use rnl_network::{InputLine, Network, NetworkNodeType, NetworkOptions};

fn lines(coords: &[&[(f64, f64)]]) -> Vec<InputLine> {
    coords
        .iter()
        .map(|c| InputLine::new(LineString::from(c.to_vec())))
        .collect()
}

#[test]
fn snap_gap_is_closed_within_tolerance() {
    let input = lines(&[
        &[(0.0, 0.0), (10.0, 0.0)],
        &[(10.5, 0.0), (20.0, 0.0)],
        &[(10.0, 0.0), (10.0, 10.0)],
    ]);

    let snapped = Network::from_lines(&input, NetworkOptions::with_tolerance(1.0)).unwrap();
    assert_eq!(snapped.node_count(), 4);
    assert_eq!(snapped.link_count(), 3);

    let exact = Network::from_lines(&input, NetworkOptions::default()).unwrap();
    assert_eq!(exact.node_count(), 5);
    assert_eq!(exact.link_count(), 3);
}

#[test]
fn t_junction_splits_through_line() {
    let input = lines(&[&[(0.0, 0.0), (20.0, 0.0)], &[(10.0, 0.0), (10.0, 10.0)]]);
    let network = Network::from_lines(&input, NetworkOptions::default()).unwrap();
    assert_eq!(network.node_count(), 4);
    assert_eq!(network.link_count(), 3);
    let junction = network
        .nodes()
        .find(|n| n.point == geo::Point::new(10.0, 0.0))
        .unwrap();
    assert_eq!(junction.node_type, NetworkNodeType::Intersection);
}

#[test]
fn short_gap_filler_is_consumed() {
    let input = lines(&[
        &[(0.0, 0.0), (10.0, 0.0)],
        &[(10.0, 0.0), (11.0, 0.0)],
        &[(11.0, 0.0), (20.0, 0.0)],
        &[(20.0, 0.0), (30.0, 0.0)],
        &[(30.0, 0.0), (40.0, 0.0)],
    ]);

    let collapsed = Network::from_lines(&input, NetworkOptions::with_tolerance(1.1)).unwrap();
    assert_eq!(collapsed.link_count(), 4);
    assert_eq!(collapsed.node_count(), 5);

    let kept = Network::from_lines(&input, NetworkOptions::default()).unwrap();
    assert_eq!(kept.link_count(), 5);
    assert_eq!(kept.node_count(), 6);
}

#[test]
fn link_ends_match_node_points() {
    let input = lines(&[
        &[(0.0, 0.0), (10.0, 0.2)],
        &[(10.3, 0.0), (20.0, 5.0), (30.0, 0.0)],
        &[(15.0, -5.0), (15.0, 10.0)],
    ]);
    let network = Network::from_lines(&input, NetworkOptions::with_tolerance(0.5)).unwrap();
    for link in network.links() {
        let first = link.geometry.0[0];
        let last = link.geometry.0[link.geometry.0.len() - 1];
        assert_eq!(geo::Point::from(first), network.node(link.node_from).unwrap().point);
        assert_eq!(geo::Point::from(last), network.node(link.node_to).unwrap().point);
        assert!(link.length() > 0.0);
    }
}

#[test]
fn network_survives_geopackage_round_trip() {
    let input = lines(&[&[(0.0, 0.0), (20.0, 0.0)], &[(10.0, 0.0), (10.0, 10.0)]])
        .into_iter()
        .map(|l| l.with("code", "OWL-1"))
        .collect::<Vec<_>>();
    let network = Network::from_lines(&input, NetworkOptions::default()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("network.gpkg");
    network.to_gpkg(&path).unwrap();

    let read = Network::from_gpkg(&path, NetworkOptions::default()).unwrap();
    assert_eq!(read.node_count(), 4);
    assert_eq!(read.link_count(), 3);
    for (a, b) in network.links().zip(read.links()) {
        assert_eq!(a.node_from, b.node_from);
        assert_eq!(a.node_to, b.node_to);
        assert_eq!(a.geometry, b.geometry);
        assert_eq!(b.attributes["code"].as_str(), Some("OWL-1"));
    }
    for (a, b) in network.nodes().zip(read.nodes()) {
        assert_eq!(a, b);
    }
}
