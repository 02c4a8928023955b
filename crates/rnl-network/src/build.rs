//! Network construction from raw line geometries.
//!
//! 1. drop zero-length lines
//! 2. snap endpoints within tolerance (representative point = mean)
//! 3. split lines at interior intersections
//! 4. collapse links shorter than the tolerance
//! 5. renumber nodes and links densely from 1

use std::collections::{BTreeMap, HashMap};

use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, LineString, Point};
use rnl_geometry::{line_length, project, substring};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};
use tracing::debug;

use crate::error::NetworkResult;
use crate::types::{InputLine, NetworkLink, NetworkNode, NetworkNodeType};

/// Distance below which two coordinates are treated as the same vertex.
const EPS: f64 = 1e-9;

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = i;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // lowest index becomes root, keeping cluster order stable
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

fn key(c: Coord<f64>) -> (u64, u64) {
    (c.x.to_bits(), c.y.to_bits())
}

fn dedup_line(line: &LineString<f64>) -> LineString<f64> {
    let mut coords = line.0.clone();
    coords.dedup();
    LineString::from(coords)
}

/// Working state: node positions plus lines with their end nodes.
struct Draft {
    nodes: Vec<Coord<f64>>,
    alive: Vec<bool>,
    links: Vec<DraftLink>,
}

struct DraftLink {
    from: usize,
    to: usize,
    geometry: LineString<f64>,
    input: usize,
}

impl Draft {
    fn anchor(&mut self, link: usize) {
        let (from, to) = (self.nodes[self.links[link].from], self.nodes[self.links[link].to]);
        let coords = &mut self.links[link].geometry.0;
        if let Some(first) = coords.first_mut() {
            *first = from;
        }
        if let Some(last) = coords.last_mut() {
            *last = to;
        }
    }
}

/// Step 2: cluster endpoints, returning node positions and per-line end nodes.
fn snap_endpoints(lines: &[(usize, LineString<f64>)], tolerance: f64) -> Draft {
    let endpoints: Vec<Coord<f64>> = lines
        .iter()
        .flat_map(|(_, l)| [l.0[0], l.0[l.0.len() - 1]])
        .collect();
    let mut uf = UnionFind::new(endpoints.len());

    let mut seen: HashMap<(u64, u64), usize> = HashMap::new();
    for (i, c) in endpoints.iter().enumerate() {
        match seen.get(&key(*c)) {
            Some(&j) => uf.union(i, j),
            None => {
                seen.insert(key(*c), i);
            }
        }
    }
    if tolerance > 0.0 {
        let tree = RTree::bulk_load(
            endpoints
                .iter()
                .enumerate()
                .map(|(i, c)| GeomWithData::new([c.x, c.y], i))
                .collect(),
        );
        for (i, c) in endpoints.iter().enumerate() {
            for neighbour in tree.locate_within_distance([c.x, c.y], tolerance * tolerance) {
                uf.union(i, neighbour.data);
            }
        }
    }

    // cluster root -> node index, in order of first appearance
    let mut cluster_of_root: HashMap<usize, usize> = HashMap::new();
    let mut members: Vec<Vec<Coord<f64>>> = Vec::new();
    let mut endpoint_node = Vec::with_capacity(endpoints.len());
    for (i, c) in endpoints.iter().enumerate() {
        let root = uf.find(i);
        let node = *cluster_of_root.entry(root).or_insert_with(|| {
            members.push(Vec::new());
            members.len() - 1
        });
        if !members[node].iter().any(|m| key(*m) == key(*c)) {
            members[node].push(*c);
        }
        endpoint_node.push(node);
    }
    let nodes: Vec<Coord<f64>> = members
        .iter()
        .map(|m| {
            let n = m.len() as f64;
            let (sx, sy) = m.iter().fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
            Coord { x: sx / n, y: sy / n }
        })
        .collect();

    let links = lines
        .iter()
        .enumerate()
        .map(|(i, (input, geometry))| DraftLink {
            from: endpoint_node[2 * i],
            to: endpoint_node[2 * i + 1],
            geometry: geometry.clone(),
            input: *input,
        })
        .collect();

    let alive = vec![true; nodes.len()];
    let mut draft = Draft {
        nodes,
        alive,
        links,
    };
    for i in 0..draft.links.len() {
        draft.anchor(i);
    }
    draft
}

type SegmentItem = GeomWithData<Rectangle<[f64; 2]>, (usize, usize)>;

/// Step 3: split lines at interior intersections.
fn split_at_intersections(draft: &mut Draft, tolerance: f64) {
    let snap = tolerance.max(EPS);
    let items: Vec<SegmentItem> = draft
        .links
        .iter()
        .enumerate()
        .flat_map(|(i, link)| {
            link.geometry.lines().enumerate().map(move |(s, seg)| {
                GeomWithData::new(
                    Rectangle::from_corners([seg.start.x, seg.start.y], [seg.end.x, seg.end.y]),
                    (i, s),
                )
            })
        })
        .collect();
    let tree = RTree::bulk_load(items);

    let mut split_points: Vec<Vec<Coord<f64>>> = vec![Vec::new(); draft.links.len()];
    for (i, link) in draft.links.iter().enumerate() {
        for seg in link.geometry.lines() {
            let envelope = AABB::from_corners(
                [seg.start.x.min(seg.end.x) - EPS, seg.start.y.min(seg.end.y) - EPS],
                [seg.start.x.max(seg.end.x) + EPS, seg.start.y.max(seg.end.y) + EPS],
            );
            for item in tree.locate_in_envelope_intersecting(&envelope) {
                let (j, s) = item.data;
                if j <= i {
                    continue;
                }
                let Some(other) = draft.links[j].geometry.lines().nth(s) else {
                    continue;
                };
                let Some(LineIntersection::SinglePoint { intersection, .. }) =
                    line_intersection(seg, other)
                else {
                    continue;
                };
                for k in [i, j] {
                    let line = &draft.links[k].geometry;
                    let (first, last) = (line.0[0], line.0[line.0.len() - 1]);
                    let near_end = [first, last]
                        .iter()
                        .any(|e| (e.x - intersection.x).hypot(e.y - intersection.y) <= snap);
                    if !near_end {
                        split_points[k].push(intersection);
                    }
                }
            }
        }
    }

    if split_points.iter().all(Vec::is_empty) {
        return;
    }

    // intersection points become nodes, reusing nodes within tolerance
    let mut node_tree: RTree<GeomWithData<[f64; 2], usize>> = RTree::bulk_load(
        draft
            .nodes
            .iter()
            .enumerate()
            .map(|(i, c)| GeomWithData::new([c.x, c.y], i))
            .collect(),
    );
    let mut next_links = Vec::with_capacity(draft.links.len());
    let links = std::mem::take(&mut draft.links);
    let mut created = 0usize;
    for (link, points) in links.into_iter().zip(split_points) {
        if points.is_empty() {
            next_links.push(link);
            continue;
        }
        let total = line_length(&link.geometry);
        let mut cuts: Vec<(f64, usize)> = Vec::new();
        for p in points {
            let node = match node_tree.nearest_neighbor(&[p.x, p.y]) {
                Some(n) if (n.geom()[0] - p.x).hypot(n.geom()[1] - p.y) <= snap => n.data,
                _ => {
                    draft.nodes.push(p);
                    draft.alive.push(true);
                    let index = draft.nodes.len() - 1;
                    node_tree.insert(GeomWithData::new([p.x, p.y], index));
                    created += 1;
                    index
                }
            };
            let Some(projection) = project(&link.geometry, Point::from(p)) else {
                continue;
            };
            let along = projection.distance_along;
            if along > EPS && along < total - EPS && !cuts.iter().any(|(d, _)| (d - along).abs() <= EPS) {
                cuts.push((along, node));
            }
        }
        cuts.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut start = 0.0;
        let mut from = link.from;
        for (along, node) in cuts.into_iter().chain(std::iter::once((total, link.to))) {
            if let Ok(piece) = substring(&link.geometry, start, along) {
                next_links.push(DraftLink {
                    from,
                    to: node,
                    geometry: piece,
                    input: link.input,
                });
            }
            start = along;
            from = node;
        }
    }
    draft.links = next_links;
    for i in 0..draft.links.len() {
        draft.anchor(i);
    }
    debug!(created, "split lines at intersections");
}

/// Step 4: drop links shorter than the tolerance, merging their end nodes.
fn collapse_short_links(draft: &mut Draft, tolerance: f64) {
    loop {
        let short = draft.links.iter().position(|l| {
            let length = line_length(&l.geometry);
            length < tolerance || (l.from == l.to && length <= EPS)
        });
        let Some(index) = short else {
            break;
        };
        let link = draft.links.remove(index);
        if link.from == link.to {
            continue;
        }
        let (keep, drop) = if link.from < link.to {
            (link.from, link.to)
        } else {
            (link.to, link.from)
        };
        draft.alive[drop] = false;
        for i in 0..draft.links.len() {
            let l = &mut draft.links[i];
            let touched = l.from == drop || l.to == drop;
            if l.from == drop {
                l.from = keep;
            }
            if l.to == drop {
                l.to = keep;
            }
            if touched {
                draft.anchor(i);
            }
        }
    }
}

/// Build node and link frames from input lines.
pub fn build(
    lines: &[InputLine],
    tolerance: f64,
) -> NetworkResult<(BTreeMap<u32, NetworkNode>, BTreeMap<u32, NetworkLink>)> {
    let cleaned: Vec<(usize, LineString<f64>)> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| (i, dedup_line(&l.geometry)))
        .filter(|(_, l)| l.0.len() >= 2 && line_length(l) > 0.0)
        .collect();
    let dropped = lines.len() - cleaned.len();
    if dropped > 0 {
        debug!(dropped, "dropped zero-length lines");
    }

    let mut draft = snap_endpoints(&cleaned, tolerance);
    split_at_intersections(&mut draft, tolerance);
    collapse_short_links(&mut draft, tolerance);

    // nodes still referenced by a link, numbered in creation order
    let mut used = vec![false; draft.nodes.len()];
    for link in &draft.links {
        used[link.from] = true;
        used[link.to] = true;
    }
    let mut new_id = vec![0u32; draft.nodes.len()];
    let mut next = 1u32;
    for (i, in_use) in used.iter().enumerate() {
        if *in_use && draft.alive[i] {
            new_id[i] = next;
            next += 1;
        }
    }

    let mut in_degree: HashMap<u32, usize> = HashMap::new();
    let mut out_degree: HashMap<u32, usize> = HashMap::new();
    let mut links = BTreeMap::new();
    for (i, link) in draft.links.into_iter().enumerate() {
        let (from, to) = (new_id[link.from], new_id[link.to]);
        *out_degree.entry(from).or_default() += 1;
        *in_degree.entry(to).or_default() += 1;
        let id = i as u32 + 1;
        links.insert(
            id,
            NetworkLink {
                id,
                node_from: from,
                node_to: to,
                geometry: link.geometry,
                attributes: lines[link.input].attributes.clone(),
            },
        );
    }

    let mut nodes = BTreeMap::new();
    for (i, c) in draft.nodes.iter().enumerate() {
        let id = new_id[i];
        if id == 0 {
            continue;
        }
        let node_type = NetworkNodeType::from_degree(
            in_degree.get(&id).copied().unwrap_or(0),
            out_degree.get(&id).copied().unwrap_or(0),
        );
        nodes.insert(
            id,
            NetworkNode {
                id,
                point: Point::from(*c),
                node_type,
            },
        );
    }
    debug!(nodes = nodes.len(), links = links.len(), "built network");
    Ok((nodes, links))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(coords: &[(f64, f64)]) -> InputLine {
        InputLine::new(LineString::from(coords.to_vec()))
    }

    #[test]
    fn zero_length_lines_are_dropped() {
        let (nodes, links) = build(&[line(&[(0.0, 0.0), (0.0, 0.0)]), line(&[(0.0, 0.0), (1.0, 0.0)])], 0.0).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn crossing_lines_split_both() {
        let (nodes, links) = build(
            &[line(&[(0.0, 0.0), (10.0, 0.0)]), line(&[(5.0, -5.0), (5.0, 5.0)])],
            0.0,
        )
        .unwrap();
        assert_eq!(nodes.len(), 5);
        assert_eq!(links.len(), 4);
        let centre = nodes.values().find(|n| n.point == Point::new(5.0, 0.0)).unwrap();
        assert_eq!(centre.node_type, NetworkNodeType::Intersection);
    }

    #[test]
    fn snapped_geometry_starts_at_node() {
        let (nodes, links) = build(
            &[line(&[(0.0, 0.0), (10.0, 0.0)]), line(&[(10.4, 0.0), (20.0, 0.0)])],
            0.5,
        )
        .unwrap();
        assert_eq!(nodes.len(), 3);
        for link in links.values() {
            assert_eq!(Point::from(link.geometry.0[0]), nodes[&link.node_from].point);
            assert_eq!(
                Point::from(*link.geometry.0.last().unwrap()),
                nodes[&link.node_to].point
            );
        }
    }

    #[test]
    fn attributes_follow_split_lines() {
        let (_, links) = build(
            &[
                line(&[(0.0, 0.0), (20.0, 0.0)]).with("code", "A"),
                line(&[(10.0, 0.0), (10.0, 10.0)]).with("code", "B"),
            ],
            0.0,
        )
        .unwrap();
        let codes: Vec<_> = links
            .values()
            .map(|l| l.attributes["code"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(codes, vec!["A", "A", "B"]);
    }
}
