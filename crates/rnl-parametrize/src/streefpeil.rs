//! Streefpeil assignment from peilgebieden to Basin areas.
//!
//! Per Basin the candidate peilgebieden are those overlapping a 100 m buffer
//! around its downstream nodes, else those overlapping the Basin itself.
//! Selection then prefers, in order:
//! 1. a peilgebied covering more than half of the Basin,
//! 2. the lowest streefpeil among peilgebieden covering more than 2.5 %,
//! 3. the lowest streefpeil among all overlapping peilgebieden,
//! 4. the candidate nearest to the Basin's representative point, or the
//!    nearest of all peilgebieden when there are no candidates.

use std::path::Path;

use geo::{BoundingRect, Distance, Euclidean, Intersects, MultiPolygon, Polygon};
use rnl_core::NodeId;
use rnl_geometry::{BasinGeometry, basin_to_point, buffer_point};
use rnl_gpkg::GeoPackage;
use rnl_model::{BasinArea, Model, NodeType};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};
use tracing::{debug, info, warn};

use crate::error::ParamResult;

pub const DOWNSTREAM_BUFFER: f64 = 100.0;
const DOMINANT_FRACTION: f64 = 0.5;
const MIN_FRACTION: f64 = 0.025;
/// Streefpeilen at or above this value are no-data markers.
const MAX_LEVEL: f64 = 100.0;

/// A polygon with a target level.
#[derive(Debug, Clone, PartialEq)]
pub struct Peilgebied {
    pub geometry: Polygon<f64>,
    pub streefpeil: f64,
    pub code: Option<String>,
}

fn valid_level(level: f64) -> bool {
    level.is_finite() && level != 0.0 && level < MAX_LEVEL
}

/// Peilgebieden from a polygon layer; multipolygons are exploded and rows
/// without a valid streefpeil are skipped.
pub fn read_peilgebieden(
    path: &Path,
    layer: &str,
    level_column: &str,
    code_column: &str,
) -> ParamResult<Vec<Peilgebied>> {
    let gpkg = GeoPackage::open(path)?;
    let layer = gpkg.read_layer(layer)?;
    let mut peilgebieden = Vec::new();
    for feature in &layer.features {
        let Some(level) = feature.get_f64(level_column).filter(|l| valid_level(*l)) else {
            continue;
        };
        let Some(geometry) = feature.geometry.clone() else {
            continue;
        };
        let code = feature.get_str(code_column).map(str::to_string);
        for polygon in BasinGeometry::from_geometry(geometry)?.explode() {
            peilgebieden.push(Peilgebied {
                geometry: polygon,
                streefpeil: level,
                code: code.clone(),
            });
        }
    }
    debug!(count = peilgebieden.len(), "read peilgebieden");
    Ok(peilgebieden)
}

type Envelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Peilgebieden with an envelope index.
pub struct PeilgebiedIndex {
    peilgebieden: Vec<Peilgebied>,
    tree: RTree<Envelope>,
}

fn aabb(polygon: &Polygon<f64>) -> Option<AABB<[f64; 2]>> {
    polygon
        .bounding_rect()
        .map(|r| AABB::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]))
}

impl PeilgebiedIndex {
    pub fn new(peilgebieden: Vec<Peilgebied>) -> Self {
        let peilgebieden: Vec<Peilgebied> = peilgebieden
            .into_iter()
            .filter(|p| valid_level(p.streefpeil))
            .collect();
        let items = peilgebieden
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let r = p.geometry.bounding_rect()?;
                Some(GeomWithData::new(
                    Rectangle::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]),
                    i,
                ))
            })
            .collect();
        Self {
            peilgebieden,
            tree: RTree::bulk_load(items),
        }
    }

    pub fn len(&self) -> usize {
        self.peilgebieden.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peilgebieden.is_empty()
    }

    fn overlapping(&self, area: &MultiPolygon<f64>) -> Vec<usize> {
        let mut found: Vec<usize> = area
            .0
            .iter()
            .filter_map(aabb)
            .flat_map(|envelope| {
                self.tree
                    .locate_in_envelope_intersecting(&envelope)
                    .map(|item| item.data)
                    .collect::<Vec<_>>()
            })
            .filter(|i| self.peilgebieden[*i].geometry.intersects(area))
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }
}

/// Chosen peilgebied for one Basin.
#[derive(Debug, Clone, PartialEq)]
pub struct StreefpeilMatch {
    pub streefpeil: f64,
    pub code: Option<String>,
}

fn lowest<'a>(index: &'a PeilgebiedIndex, candidates: impl Iterator<Item = usize>) -> Option<&'a Peilgebied> {
    candidates
        .map(|i| &index.peilgebieden[i])
        .min_by(|a, b| a.streefpeil.total_cmp(&b.streefpeil))
}

/// Select the peilgebied of one Basin.
pub fn select_streefpeil(
    index: &PeilgebiedIndex,
    basin: &BasinGeometry,
    downstream: &[geo::Point<f64>],
) -> ParamResult<Option<StreefpeilMatch>> {
    let mut search = MultiPolygon::new(Vec::new());
    for point in downstream {
        search = geo::BooleanOps::union(
            &search,
            &MultiPolygon::new(vec![buffer_point(*point, DOWNSTREAM_BUFFER)?]),
        );
    }
    let mut candidates = if search.0.is_empty() {
        Vec::new()
    } else {
        index.overlapping(&search)
    };
    if candidates.is_empty() {
        candidates = index.overlapping(&basin.to_multi_polygon());
    }

    let basin_area = basin.area();
    let fractions: Vec<(usize, f64)> = candidates
        .iter()
        .map(|&i| {
            let overlap = basin.intersection_area(&index.peilgebieden[i].geometry);
            (i, if basin_area > 0.0 { overlap / basin_area } else { 0.0 })
        })
        .collect();

    let chosen = fractions
        .iter()
        .filter(|(_, f)| *f > DOMINANT_FRACTION)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| &index.peilgebieden[*i])
        .or_else(|| {
            lowest(
                index,
                fractions.iter().filter(|(_, f)| *f > MIN_FRACTION).map(|(i, _)| *i),
            )
        })
        .or_else(|| lowest(index, fractions.iter().filter(|(_, f)| *f > 0.0).map(|(i, _)| *i)));

    let chosen = match chosen {
        Some(p) => Some(p),
        None => {
            let point = basin_to_point(basin)?;
            let pool: Vec<&Peilgebied> = if candidates.is_empty() {
                index.peilgebieden.iter().collect()
            } else {
                candidates.iter().map(|&i| &index.peilgebieden[i]).collect()
            };
            pool.into_iter()
                .map(|p| (p, Euclidean::distance(&point, &p.geometry)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(p, _)| p)
        }
    };
    Ok(chosen.map(|p| StreefpeilMatch {
        streefpeil: p.streefpeil,
        code: p.code.clone(),
    }))
}

/// Write `meta_streefpeil` and `meta_code_waterbeheerder` on every Basin
/// area row. Returns the Basins without a match.
pub fn assign_streefpeil(model: &mut Model, index: &PeilgebiedIndex) -> ParamResult<Vec<NodeId>> {
    let mut matches: Vec<(NodeId, Option<StreefpeilMatch>)> = Vec::new();
    let mut unmatched = Vec::new();
    for node_id in model.node_ids_of_type(NodeType::Basin) {
        let polygons: Vec<Polygon<f64>> = model
            .rows_of::<BasinArea>(node_id)
            .flat_map(|area| area.geometry.0.iter().cloned())
            .collect();
        if polygons.is_empty() {
            warn!(%node_id, "basin without area, no streefpeil assigned");
            unmatched.push(node_id);
            continue;
        }
        let basin = BasinGeometry::MultiPolygon(MultiPolygon::new(polygons));
        let downstream: Vec<geo::Point<f64>> = model
            .downstream_node_id(node_id)?
            .to_vec()
            .into_iter()
            .filter_map(|id| model.node(id).ok().map(|n| n.geometry))
            .collect();
        let found = select_streefpeil(index, &basin, &downstream)?;
        if found.is_none() {
            warn!(%node_id, "no peilgebied found for basin");
            unmatched.push(node_id);
        }
        matches.push((node_id, found));
    }
    let assigned = matches.len() - unmatched.len();
    let areas = model.table_mut::<BasinArea>();
    for (node_id, found) in matches {
        for area in areas.iter_mut().filter(|a| a.node_id == node_id) {
            // an unmatched Basin loses the level of an earlier assignment
            area.meta_streefpeil = found.as_ref().map(|f| f.streefpeil);
            if let Some(found) = &found {
                area.meta_code_waterbeheerder = found.code.clone();
            }
        }
    }
    info!(assigned, unmatched = unmatched.len(), "assigned streefpeil to basins");
    Ok(unmatched)
}
