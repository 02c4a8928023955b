//! Storage (berging) Basins fed by groundwater statistics.
//!
//! Every primary Basin gets a bergend Basin just east of it, draining into the
//! primary Basin through a TabulatedRatingCurve. The curve follows the
//! drainage relation of the area: no flow at GLG + 1 m below ground, up to
//! twice the mean discharge at ground level.

use std::path::Path;

use geo::{Area, MultiPolygon, Point};
use rnl_core::{NodeId, SECONDS_PER_DAY, round_decimals};
use rnl_model::{
    BasinArea, BasinProfile, BasinState, Model, NodeAttrs, NodeType, TabulatedRatingCurveStatic,
    Table,
};
use rnl_raster::{Raster, ZonalOptions, read_raster, zonal_stats};
use tracing::{debug, info};

use crate::error::{ParamError, ParamResult};

pub const BERGEND: &str = "bergend";
/// Fill value for missing mean discharge, in mm/day.
pub const MA_FILL_VALUE: f64 = 37.0;
/// Eastward offset of the storage Basin from its primary Basin.
pub const STORAGE_OFFSET: f64 = 5.0;

/// Rasters sampled per Basin. `ghg` and `glg` hold groundwater heads, `ma`
/// the mean discharge in mm/day. All share the grid of `maaiveld`.
#[derive(Debug, Clone)]
pub struct BergingRasters {
    pub maaiveld: Raster,
    pub ghg: Raster,
    pub glg: Raster,
    pub ma: Raster,
}

impl BergingRasters {
    /// Read the four rasters (GeoTIFF or ESRI ASCII) and check they share a grid.
    pub fn load(maaiveld: &Path, ghg: &Path, glg: &Path, ma: &Path) -> ParamResult<Self> {
        let rasters = Self {
            maaiveld: read_raster(maaiveld)?,
            ghg: read_raster(ghg)?,
            glg: read_raster(glg)?,
            ma: read_raster(ma)?,
        };
        for (name, raster) in [("ghg", &rasters.ghg), ("glg", &rasters.glg), ("ma", &rasters.ma)] {
            if !raster.same_grid(&rasters.maaiveld) {
                return Err(ParamError::invalid(format!(
                    "{name} raster does not share the maaiveld grid"
                )));
            }
        }
        debug!(shape = ?rasters.maaiveld.shape(), "loaded berging rasters");
        Ok(rasters)
    }
}

/// Basin statistics. `ghg` and `glg` are depths below ground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasinStatistics {
    pub maaiveld: f64,
    pub maaiveld_min: f64,
    pub maaiveld_max: f64,
    pub ghg: f64,
    pub glg: f64,
    pub ma: f64,
}

pub fn basin_statistics(
    rasters: &BergingRasters,
    area: &MultiPolygon<f64>,
    node_id: NodeId,
) -> ParamResult<BasinStatistics> {
    let touched = ZonalOptions {
        all_touched: true,
        fill_value: None,
    };
    let missing = |what| ParamError::MissingSamples { node_id, what };
    let depth = |head: &Raster| -> ParamResult<f64> {
        let depth = rasters.maaiveld.combine(head, |maaiveld, head| maaiveld - head)?;
        Ok(zonal_stats(&depth, area, touched).map(|s| s.mean).unwrap_or(f64::NAN))
    };
    let maaiveld = zonal_stats(&rasters.maaiveld, area, touched).ok_or_else(|| missing("maaiveld"))?;
    let ghg = depth(&rasters.ghg)?;
    let glg = depth(&rasters.glg)?;
    let ma = zonal_stats(
        &rasters.ma,
        area,
        ZonalOptions {
            fill_value: Some(MA_FILL_VALUE),
            ..touched
        },
    )
    .map(|s| s.mean);
    let ma = ma.ok_or_else(|| missing("ma"))?;
    if ghg.is_nan() {
        return Err(missing("ghg"));
    }
    if glg.is_nan() {
        return Err(missing("glg"));
    }
    Ok(BasinStatistics {
        maaiveld: maaiveld.mean,
        maaiveld_min: maaiveld.min,
        maaiveld_max: maaiveld.max,
        ghg,
        glg,
        ma,
    })
}

/// `(level, flow_rate)` of the storage outflow curve.
///
/// Depths below ground are `[glg + 1, glg, ghg, ghg / 2, 0]` (negative
/// depths become 0) with flows of `[0, 0.2, 0.33, 0.5, 2]` times `ma`. Levels
/// are kept at or above `min_level`; repeated levels keep their first row,
/// repeated flows their last.
pub fn storage_rating_curve(stats: &BasinStatistics, area: f64, min_level: f64) -> Vec<(f64, f64)> {
    let depths = [stats.glg + 1.0, stats.glg, stats.ghg, stats.ghg / 2.0, 0.0];
    let factors = [0.0, 0.2, 0.33, 0.5, 2.0];
    let rows: Vec<(f64, f64)> = depths
        .iter()
        .zip(factors)
        .map(|(depth, factor)| {
            let depth = round_decimals(*depth, 2).max(0.0);
            let level = (stats.maaiveld - depth).max(min_level);
            let mm_per_day = round_decimals(stats.ma * factor, 2);
            let flow_rate = mm_per_day / 1000.0 * area / SECONDS_PER_DAY;
            (round_decimals(level, 2), round_decimals(flow_rate, 5))
        })
        .collect();

    let mut first_levels: Vec<(f64, f64)> = Vec::with_capacity(rows.len());
    for row in rows {
        if !first_levels.iter().any(|(level, _)| *level == row.0) {
            first_levels.push(row);
        }
    }
    first_levels
        .iter()
        .enumerate()
        .filter(|(i, (_, flow))| !first_levels[i + 1..].iter().any(|(_, f)| f == flow))
        .map(|(_, row)| *row)
        .collect()
}

/// Profile of the storage Basin: 5 % of the area (at least 1 m²) at the
/// lowest ground level, the full area at the highest.
pub fn storage_profile(node_id: NodeId, stats: &BasinStatistics, area: f64) -> Vec<BasinProfile> {
    let max_level = round_decimals(stats.maaiveld_max, 2);
    let mut min_level = round_decimals(stats.maaiveld_min, 2);
    if min_level >= max_level {
        min_level = max_level - 0.1;
    }
    vec![
        BasinProfile {
            node_id,
            level: min_level,
            area: (0.05 * area).max(1.0),
        },
        BasinProfile {
            node_id,
            level: max_level,
            area,
        },
    ]
}

pub(crate) fn basin_geometry(model: &Model, node_id: NodeId) -> ParamResult<MultiPolygon<f64>> {
    let polygons: Vec<_> = model
        .rows_of::<BasinArea>(node_id)
        .flat_map(|area| area.geometry.0.iter().cloned())
        .collect();
    if polygons.is_empty() {
        return Err(ParamError::MissingBasinArea { node_id });
    }
    Ok(MultiPolygon::new(polygons))
}

fn has_storage(model: &Model, basin_id: NodeId) -> bool {
    model
        .incoming_links(basin_id)
        .iter()
        .any(|link| link.meta_categorie.as_deref() == Some(BERGEND))
}

fn add_storage(
    model: &mut Model,
    basin_id: NodeId,
    geometry: MultiPolygon<f64>,
    stats: &BasinStatistics,
) -> ParamResult<NodeId> {
    let area = geometry.unsigned_area();
    let location = model.node(basin_id)?.geometry;
    let profile = storage_profile(basin_id, stats, area);
    let bottom = profile[0].level;
    let curve = storage_rating_curve(stats, area, bottom);

    let storage_id = model.add_node(
        NodeType::Basin,
        Point::new(location.x() + STORAGE_OFFSET, location.y()),
        NodeAttrs {
            meta_categorie: Some(BERGEND.to_string()),
            tables: vec![
                Table::BasinProfile(profile),
                Table::BasinState(vec![BasinState {
                    node_id: basin_id,
                    level: bottom + 0.1,
                }]),
                Table::BasinArea(vec![BasinArea::new(basin_id, geometry)]),
            ],
            ..NodeAttrs::default()
        },
    )?;
    let curve = curve
        .into_iter()
        .map(|(level, flow_rate)| TabulatedRatingCurveStatic::new(storage_id, level, flow_rate))
        .collect();
    let rating_curve_id = model.add_and_connect_node(
        storage_id,
        basin_id,
        Point::new(location.x() + STORAGE_OFFSET / 2.0, location.y()),
        NodeType::TabulatedRatingCurve,
        NodeAttrs {
            meta_categorie: Some(BERGEND.to_string()),
            tables: vec![Table::TabulatedRatingCurveStatic(curve)],
            ..NodeAttrs::default()
        },
    )?;
    for (from, to) in [(storage_id, rating_curve_id), (rating_curve_id, basin_id)] {
        if let Some(link_id) = model.find_link(from, to).map(|link| link.link_id) {
            model.link_mut(link_id)?.meta_categorie = Some(BERGEND.to_string());
        }
    }
    debug!(%basin_id, %storage_id, %rating_curve_id, "added storage basin");
    Ok(storage_id)
}

/// Add a storage Basin to every primary Basin that has none yet.
///
/// Statistics are sampled for all Basins before the model is changed, so a
/// Basin without samples leaves the model as it was.
pub fn add_berging(model: &mut Model, rasters: &BergingRasters) -> ParamResult<Vec<NodeId>> {
    let primary: Vec<NodeId> = model
        .nodes_of_type(NodeType::Basin)
        .filter(|node| node.meta_categorie.as_deref() != Some(BERGEND))
        .map(|node| node.node_id)
        .filter(|id| !has_storage(model, *id))
        .collect();
    let mut planned = Vec::with_capacity(primary.len());
    for basin_id in primary {
        let geometry = basin_geometry(model, basin_id)?;
        let stats = basin_statistics(rasters, &geometry, basin_id)?;
        planned.push((basin_id, geometry, stats));
    }
    let mut added = Vec::with_capacity(planned.len());
    for (basin_id, geometry, stats) in planned {
        added.push(add_storage(model, basin_id, geometry, &stats)?);
    }
    info!(count = added.len(), "added berging");
    Ok(added)
}
