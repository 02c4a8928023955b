//! LevelBoundary and FlowBoundary static tables.

use rnl_core::NodeId;
use rnl_model::{FlowBoundaryStatic, LevelBoundaryStatic, Model, NodeType, Table};
use tracing::info;

use crate::error::{ParamError, ParamResult};
use crate::static_data::StaticData;
use crate::target_level::basin_streefpeil;

/// Categorie of FlowBoundary rows written with the default flow rate.
pub const FLOW_BOUNDARY_CATEGORIE: &str = "Aanvoer Buitenland";

fn two_hops(model: &Model, node_id: NodeId, upstream: bool) -> ParamResult<Vec<NodeId>> {
    let step = |id: NodeId| {
        if upstream {
            model.upstream_node_id(id)
        } else {
            model.downstream_node_id(id)
        }
    };
    let mut basins = Vec::new();
    for connector in step(node_id)?.to_vec() {
        for candidate in step(connector)?.to_vec() {
            if model.node_type(candidate)? == NodeType::Basin && !basins.contains(&candidate) {
                basins.push(candidate);
            }
        }
    }
    Ok(basins)
}

fn min_streefpeil(model: &Model, basins: &[NodeId]) -> ParamResult<f64> {
    basins
        .iter()
        .filter_map(|id| basin_streefpeil(model, *id))
        .min_by(f64::total_cmp)
        .ok_or(ParamError::MissingStreefpeil { node_id: basins[0] })
}

/// Level of a LevelBoundary without override.
///
/// A boundary fed by a structure (outlet side) takes the lowest streefpeil of
/// the Basins upstream of that structure; otherwise (inlet side) the lowest
/// of the Basins downstream of the structure it feeds.
pub fn inherited_level(model: &Model, node_id: NodeId) -> ParamResult<f64> {
    model.expect_node_type(node_id, NodeType::LevelBoundary)?;
    if !model.upstream_node_id(node_id)?.to_vec().is_empty() {
        let basins = two_hops(model, node_id, true)?;
        if basins.is_empty() {
            return Err(ParamError::NoUpstreamBasin { node_id });
        }
        min_streefpeil(model, &basins)
    } else {
        let basins = two_hops(model, node_id, false)?;
        if basins.is_empty() {
            return Err(ParamError::NoDownstreamBasin { node_id });
        }
        min_streefpeil(model, &basins)
    }
}

pub fn level_boundary_static(
    model: &Model,
    static_data: &StaticData,
) -> ParamResult<Vec<LevelBoundaryStatic>> {
    model
        .nodes_of_type(NodeType::LevelBoundary)
        .map(|node| {
            let overrides = static_data.level_boundary_override(node);
            let level = match overrides.and_then(|o| o.level) {
                Some(level) => level,
                None => inherited_level(model, node.node_id)?,
            };
            let mut row = LevelBoundaryStatic::new(node.node_id, level);
            if let Some(code) = &node.meta_code_waterbeheerder {
                row.meta
                    .insert("meta_code_waterbeheerder".to_string(), code.as_str().into());
            }
            if let Some(remark) = overrides.and_then(|o| o.opmerking_waterbeheerder.as_deref()) {
                row.meta
                    .insert("meta_opmerking_waterbeheerder".to_string(), remark.into());
            }
            Ok(row)
        })
        .collect()
}

pub fn update_level_boundary_static(model: &mut Model, static_data: &StaticData) -> ParamResult<()> {
    let rows = level_boundary_static(model, static_data)?;
    info!(count = rows.len(), "updated LevelBoundary static table");
    model.set_table(Table::LevelBoundaryStatic(rows));
    Ok(())
}

/// Give FlowBoundary nodes without a categorised row a zero flow rate.
///
/// Rows that already carry `meta_categorie` are parameterized and kept.
/// Returns the number of rows written.
pub fn update_flow_boundary_static(model: &mut Model) -> usize {
    let keep: Vec<FlowBoundaryStatic> = model
        .table::<FlowBoundaryStatic>()
        .iter()
        .filter(|row| row.meta.contains_key("meta_categorie"))
        .cloned()
        .collect();
    let mut rows = keep.clone();
    let mut written = 0;
    for node in model.nodes_of_type(NodeType::FlowBoundary) {
        if keep.iter().any(|row| row.node_id == node.node_id) {
            continue;
        }
        let mut row = FlowBoundaryStatic::new(node.node_id, 0.0);
        row.meta
            .insert("meta_categorie".to_string(), FLOW_BOUNDARY_CATEGORIE.into());
        if let Some(code) = &node.meta_code_waterbeheerder {
            row.meta
                .insert("meta_code_waterbeheerder".to_string(), code.as_str().into());
        }
        rows.push(row);
        written += 1;
    }
    info!(written, "updated FlowBoundary static table");
    model.set_table(Table::FlowBoundaryStatic(rows));
    written
}
