//! Upstream/downstream meta levels of structures and the basin-level check.

use std::collections::BTreeSet;

use rnl_core::NodeId;
use rnl_gpkg::Value;
use rnl_model::{LevelBoundaryStatic, Model, NodeType, OutletStatic, PumpStatic, StopAt};
use tracing::info;

use crate::error::ParamResult;
use crate::target_level::basin_streefpeil;

pub const CHECK_BASIN_LEVEL_COLUMN: &str = "meta_check_basin_level";

/// First Basin reached walking from `node_id`, else the first LevelBoundary.
fn nearest_level_node(model: &Model, node_id: NodeId, upstream: bool) -> ParamResult<Option<NodeId>> {
    let walk = |stop: NodeType| -> ParamResult<BTreeSet<NodeId>> {
        let stop = StopAt::node_type(stop);
        Ok(if upstream {
            model.upstream_nodes(node_id, &stop)?
        } else {
            model.downstream_nodes(node_id, &stop)?
        })
    };
    let first_of = |found: BTreeSet<NodeId>, node_type: NodeType| {
        found
            .into_iter()
            .filter(|id| *id != node_id)
            .find(|id| model.node_type(*id).is_ok_and(|t| t == node_type))
    };
    if let Some(basin) = first_of(walk(NodeType::Basin)?, NodeType::Basin) {
        return Ok(Some(basin));
    }
    Ok(first_of(walk(NodeType::LevelBoundary)?, NodeType::LevelBoundary))
}

fn level_of(model: &Model, node_id: NodeId) -> Option<f64> {
    match model.node_type(node_id).ok()? {
        NodeType::Basin => basin_streefpeil(model, node_id),
        NodeType::LevelBoundary => model
            .rows_of::<LevelBoundaryStatic>(node_id)
            .next()
            .map(|row| row.level),
        _ => None,
    }
}

/// From/to neighbours and their levels of one structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FromTo {
    pub from_node_id: Option<NodeId>,
    pub to_node_id: Option<NodeId>,
    pub from_level: Option<f64>,
    pub to_level: Option<f64>,
}

impl FromTo {
    fn attributes(&self) -> [(&'static str, Value); 4] {
        let id = |v: Option<NodeId>| v.map_or(Value::Null, |id| Value::from(id.get()));
        let level = |v: Option<f64>| v.map_or(Value::Null, Value::from);
        [
            ("meta_from_node_id", id(self.from_node_id)),
            ("meta_to_node_id", id(self.to_node_id)),
            ("meta_from_level", level(self.from_level)),
            ("meta_to_level", level(self.to_level)),
        ]
    }
}

pub fn from_to(model: &Model, node_id: NodeId) -> ParamResult<FromTo> {
    let from_node_id = nearest_level_node(model, node_id, true)?;
    let to_node_id = nearest_level_node(model, node_id, false)?;
    Ok(FromTo {
        from_node_id,
        to_node_id,
        from_level: from_node_id.and_then(|id| level_of(model, id)),
        to_level: to_node_id.and_then(|id| level_of(model, id)),
    })
}

/// Write `meta_from_node_id`, `meta_to_node_id`, `meta_from_level` and
/// `meta_to_level` on every Pump and Outlet and on their static rows.
pub fn add_from_to_nodes_and_levels(model: &mut Model) -> ParamResult<usize> {
    let mut found = Vec::new();
    for node_type in [NodeType::Pump, NodeType::Outlet] {
        for node_id in model.node_ids_of_type(node_type) {
            found.push((node_id, from_to(model, node_id)?));
        }
    }
    for (node_id, levels) in &found {
        let node = model.node_mut(*node_id)?;
        for (key, value) in levels.attributes() {
            node.set_meta(key, value);
        }
    }
    let lookup = |node_id: NodeId| found.iter().find(|(id, _)| *id == node_id).map(|(_, l)| *l);
    for row in model.table_mut::<PumpStatic>() {
        if let Some(levels) = lookup(row.node_id) {
            row.meta.extend(levels.attributes().map(|(k, v)| (k.to_string(), v)));
        }
    }
    for row in model.table_mut::<OutletStatic>() {
        if let Some(levels) = lookup(row.node_id) {
            row.0.meta.extend(levels.attributes().map(|(k, v)| (k.to_string(), v)));
        }
    }
    info!(count = found.len(), "added from/to nodes and levels");
    Ok(found.len())
}

/// Whether any direct downstream neighbour of a Basin carries a waterboard code.
pub fn check_basin_level(model: &Model, basin_id: NodeId) -> ParamResult<bool> {
    for neighbour in model.downstream_node_id(basin_id)?.to_vec() {
        if model.node(neighbour)?.meta_code_waterbeheerder.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Set `meta_check_basin_level` on every Basin. Returns the number flagged.
pub fn add_check_basin_level(model: &mut Model) -> ParamResult<usize> {
    let flags: Vec<(NodeId, bool)> = model
        .node_ids_of_type(NodeType::Basin)
        .into_iter()
        .map(|id| Ok((id, check_basin_level(model, id)?)))
        .collect::<ParamResult<_>>()?;
    let flagged = flags.iter().filter(|(_, f)| *f).count();
    for (node_id, flag) in flags {
        model.set_node_meta(node_id, CHECK_BASIN_LEVEL_COLUMN, flag)?;
    }
    info!(flagged, "added basin level checks");
    Ok(flagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::update_level_boundary_static;
    use crate::static_data::StaticData;
    use crate::test_support::{canal, id};

    #[test]
    fn from_to_resolves_basins_and_boundaries() {
        let mut model = canal();
        update_level_boundary_static(&mut model, &StaticData::default()).unwrap();

        let pump = from_to(&model, id(8)).unwrap();
        assert_eq!((pump.from_node_id, pump.to_node_id), (Some(id(2)), Some(id(4))));
        assert_eq!((pump.from_level, pump.to_level), (Some(1.0), Some(0.5)));

        let uitlaat = from_to(&model, id(5)).unwrap();
        assert_eq!(uitlaat.to_node_id, Some(id(6)));
        assert_eq!(uitlaat.to_level, Some(0.5));

        let inlaat = from_to(&model, id(10)).unwrap();
        assert_eq!(inlaat.from_node_id, Some(id(9)));
        assert_eq!(inlaat.from_level, Some(1.0));
    }

    #[test]
    fn levels_written_to_nodes() {
        let mut model = canal();
        update_level_boundary_static(&mut model, &StaticData::default()).unwrap();
        assert_eq!(add_from_to_nodes_and_levels(&mut model).unwrap(), 3);
        let node = model.node(id(8)).unwrap();
        assert_eq!(node.meta_f64("meta_from_node_id"), Some(2.0));
        assert_eq!(node.meta_f64("meta_to_level"), Some(0.5));
    }

    #[test]
    fn basin_upstream_of_coded_structure_is_checked() {
        let mut model = canal();
        // Basin 2 feeds Pump 8 (KGM8); Basin 4 feeds Outlet 5 (KST5)
        assert_eq!(add_check_basin_level(&mut model).unwrap(), 2);
        model.node_mut(id(5)).unwrap().meta_code_waterbeheerder = None;
        assert!(!check_basin_level(&model, id(4)).unwrap());
        assert!(check_basin_level(&model, id(2)).unwrap());
    }
}
