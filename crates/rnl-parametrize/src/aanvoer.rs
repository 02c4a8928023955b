//! Supply (aanvoer) flags from supply-area polygons.

use geo::{Contains, MultiPolygon, Point};
use rnl_core::NodeId;
use rnl_gpkg::Value;
use rnl_model::{BasinArea, Model, NodeType, OutletStatic, PumpStatic};
use tracing::info;

pub const AANVOER_COLUMN: &str = "meta_aanvoer";

/// Number of nodes flagged per node type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AanvoerSummary {
    pub pumps: usize,
    pub outlets: usize,
    pub basins: usize,
}

fn inside(areas: &MultiPolygon<f64>, point: &Point<f64>) -> bool {
    areas.contains(point)
}

/// Flag Pumps, Outlets and Basins inside the supply areas.
///
/// Pumps and Outlets get `meta_aanvoer` 1 or 0 on the node and on their
/// static rows; outside the supply areas their `max_downstream_level` is
/// cleared. Basin area rows get `meta_aanvoer` from the Basin node location.
pub fn set_aanvoer_flags(model: &mut Model, supply_areas: &MultiPolygon<f64>) -> AanvoerSummary {
    let flagged = |model: &Model, node_type: NodeType| -> Vec<(NodeId, bool)> {
        model
            .nodes_of_type(node_type)
            .map(|node| (node.node_id, inside(supply_areas, &node.geometry)))
            .collect()
    };
    let pumps = flagged(model, NodeType::Pump);
    let outlets = flagged(model, NodeType::Outlet);
    let basins = flagged(model, NodeType::Basin);

    for (node_id, aanvoer) in pumps.iter().chain(&outlets) {
        if let Ok(node) = model.node_mut(*node_id) {
            node.set_meta(AANVOER_COLUMN, i64::from(*aanvoer));
        }
    }
    let lookup = |flags: &[(NodeId, bool)], node_id: NodeId| {
        flags.iter().find(|(id, _)| *id == node_id).map(|(_, a)| *a)
    };
    for row in model.table_mut::<PumpStatic>() {
        if let Some(aanvoer) = lookup(&pumps, row.node_id) {
            row.meta.insert(AANVOER_COLUMN.to_string(), Value::from(i64::from(aanvoer)));
            if !aanvoer {
                row.max_downstream_level = None;
            }
        }
    }
    for row in model.table_mut::<OutletStatic>() {
        if let Some(aanvoer) = lookup(&outlets, row.node_id) {
            row.0.meta.insert(AANVOER_COLUMN.to_string(), Value::from(i64::from(aanvoer)));
            if !aanvoer {
                row.0.max_downstream_level = None;
            }
        }
    }
    for area in model.table_mut::<BasinArea>() {
        if let Some(aanvoer) = lookup(&basins, area.node_id) {
            area.meta.insert(AANVOER_COLUMN.to_string(), Value::from(i64::from(aanvoer)));
        }
    }

    let count = |flags: &[(NodeId, bool)]| flags.iter().filter(|(_, a)| *a).count();
    let summary = AanvoerSummary {
        pumps: count(&pumps),
        outlets: count(&outlets),
        basins: count(&basins),
    };
    info!(
        pumps = summary.pumps,
        outlets = summary.outlets,
        basins = summary.basins,
        "set aanvoer flags"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_data::StaticData;
    use crate::structures::{populate_function, update_pump_outlet_static};
    use crate::test_support::{canal, id, square};

    #[test]
    fn structures_outside_lose_max_downstream_level() {
        let mut model = canal();
        let data = StaticData::default();
        populate_function(&mut model, &data);
        update_pump_outlet_static(&mut model, &data).unwrap();
        // covers Pump 8 and Basin 2, not Outlet 10
        let supply = square(1250.0, 100.0, 600.0);
        let summary = set_aanvoer_flags(&mut model, &supply);
        assert_eq!(summary, AanvoerSummary { pumps: 1, outlets: 0, basins: 1 });

        assert_eq!(model.node(id(8)).unwrap().meta_f64(AANVOER_COLUMN), Some(1.0));
        assert_eq!(model.node(id(10)).unwrap().meta_f64(AANVOER_COLUMN), Some(0.0));
        let pump = model.rows_of::<PumpStatic>(id(8)).next().unwrap();
        assert_eq!(pump.max_downstream_level, Some(0.3));
        let inlaat = model.rows_of::<OutletStatic>(id(10)).next().unwrap();
        assert_eq!(inlaat.max_downstream_level, None);
        assert_eq!(inlaat.meta.get(AANVOER_COLUMN), Some(&Value::Integer(0)));

        let area = |node_id| model.rows_of::<BasinArea>(id(node_id)).next().unwrap();
        assert_eq!(area(2).meta.get(AANVOER_COLUMN), Some(&Value::Integer(1)));
        assert_eq!(area(4).meta.get(AANVOER_COLUMN), Some(&Value::Integer(0)));
    }
}
