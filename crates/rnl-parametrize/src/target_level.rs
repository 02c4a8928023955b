//! Target levels (streefpeil) of the Basins next to a structure.

use geo::Area;
use rnl_core::NodeId;
use rnl_model::{BasinArea, Model, NodeType};

use crate::error::{ParamError, ParamResult};

const STRUCTURES: [NodeType; 3] = [
    NodeType::Outlet,
    NodeType::Pump,
    NodeType::TabulatedRatingCurve,
];

/// `meta_streefpeil` of the first area row of a Basin.
pub fn basin_streefpeil(model: &Model, basin_id: NodeId) -> Option<f64> {
    model
        .rows_of::<BasinArea>(basin_id)
        .find_map(|area| area.meta_streefpeil)
}

/// Total area of a Basin's area rows, `None` without rows.
pub fn basin_area(model: &Model, basin_id: NodeId) -> Option<f64> {
    let mut rows = model.rows_of::<BasinArea>(basin_id).peekable();
    rows.peek()?;
    Some(rows.map(|area| area.geometry.unsigned_area()).sum())
}

fn check_structure(model: &Model, node_id: NodeId) -> ParamResult<()> {
    let node_type = model.node_type(node_id)?;
    if STRUCTURES.contains(&node_type) {
        Ok(())
    } else {
        Err(ParamError::UnsupportedNodeType {
            node_id,
            node_type,
            expected: "Outlet, Pump or TabulatedRatingCurve",
        })
    }
}

fn basin_level(model: &Model, neighbour: Option<NodeId>) -> Option<f64> {
    let neighbour = neighbour?;
    match model.node_type(neighbour) {
        Ok(NodeType::Basin) => basin_streefpeil(model, neighbour),
        _ => None,
    }
}

/// Streefpeil of the single upstream Basin of a structure, if any.
pub fn upstream_target_level(model: &Model, node_id: NodeId) -> ParamResult<Option<f64>> {
    check_structure(model, node_id)?;
    let upstream = model.upstream_node_id(node_id)?.single();
    Ok(basin_level(model, upstream))
}

/// Streefpeil of the single downstream Basin of a structure, if any.
pub fn downstream_target_level(model: &Model, node_id: NodeId) -> ParamResult<Option<f64>> {
    check_structure(model, node_id)?;
    let downstream = model.downstream_node_id(node_id)?.single();
    Ok(basin_level(model, downstream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{canal, id};

    #[test]
    fn levels_around_outlet() {
        let model = canal();
        // Basin 4 (streefpeil 0.5) -> Outlet 5 -> LevelBoundary 6
        assert_eq!(upstream_target_level(&model, id(5)).unwrap(), Some(0.5));
        assert_eq!(downstream_target_level(&model, id(5)).unwrap(), None);
        // Basin 2 -> Pump 8 -> Basin 4
        assert_eq!(downstream_target_level(&model, id(8)).unwrap(), Some(0.5));
    }

    #[test]
    fn area_sums_rows() {
        let model = canal();
        approx::assert_relative_eq!(basin_area(&model, id(4)).unwrap(), 40_000.0, epsilon = 1e-6);
        assert_eq!(basin_area(&model, id(3)), None);
    }

    #[test]
    fn basin_is_not_a_structure() {
        let model = canal();
        assert!(matches!(
            upstream_target_level(&model, id(2)),
            Err(ParamError::UnsupportedNodeType { node_type: NodeType::Basin, .. })
        ));
    }
}
