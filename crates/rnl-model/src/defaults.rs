//! Placeholder sub-table rows for new nodes and `reset_static_tables`.

use std::collections::BTreeMap;

use rnl_core::NodeId;
use tracing::info;

use crate::error::ModelResult;
use crate::model::Model;
use crate::node_type::NodeType;
use crate::tables::{
    BasinForcing, BasinProfile, BasinState, BasinStatic, FlowBoundaryStatic,
    FractionalFlowStatic, LevelBoundaryStatic, LinearResistanceStatic, ManningResistanceStatic,
    OutletStatic, PumpStatic, StructureStatic, TabulatedRatingCurveStatic, Table, TableKind,
};

pub const BASIN_PROFILE: [(f64, f64); 2] = [(0.0, 0.01), (1.0, 1000.0)];
pub const RATING_CURVE: [(f64, f64); 2] = [(0.0, 0.0), (5.0, 0.1)];
pub const PUMP_FLOW_RATE: f64 = 0.1;
pub const OUTLET_FLOW_RATE: f64 = 5.0;
pub const FLOW_BOUNDARY_FLOW_RATE: f64 = 0.1;
pub const LEVEL_BOUNDARY_LEVEL: f64 = 0.1;
/// (length, manning_n, profile_width, profile_slope)
pub const MANNING: (f64, f64, f64, f64) = (100.0, 0.04, 10.0, 1.0);
pub const LINEAR_RESISTANCE: f64 = 1.0;

fn zero_forcing() -> BasinForcing {
    BasinForcing {
        precipitation: Some(0.0),
        potential_evaporation: Some(0.0),
        drainage: Some(0.0),
        infiltration: Some(0.0),
        surface_runoff: None,
    }
}

/// Placeholder tables for one node. Basin area is left out: it needs a geometry.
pub fn default_tables(node_type: NodeType, node_id: NodeId) -> Vec<Table> {
    match node_type {
        NodeType::Basin => vec![
            Table::BasinProfile(
                BASIN_PROFILE
                    .iter()
                    .map(|&(level, area)| BasinProfile {
                        node_id,
                        level,
                        area,
                    })
                    .collect(),
            ),
            Table::BasinState(vec![BasinState {
                node_id,
                level: BASIN_PROFILE[1].0,
            }]),
            Table::BasinStatic(vec![BasinStatic {
                node_id,
                forcing: zero_forcing(),
            }]),
        ],
        NodeType::TabulatedRatingCurve => vec![Table::TabulatedRatingCurveStatic(
            RATING_CURVE
                .iter()
                .map(|&(level, flow_rate)| TabulatedRatingCurveStatic::new(node_id, level, flow_rate))
                .collect(),
        )],
        NodeType::Pump => vec![Table::PumpStatic(vec![PumpStatic::new(
            node_id,
            PUMP_FLOW_RATE,
        )])],
        NodeType::Outlet => vec![Table::OutletStatic(vec![OutletStatic(StructureStatic::new(
            node_id,
            OUTLET_FLOW_RATE,
        ))])],
        NodeType::FlowBoundary => vec![Table::FlowBoundaryStatic(vec![FlowBoundaryStatic::new(
            node_id,
            FLOW_BOUNDARY_FLOW_RATE,
        )])],
        NodeType::LevelBoundary => vec![Table::LevelBoundaryStatic(vec![
            LevelBoundaryStatic::new(node_id, LEVEL_BOUNDARY_LEVEL),
        ])],
        NodeType::ManningResistance => {
            let (length, manning_n, profile_width, profile_slope) = MANNING;
            vec![Table::ManningResistanceStatic(vec![ManningResistanceStatic::new(
                node_id,
                length,
                manning_n,
                profile_width,
                profile_slope,
            )])]
        }
        NodeType::LinearResistance => vec![Table::LinearResistanceStatic(vec![
            LinearResistanceStatic {
                node_id,
                active: None,
                resistance: LINEAR_RESISTANCE,
                max_flow_rate: None,
                control_state: None,
            },
        ])],
        NodeType::FractionalFlow => vec![Table::FractionalFlowStatic(vec![FractionalFlowStatic {
            node_id,
            fraction: 1.0,
            control_state: None,
        }])],
        _ => Vec::new(),
    }
}

impl Model {
    /// Replace the static tables of every node type present in the model by
    /// placeholder rows. Basin area and time tables are kept.
    pub fn reset_static_tables(&mut self) -> ModelResult<()> {
        let mut by_type: BTreeMap<NodeType, Vec<NodeId>> = BTreeMap::new();
        for node in self.nodes() {
            by_type.entry(node.node_type).or_default().push(node.node_id);
        }
        for (node_type, node_ids) in by_type {
            let mut fresh: BTreeMap<TableKind, Table> = BTreeMap::new();
            for node_id in node_ids {
                for table in default_tables(node_type, node_id) {
                    let kind = table.kind();
                    match fresh.get_mut(&kind) {
                        Some(existing) => existing.append(table)?,
                        None => {
                            fresh.insert(kind, table);
                        }
                    }
                }
            }
            for (kind, table) in fresh {
                info!(table = %kind, rows = table.len(), "reset table");
                self.set_table(table);
            }
        }
        Ok(())
    }
}
