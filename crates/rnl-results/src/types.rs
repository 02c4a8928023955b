//! Result data types.

use chrono::NaiveDateTime;
use rnl_core::{LinkId, NodeId};
use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    /// File stem of the root descriptor.
    pub model_name: String,
    pub toml_path: String,
    pub timestamp: String,
    /// SHA-256 of the bundle files.
    pub bundle_hash: String,
    pub solver_version: String,
    pub exit_code: i32,
    pub computation_time_s: f64,
}

/// One row of `basin.arrow`.
#[derive(Debug, Clone, PartialEq)]
pub struct BasinResult {
    pub time: NaiveDateTime,
    pub node_id: NodeId,
    pub level: f64,
    /// Absent when the solver did not write storages.
    pub storage: Option<f64>,
}

/// One row of `flow.arrow`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowResult {
    pub time: NaiveDateTime,
    /// Empty for the implicit flows of boundary nodes.
    pub link_id: Option<LinkId>,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub flow_rate: f64,
}
