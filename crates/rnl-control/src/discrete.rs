//! DiscreteControl condition and logic tables.
//!
//! A DiscreteControl node compares one variable of a listened node against
//! a sorted list of thresholds. With `n` thresholds there are `n` logic rows;
//! row `i` is active when exactly the first `i` conditions hold, so its
//! truth state is `i` times `T` followed by `n - i` times `F`.

use rnl_core::NodeId;
use rnl_gpkg::Value;
use rnl_model::{DiscreteControlCondition, DiscreteControlLogic, StructureStatic, Table};

use crate::error::{ControlError, ControlResult};

pub const FLOW_RATE: &str = "flow_rate";
pub const LEVEL: &str = "level";
pub const REMARKS: &str = "remarks";

/// `{prefix}_1` up to `{prefix}_{n}`.
pub fn control_states(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{prefix}_{i}")).collect()
}

/// Truth states of `n` stacked thresholds: `"FF..F"`, `"TF..F"`, ...
pub fn truth_states(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| "T".repeat(i) + &"F".repeat(n - i))
        .collect()
}

/// Condition and logic rows of one DiscreteControl node.
///
/// Rows are keyed on `node_id`; [`crate::add_discrete_control`] re-keys them
/// on the node it creates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscreteControlTables {
    pub condition: Vec<DiscreteControlCondition>,
    pub logic: Vec<DiscreteControlLogic>,
}

impl DiscreteControlTables {
    /// One condition per threshold on `variable` of `listen_node_id`, one
    /// logic row per control state.
    pub fn from_thresholds(
        node_id: NodeId,
        listen_node_id: NodeId,
        variable: &str,
        values: &[f64],
        states: &[String],
    ) -> ControlResult<Self> {
        if values.is_empty() {
            return Err(ControlError::invalid("no thresholds"));
        }
        if values.len() != states.len() {
            return Err(ControlError::invalid(format!(
                "{} thresholds for {} control states",
                values.len(),
                states.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ControlError::invalid("thresholds must be finite"));
        }
        let condition = values
            .iter()
            .zip(states)
            .map(|(value, state)| DiscreteControlCondition {
                node_id,
                listen_node_id,
                variable: variable.to_string(),
                greater_than: *value,
                meta: [(REMARKS.to_string(), Value::from(state.as_str()))].into(),
            })
            .collect();
        let logic = truth_states(values.len())
            .into_iter()
            .zip(states)
            .map(|(truth_state, state)| DiscreteControlLogic {
                node_id,
                truth_state,
                control_state: state.clone(),
            })
            .collect();
        Ok(Self { condition, logic })
    }

    /// Flow-rate thresholds with states named `{prefix}_{i}`.
    pub fn flow_thresholds(
        node_id: NodeId,
        listen_node_id: NodeId,
        values: &[f64],
        prefix: &str,
    ) -> ControlResult<Self> {
        let states = control_states(prefix, values.len());
        Self::from_thresholds(node_id, listen_node_id, FLOW_RATE, values, &states)
    }

    /// Two-state control on the level of one Basin: `control_states[0]`
    /// below `threshold`, `control_states[1]` above it.
    pub fn single_basin(
        node_id: NodeId,
        listen_node_id: NodeId,
        control_states: [&str; 2],
        threshold: f64,
    ) -> Self {
        let [low, high] = control_states;
        Self {
            condition: vec![DiscreteControlCondition {
                node_id,
                listen_node_id,
                variable: LEVEL.to_string(),
                greater_than: threshold,
                meta: Default::default(),
            }],
            logic: vec![
                DiscreteControlLogic {
                    node_id,
                    truth_state: "F".to_string(),
                    control_state: low.to_string(),
                },
                DiscreteControlLogic {
                    node_id,
                    truth_state: "T".to_string(),
                    control_state: high.to_string(),
                },
            ],
        }
    }

    pub fn with_node_id(mut self, node_id: NodeId) -> Self {
        for row in &mut self.condition {
            row.node_id = node_id;
        }
        for row in &mut self.logic {
            row.node_id = node_id;
        }
        self
    }

    /// Control states in logic order, without duplicates.
    pub fn control_states(&self) -> Vec<&str> {
        let mut states: Vec<&str> = Vec::new();
        for row in &self.logic {
            if !states.contains(&row.control_state.as_str()) {
                states.push(&row.control_state);
            }
        }
        states
    }

    pub fn into_tables(self) -> Vec<Table> {
        vec![
            Table::DiscreteControlCondition(self.condition),
            Table::DiscreteControlLogic(self.logic),
        ]
    }
}

/// Convenience for [`DiscreteControlTables::single_basin`] on a node that
/// doesn't exist yet.
pub fn discrete_control_tables_single_basin(
    listen_node_id: NodeId,
    control_states: [&str; 2],
    threshold: f64,
) -> DiscreteControlTables {
    DiscreteControlTables::single_basin(NodeId::MIN, listen_node_id, control_states, threshold)
}

/// Pump or Outlet rows with one flow rate per control state.
pub fn structure_states(node_id: NodeId, flow_rates: &[f64], prefix: &str) -> Vec<StructureStatic> {
    flow_rates
        .iter()
        .zip(control_states(prefix, flow_rates.len()))
        .map(|(flow_rate, state)| StructureStatic {
            control_state: Some(state),
            ..StructureStatic::new(node_id, *flow_rate)
        })
        .collect()
}
