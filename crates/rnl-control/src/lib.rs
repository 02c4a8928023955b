//! rnl-control: control nodes and flow distribution.
//!
//! Contains:
//! - DiscreteControl condition/logic builders (threshold cascades, single-Basin level control)
//! - control-node placement and control links
//! - verdeelsleutels turned into FractionalFlow nodes plus their DiscreteControl

pub mod discrete;
pub mod error;
pub mod placement;
pub mod verdeelsleutel;

pub use discrete::{
    DiscreteControlTables, control_states, discrete_control_tables_single_basin, structure_states,
    truth_states,
};
pub use error::{ControlError, ControlResult};
pub use placement::{
    Placement, add_and_connect_discrete_control_node, add_discrete_control, left_of_incoming_link,
    offset_point,
};
pub use verdeelsleutel::{
    Branch, Regime, Verdeelsleutel, VerdeelsleutelControl, read_verdeelsleutel,
    verdeelsleutel_to_control,
};
