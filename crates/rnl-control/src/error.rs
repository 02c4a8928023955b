//! Error types for control construction.

use rnl_core::NodeId;
use rnl_model::{ModelError, NodeType};
use thiserror::Error;

pub type ControlResult<T> = Result<T, ControlError>;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Node {node_id} ({node_type}) can't be the target of a control link")]
    NotControllable { node_id: NodeId, node_type: NodeType },

    #[error("Node {node_id} has no incoming flow link to place a control node beside")]
    NoIncomingLink { node_id: NodeId },

    #[error("No node with code '{code}'")]
    UnknownLocation { code: String },

    #[error("Verdeelsleutel must have exactly one upstream location, got {keys:?}")]
    UpstreamKeys { keys: Vec<String> },

    #[error("Verdeelsleutel column '{column}' is missing")]
    MissingColumn { column: String },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControlError {
    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidArg { what: what.into() }
    }
}
