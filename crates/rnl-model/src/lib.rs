//! rnl-model: the Ribasim model and everything that edits it.
//!
//! Contains:
//! - node and link tables plus typed sub-tables (`Basin / profile`, ...)
//! - editing operations and the operator edit registry
//! - flow-graph traversal
//! - re-numbering and composition (`reset_index`, `prefix_index`, `concat`)
//! - bundle I/O (TOML descriptor + GeoPackage database)
//! - the network validator

pub mod config;
pub mod defaults;
pub mod edit;
pub mod edits;
pub mod error;
pub mod index;
pub mod io;
pub mod model;
pub mod node;
pub mod node_type;
pub mod row;
pub mod tables;
pub mod traverse;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use config::ModelConfig;
pub use edit::StaticUpdate;
pub use edits::{EditOp, ModelEdit, read_edits};
pub use error::{ModelError, ModelResult};
pub use index::{concat, concat_with_attributes, split};
pub use io::Frames;
pub use model::{LinkAttrs, Model, NodeAttrs};
pub use node::{Link, Node};
pub use node_type::{LinkType, NodeFunction, NodeType};
pub use row::NodeRow;
pub use tables::*;
pub use traverse::{Neighbours, StopAt};
pub use validate::{NetworkValidator, ValidationReport};
