use rnl_core::{CoreError, LinkId, NodeId};
use rnl_geometry::GeometryError;
use rnl_gpkg::GpkgError;
use thiserror::Error;

use crate::node_type::NodeType;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Node {node_id} not found")]
    NodeNotFound { node_id: NodeId },

    #[error("Link {link_id} not found")]
    LinkNotFound { link_id: LinkId },

    #[error("Node {node_id} already exists")]
    DuplicateNode { node_id: NodeId },

    #[error("Node {node_id} is {found}, expected {expected}")]
    WrongNodeType {
        node_id: NodeId,
        found: NodeType,
        expected: &'static str,
    },

    #[error("Node {node_id} is still referenced by links {links:?}")]
    NodeInUse { node_id: NodeId, links: Vec<LinkId> },

    #[error("Flow link from {node_id} to itself is not allowed")]
    SelfLoop { node_id: NodeId },

    #[error("Table '{table}' does not belong to {node_type}")]
    WrongTable { table: String, node_type: NodeType },

    #[error("Unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Invalid row in '{table}': {message}")]
    InvalidRow { table: String, message: String },

    #[error("Invalid model: {what}")]
    Invalid { what: String },

    #[error("Model edit '{tag}' failed: {message}")]
    Edit { tag: String, message: String },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("GeoPackage error: {0}")]
    Gpkg(#[from] GpkgError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl ModelError {
    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Self::Invalid { what: what.into() }
    }
}
