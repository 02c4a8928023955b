use rnl_core::{CoreError, NodeId};
use rnl_geometry::GeometryError;
use rnl_gpkg::GpkgError;
use rnl_model::{ModelError, NodeType};
use rnl_network::NetworkError;
use rnl_raster::RasterError;
use thiserror::Error;

pub type ParamResult<T> = Result<T, ParamError>;

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Basin {node_id} has no meta_streefpeil")]
    MissingStreefpeil { node_id: NodeId },

    #[error("Basin {node_id} has no area")]
    MissingBasinArea { node_id: NodeId },

    #[error("Node {node_id} does not have an upstream basin")]
    NoUpstreamBasin { node_id: NodeId },

    #[error("Node {node_id} does not have a downstream basin")]
    NoDownstreamBasin { node_id: NodeId },

    #[error("Node {node_id} is {node_type}, expected one of {expected}")]
    UnsupportedNodeType {
        node_id: NodeId,
        node_type: NodeType,
        expected: &'static str,
    },

    #[error("{node_type} nodes without a categorie: {node_ids:?}")]
    MissingCategory {
        node_type: NodeType,
        node_ids: Vec<NodeId>,
    },

    #[error("Unknown categorie '{categorie}' on nodes {node_ids:?}")]
    UnknownCategory {
        categorie: String,
        node_ids: Vec<NodeId>,
    },

    #[error("Can't set flow_rate for nodes {node_ids:?}")]
    NoFlowRate { node_ids: Vec<NodeId> },

    #[error("No valid {what} for basin {node_id}")]
    MissingSamples { node_id: NodeId, what: &'static str },

    #[error("Invalid input: {what}")]
    Invalid { what: String },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("GeoPackage error: {0}")]
    Gpkg(#[from] GpkgError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Spreadsheet error: {0}")]
    SpreadsheetWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("Arrow error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParamError {
    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Self::Invalid { what: what.into() }
    }
}
