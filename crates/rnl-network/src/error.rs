use rnl_geometry::GeometryError;
use rnl_gpkg::GpkgError;
use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("No path between network nodes {source_id} and {target_id}")]
    NoPath { source_id: u32, target_id: u32 },

    #[error("Network node {0} not found")]
    NodeNotFound(u32),

    #[error("Network link {0} not found")]
    LinkNotFound(u32),

    #[error("Nodes {0} and {1} are not connected by a link")]
    NotAdjacent(u32, u32),

    #[error("Invalid network input: {what}")]
    InvalidInput { what: String },

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("GeoPackage error: {0}")]
    Gpkg(#[from] GpkgError),
}
