use rnl_gpkg::{GeometryType, GpkgError};
use thiserror::Error;

pub type HydamoResult<T> = Result<T, HydamoError>;

#[derive(Error, Debug)]
pub enum HydamoError {
    #[error("Column '{column}' not found in layer '{layer}'. Got {present:?}")]
    MissingColumn {
        layer: String,
        column: String,
        present: Vec<String>,
    },

    #[error("Geometry type {expected:?} required in layer '{layer}', found {found:?} in rows {rows:?}")]
    GeometryType {
        layer: String,
        expected: Vec<GeometryType>,
        found: Vec<GeometryType>,
        rows: Vec<usize>,
    },

    #[error("Layer '{layer}', column '{column}': {problem} in rows {rows:?}")]
    Schema {
        layer: String,
        column: String,
        problem: String,
        rows: Vec<usize>,
    },

    #[error("Unknown HyDAMO layer '{0}'")]
    UnknownLayer(String),

    #[error("Invalid HyDAMO schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid administration_category '{category}', expected one of {known:?}")]
    InvalidCategory { category: String, known: Vec<String> },

    #[error("Can't generate model id: {what}")]
    ModelId { what: String },

    #[error("Code registry not initialized")]
    RegistryNotInitialized,

    #[error("Code registry lock poisoned")]
    RegistryPoisoned,

    #[error("GeoPackage error: {0}")]
    Gpkg(#[from] GpkgError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
