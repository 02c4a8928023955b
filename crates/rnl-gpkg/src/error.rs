use thiserror::Error;

pub type GpkgResult<T> = Result<T, GpkgError>;

#[derive(Error, Debug)]
pub enum GpkgError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("Invalid geometry blob: {0}")]
    InvalidBlob(String),

    #[error("WKB error: {0}")]
    Wkb(#[from] geozero::error::GeozeroError),

    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    #[error("Column '{column}' in layer '{layer}': {message}")]
    Column {
        layer: String,
        column: String,
        message: String,
    },
}
