//! Error types for the rnl-app service layer.

use std::path::PathBuf;

/// Application error type that wraps errors from the backend crates and
/// gives frontends one error to report.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parameterization failed: {0}")]
    Parameterize(String),

    #[error("Control error: {0}")]
    Control(String),

    #[error("HyDAMO error: {0}")]
    Hydamo(String),

    #[error("Results error: {0}")]
    Results(String),

    #[error("GeoPackage error: {0}")]
    Gpkg(String),

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for rnl-app operations.
pub type AppResult<T> = Result<T, AppError>;

// Conversions from backend error types
impl From<rnl_model::ModelError> for AppError {
    fn from(err: rnl_model::ModelError) -> Self {
        AppError::Model(err.to_string())
    }
}

impl From<rnl_network::NetworkError> for AppError {
    fn from(err: rnl_network::NetworkError) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<rnl_parametrize::ParamError> for AppError {
    fn from(err: rnl_parametrize::ParamError) -> Self {
        AppError::Parameterize(err.to_string())
    }
}

impl From<rnl_control::ControlError> for AppError {
    fn from(err: rnl_control::ControlError) -> Self {
        AppError::Control(err.to_string())
    }
}

impl From<rnl_hydamo::HydamoError> for AppError {
    fn from(err: rnl_hydamo::HydamoError) -> Self {
        AppError::Hydamo(err.to_string())
    }
}

impl From<rnl_results::ResultsError> for AppError {
    fn from(err: rnl_results::ResultsError) -> Self {
        AppError::Results(err.to_string())
    }
}

impl From<rnl_gpkg::GpkgError> for AppError {
    fn from(err: rnl_gpkg::GpkgError) -> Self {
        AppError::Gpkg(err.to_string())
    }
}

/// `path` itself, or [`AppError::FileNotFound`].
pub(crate) fn existing(path: &std::path::Path) -> AppResult<&std::path::Path> {
    if path.exists() {
        Ok(path)
    } else {
        Err(AppError::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}
