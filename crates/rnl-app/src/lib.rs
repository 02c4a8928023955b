//! Shared application service layer for Ribasim-NL.
//!
//! This crate gives the CLI one interface to settings, authority paths,
//! network building, model editing, parameterization, validation and
//! solver runs.

pub mod error;
pub mod model_service;
pub mod parameterize_service;
pub mod paths;
pub mod query;
pub mod run_service;
pub mod settings;
pub mod validate_service;

// Re-export key types for convenience
pub use error::{AppError, AppResult};
pub use model_service::{
    ModelSummary, apply_edits, apply_verdeelsleutel, build_network, concat_models, load_model,
    reset_index, route_links, summarize,
};
pub use parameterize_service::{
    BergingPaths, ParameterizeReport, ParameterizeRequest, PeilgebiedSource, parameterize_model,
    read_polygons,
};
pub use paths::AuthorityPaths;
pub use query::{ResultsSummary, basin_series, get_results_summary, hot_start};
pub use run_service::{RunOptions, RunRequest, RunResponse, ensure_run, list_runs, load_run};
pub use settings::{Settings, SettingsOverrides};
pub use validate_service::{HydamoSummary, find_codes, validate_hydamo, validate_model};
