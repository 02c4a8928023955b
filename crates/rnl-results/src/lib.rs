//! rnl-results: solver runs and their output.
//!
//! Contains:
//! - the solver subprocess driver
//! - Basin and flow results ingestion, final levels back into `Basin / state`
//! - an archive of runs keyed on a hash of the bundle, holding the manifest
//!   and the result files of every run

pub mod hash;
pub mod read;
pub mod runner;
pub mod store;
pub mod types;

pub use hash::{compute_run_id, hash_bundle};
pub use read::{
    BASIN_RESULTS, FLOW_RESULTS, final_basin_levels, read_basin_results, read_flow_results,
    update_state, write_basin_results, write_flow_results,
};
pub use runner::{RunOutcome, Solver};
pub use store::RunStore;
pub use types::*;

use std::path::PathBuf;

use rnl_model::ModelError;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Results file not found: {}", path.display())]
    MissingResult { path: PathBuf },

    #[error("Results lack column '{column}'")]
    MissingColumn { column: String },

    #[error("Invalid column '{column}': {message}")]
    InvalidColumn { column: String, message: String },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },

    #[error("Solver '{exe}' could not be started: {source}")]
    SolverNotStarted {
        exe: String,
        source: std::io::Error,
    },

    #[error("Solver failed with exit code {exit_code}")]
    SolverFailed { exit_code: i32 },
}
