//! Running the solver on a bundle, with a cache of finished runs.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rnl_model::ModelConfig;
use rnl_model::io::results_path;
use rnl_results::{RunManifest, RunStore, Solver, compute_run_id, hash_bundle};
use tracing::info;

use crate::error::{AppError, AppResult, existing};
use crate::settings::Settings;

/// Options for running simulations.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Skip the solver when an identical bundle already ran successfully.
    pub use_cache: bool,
    /// Fail on a non-zero exit code instead of recording it.
    pub check: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            check: true,
        }
    }
}

/// Request to execute a run.
pub struct RunRequest<'a> {
    pub toml_path: &'a Path,
    pub ribasim_exe: PathBuf,
    pub options: RunOptions,
}

impl<'a> RunRequest<'a> {
    pub fn new(toml_path: &'a Path, settings: &Settings) -> Self {
        Self {
            toml_path,
            ribasim_exe: settings.ribasim_exe.clone(),
            options: RunOptions::default(),
        }
    }
}

/// Response from a run execution.
#[derive(Debug, Clone)]
pub struct RunResponse {
    pub run_id: String,
    pub manifest: RunManifest,
    pub loaded_from_cache: bool,
}

fn model_name(toml_path: &Path) -> String {
    toml_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Run the solver on a bundle, or return the cached run of an identical one.
///
/// The cache key is the hash of the descriptor and database together with
/// the solver version. A cached run only counts when it succeeded and its
/// results are archived; they are restored into the results directory of
/// the bundle.
pub fn ensure_run(request: &RunRequest) -> AppResult<RunResponse> {
    let toml_path = existing(request.toml_path)?;
    let config = ModelConfig::from_toml(&std::fs::read_to_string(toml_path)?)?;
    let solver = Solver::new(&request.ribasim_exe);
    let solver_version = solver
        .version()
        .or_else(|| config.ribasim_version.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let bundle_hash = hash_bundle(toml_path)?;
    let run_id = compute_run_id(&bundle_hash, &solver_version);
    let store = RunStore::for_bundle(toml_path)?;
    let results_dir = results_path(toml_path, &config);

    if request.options.use_cache && store.has_run(&run_id) {
        let manifest = store.load_manifest(&run_id)?;
        if manifest.exit_code == 0 && store.has_results(&run_id) {
            let restored = store.restore_results(&run_id, &results_dir)?;
            info!(%run_id, restored, "loaded run from cache");
            return Ok(RunResponse {
                run_id,
                manifest,
                loaded_from_cache: true,
            });
        }
    }

    let timestamp = Utc::now().to_rfc3339();
    let outcome = solver.run(toml_path)?;
    let manifest = RunManifest {
        run_id: run_id.clone(),
        model_name: model_name(toml_path),
        toml_path: toml_path.display().to_string(),
        timestamp,
        bundle_hash,
        solver_version,
        exit_code: outcome.exit_code,
        computation_time_s: outcome.duration.as_secs_f64(),
    };
    let archived = store.save_run(&manifest, &results_dir)?;
    info!(%run_id, archived, "archived run results");

    if request.options.check && !outcome.success() {
        return Err(AppError::Results(format!(
            "solver failed with exit code {} on {}",
            outcome.exit_code,
            toml_path.display()
        )));
    }
    Ok(RunResponse {
        run_id,
        manifest,
        loaded_from_cache: false,
    })
}

/// Runs of a bundle, most recent first.
pub fn list_runs(toml_path: &Path) -> AppResult<Vec<RunManifest>> {
    let store = RunStore::for_bundle(toml_path)?;
    Ok(store.list_runs(&model_name(toml_path))?)
}

pub fn load_run(toml_path: &Path, run_id: &str) -> AppResult<RunManifest> {
    Ok(RunStore::for_bundle(toml_path)?.load_manifest(run_id)?)
}
