//! Archive of solver runs.
//!
//! Every run of a bundle gets a directory `<bundle>/.runs/<run_id>/` with its
//! manifest and a copy of the Arrow files the solver left in the results
//! directory. An archived run can be restored into the results directory
//! after the bundle was rerun or the results were removed.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::read::BASIN_RESULTS;
use crate::types::RunManifest;
use crate::{ResultsError, ResultsResult};

pub const RUNS_DIR: &str = ".runs";
const MANIFEST: &str = "manifest.json";
const RESULTS: &str = "results";

#[derive(Debug, Clone)]
pub struct RunStore {
    runs_dir: PathBuf,
}

fn is_arrow(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|e| e == "arrow")
}

/// Copy the Arrow files of `from` into `to`, returning how many were copied.
fn copy_arrow_files(from: &Path, to: &Path) -> ResultsResult<usize> {
    if !from.is_dir() {
        return Ok(0);
    }
    let mut copied = 0;
    for entry in fs::read_dir(from)? {
        let path = entry?.path();
        let Some(name) = path.file_name().filter(|_| is_arrow(&path)) else {
            continue;
        };
        fs::create_dir_all(to)?;
        fs::copy(&path, to.join(name))?;
        copied += 1;
    }
    Ok(copied)
}

impl RunStore {
    pub fn open(runs_dir: impl Into<PathBuf>) -> ResultsResult<Self> {
        let runs_dir = runs_dir.into();
        fs::create_dir_all(&runs_dir)?;
        Ok(Self { runs_dir })
    }

    /// The archive in `.runs` next to the root descriptor.
    pub fn for_bundle(toml_path: &Path) -> ResultsResult<Self> {
        let bundle_dir = toml_path
            .parent()
            .ok_or_else(|| ResultsError::InvalidPath {
                message: format!("{} has no parent directory", toml_path.display()),
            })?;
        Self::open(bundle_dir.join(RUNS_DIR))
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id)
    }

    /// Directory with the archived result files of a run.
    pub fn results_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(RESULTS)
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id).join(MANIFEST).exists()
    }

    /// Whether the Basin results of a run were archived.
    pub fn has_results(&self, run_id: &str) -> bool {
        self.results_dir(run_id).join(BASIN_RESULTS).exists()
    }

    /// Record a run together with the Arrow files in `results_dir`.
    /// Returns the number of archived result files.
    pub fn save_run(&self, manifest: &RunManifest, results_dir: &Path) -> ResultsResult<usize> {
        let run_dir = self.run_dir(&manifest.run_id);
        let archive = self.results_dir(&manifest.run_id);
        if archive.exists() {
            fs::remove_dir_all(&archive)?;
        }
        fs::create_dir_all(&run_dir)?;
        fs::write(run_dir.join(MANIFEST), serde_json::to_string_pretty(manifest)?)?;
        let archived = copy_arrow_files(results_dir, &archive)?;
        debug!(run_id = %manifest.run_id, archived, "saved run");
        Ok(archived)
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        let path = self.run_dir(run_id).join(MANIFEST);
        if !path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Copy the archived results of a run back into `results_dir`.
    pub fn restore_results(&self, run_id: &str, results_dir: &Path) -> ResultsResult<usize> {
        if !self.has_run(run_id) {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let restored = copy_arrow_files(&self.results_dir(run_id), results_dir)?;
        debug!(%run_id, restored, "restored run results");
        Ok(restored)
    }

    /// Runs of `model_name`, most recent first.
    pub fn list_runs(&self, model_name: &str) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.runs_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().to_string();
            if let Ok(manifest) = self.load_manifest(&run_id)
                && manifest.model_name == model_name
            {
                runs.push(manifest);
            }
        }
        runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(runs)
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}
