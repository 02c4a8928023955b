//! Content-based hashing for run IDs.

use std::fs;
use std::path::Path;

use rnl_model::ModelConfig;
use rnl_model::io::database_path;
use sha2::{Digest, Sha256};

use crate::ResultsResult;

/// SHA-256 over the root descriptor and its database.
pub fn hash_bundle(toml_path: &Path) -> ResultsResult<String> {
    let descriptor = fs::read(toml_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&descriptor);

    let config = ModelConfig::from_toml(&String::from_utf8_lossy(&descriptor))?;
    let database = database_path(toml_path, &config);
    if database.exists() {
        hasher.update(fs::read(database)?);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn compute_run_id(bundle_hash: &str, solver_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bundle_hash.as_bytes());
    hasher.update(solver_version.as_bytes());
    format!("{:x}", hasher.finalize())
}
