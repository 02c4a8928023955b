//! Query helpers for the results of a bundle.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use rnl_core::NodeId;
use rnl_model::ModelConfig;
use rnl_model::io::results_path;
use rnl_results::{BasinResult, final_basin_levels, read_basin_results, read_flow_results, update_state};
use tracing::info;

use crate::error::{AppError, AppResult, existing};
use crate::model_service::load_model;

/// Time range and sizes of the results of a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsSummary {
    pub time_range: (NaiveDateTime, NaiveDateTime),
    pub basin_count: usize,
    pub link_count: usize,
    pub final_levels: BTreeMap<NodeId, f64>,
}

fn results_dir(toml_path: &Path) -> AppResult<std::path::PathBuf> {
    let config = ModelConfig::from_toml(&std::fs::read_to_string(existing(toml_path)?)?)?;
    Ok(results_path(toml_path, &config))
}

pub fn get_results_summary(toml_path: &Path) -> AppResult<ResultsSummary> {
    let dir = results_dir(toml_path)?;
    let basins = read_basin_results(&dir)?;
    let flows = read_flow_results(&dir)?;

    let times = || basins.iter().map(|r| r.time).chain(flows.iter().map(|r| r.time));
    let (Some(t_min), Some(t_max)) = (times().min(), times().max()) else {
        return Err(AppError::InvalidInput("No records in results".to_string()));
    };

    let final_levels = final_basin_levels(&basins);
    let mut links: Vec<_> = flows.iter().filter_map(|r| r.link_id).collect();
    links.sort();
    links.dedup();
    Ok(ResultsSummary {
        time_range: (t_min, t_max),
        basin_count: final_levels.len(),
        link_count: links.len(),
        final_levels,
    })
}

/// Level series of one Basin.
pub fn basin_series(toml_path: &Path, node_id: NodeId) -> AppResult<Vec<BasinResult>> {
    let rows = read_basin_results(&results_dir(toml_path)?)?;
    Ok(rows.into_iter().filter(|r| r.node_id == node_id).collect())
}

/// Start the model from its final simulated levels, written to `output`.
pub fn hot_start(toml_path: &Path, output: &Path) -> AppResult<usize> {
    let levels = final_basin_levels(&read_basin_results(&results_dir(toml_path)?)?);
    let mut model = load_model(toml_path)?;
    let updated = update_state(&mut model, &levels)?;
    model.write(output)?;
    info!(basins = updated, output = %output.display(), "wrote hot-started model");
    Ok(updated)
}
