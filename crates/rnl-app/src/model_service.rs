//! Building networks and editing model bundles.

use std::path::Path;

use rnl_control::{VerdeelsleutelControl, read_verdeelsleutel, verdeelsleutel_to_control};
use rnl_core::NodeId;
use rnl_gpkg::GeoPackage;
use rnl_model::{Model, NodeAttrs, concat, read_edits};
use rnl_network::{Network, NetworkOptions};
use rnl_parametrize::{LinkGeometryOptions, fix_link_geometries};
use tracing::info;

use crate::error::{AppError, AppResult, existing};

/// Summary of a model for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSummary {
    pub node_count: usize,
    pub link_count: usize,
    /// Nodes per node type.
    pub node_types: Vec<(String, usize)>,
}

pub fn summarize(model: &Model) -> ModelSummary {
    let mut node_types: Vec<(String, usize)> = Vec::new();
    for node in model.nodes() {
        let name = node.node_type.to_string();
        match node_types.iter_mut().find(|(n, _)| *n == name) {
            Some((_, count)) => *count += 1,
            None => node_types.push((name, 1)),
        }
    }
    node_types.sort();
    ModelSummary {
        node_count: model.node_count(),
        link_count: model.link_count(),
        node_types,
    }
}

pub fn load_model(toml_path: &Path) -> AppResult<Model> {
    Ok(Model::read(existing(toml_path)?)?)
}

/// Build a network from the lines in `layer` of `lines_path` and write its
/// `nodes` and `links` layers to `output`.
pub fn build_network(lines_path: &Path, layer: &str, tolerance: f64, output: &Path) -> AppResult<Network> {
    let gpkg = GeoPackage::open(existing(lines_path)?)?;
    let layer = gpkg.read_layer(layer)?;
    let network = Network::from_layer(&layer, NetworkOptions::with_tolerance(tolerance))?;
    if output.exists() {
        std::fs::remove_file(output)?;
    }
    network.to_gpkg(output)?;
    Ok(network)
}

/// Redraw the flow links of `toml_path` along the lines in `layer` of
/// `lines_path`; returns how many links follow the network.
pub fn route_links(
    toml_path: &Path,
    lines_path: &Path,
    layer: &str,
    tolerance: f64,
    output: &Path,
) -> AppResult<usize> {
    let mut model = load_model(toml_path)?;
    let gpkg = GeoPackage::open(existing(lines_path)?)?;
    let mut network = Network::from_layer(&gpkg.read_layer(layer)?, NetworkOptions::with_tolerance(tolerance))?;
    let routed = fix_link_geometries(&mut model, &mut network, &LinkGeometryOptions::default())?;
    model.write(output)?;
    info!(routed, links = model.link_count(), output = %output.display(), "routed links");
    Ok(routed)
}

/// Apply the operator edits in `edits_path` and write the bundle to `output`.
pub fn apply_edits(toml_path: &Path, edits_path: &Path, output: &Path) -> AppResult<ModelSummary> {
    let mut model = load_model(toml_path)?;
    let edits = read_edits(existing(edits_path)?)?;
    model.apply_edits(&edits)?;
    model.write(output)?;
    info!(edits = edits.len(), output = %output.display(), "applied edits");
    Ok(summarize(&model))
}

/// Renumber node ids densely from `node_start` and link ids from 1.
pub fn reset_index(toml_path: &Path, node_start: u32, output: &Path) -> AppResult<ModelSummary> {
    let node_start = NodeId::new(node_start)
        .ok_or_else(|| AppError::InvalidInput("node ids start at 1 or higher".to_string()))?;
    let mut model = load_model(toml_path)?;
    model.reset_index(node_start)?;
    model.write(output)?;
    Ok(summarize(&model))
}

/// Join the bundles in `toml_paths` into one model at `output`.
pub fn concat_models(toml_paths: &[&Path], output: &Path) -> AppResult<ModelSummary> {
    if toml_paths.is_empty() {
        return Err(AppError::InvalidInput("nothing to concatenate".to_string()));
    }
    let models = toml_paths
        .iter()
        .map(|path| load_model(path))
        .collect::<AppResult<Vec<_>>>()?;
    let mut model = concat(models)?;
    model.write(output)?;
    info!(models = toml_paths.len(), output = %output.display(), "concatenated models");
    Ok(summarize(&model))
}

/// Turn a verdeelsleutel CSV into FractionalFlow and DiscreteControl nodes.
pub fn apply_verdeelsleutel(toml_path: &Path, csv_path: &Path, output: &Path) -> AppResult<VerdeelsleutelControl> {
    let mut model = load_model(toml_path)?;
    let verdeelsleutel = read_verdeelsleutel(existing(csv_path)?)?;
    let control = verdeelsleutel_to_control(&mut model, &verdeelsleutel, NodeAttrs::default())?;
    model.write(output)?;
    Ok(control)
}
