//! Validating model bundles and HyDAMO deliveries.

use std::path::Path;

use rnl_gpkg::GeoPackage;
use rnl_hydamo::{CodeRegistry, HyDAMO, Organization, SetDataOptions};
use rnl_model::io::database_path;
use rnl_model::{Frames, ModelConfig, NetworkValidator, ValidationReport};
use tracing::info;

use crate::error::{AppResult, existing};

/// Check the Node and Link tables of a bundle.
///
/// Rows are checked as stored, so dangling links and duplicate nodes are
/// reported instead of failing the read. With `diagnostics` the offending
/// rows are written there as one layer per check.
pub fn validate_model(toml_path: &Path, diagnostics: Option<&Path>) -> AppResult<ValidationReport> {
    let text = std::fs::read_to_string(existing(toml_path)?)?;
    let config = ModelConfig::from_toml(&text)?;
    let gpkg = GeoPackage::open(existing(&database_path(toml_path, &config))?)?;
    let validator = NetworkValidator::from_frames(Frames::read(&gpkg)?);
    let report = validator.report();

    if let Some(path) = diagnostics
        && !report.is_clean()
    {
        let mut out = GeoPackage::create(path)?;
        validator.write_diagnostics(&mut out, config.srs_id()?)?;
        info!(path = %path.display(), "wrote diagnostics");
    }
    Ok(report)
}

/// Number of rows per HyDAMO layer holding data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydamoSummary {
    pub version: String,
    pub layers: Vec<(String, usize)>,
}

/// Read and validate every HyDAMO layer of a GeoPackage.
pub fn validate_hydamo(path: &Path) -> AppResult<HydamoSummary> {
    let hydamo = HyDAMO::from_geopackage(existing(path)?, &SetDataOptions::default())?;
    let mut layers = Vec::new();
    for name in hydamo.data_layers() {
        layers.push((name.to_string(), hydamo.layer(name)?.len()));
    }
    Ok(HydamoSummary {
        version: hydamo.version.clone(),
        layers,
    })
}

/// Organizations in the registry at `codes_path` matching `organization`.
pub fn find_codes(
    codes_path: &Path,
    organization: &str,
    administration_category: Option<&str>,
) -> AppResult<Vec<Organization>> {
    let registry = CodeRegistry::read(existing(codes_path)?)?;
    Ok(registry
        .find_codes(organization, administration_category)?
        .into_iter()
        .cloned()
        .collect())
}
