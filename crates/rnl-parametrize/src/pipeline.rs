//! The parameterization pipeline.

use std::collections::BTreeMap;

use rnl_model::Model;
use tracing::info;

use crate::basin::{
    ForcingRates, OpenWaterFractions, PROFILE_DEPTH, update_basin_profile, update_basin_state,
    update_basin_static,
};
use crate::boundary::{update_flow_boundary_static, update_level_boundary_static};
use crate::error::ParamResult;
use crate::levels::{add_check_basin_level, add_from_to_nodes_and_levels};
use crate::manning::{ManningDefaults, ManningProfile, update_manning_static};
use crate::static_data::StaticData;
use crate::structures::{populate_function, update_pump_outlet_static};

/// Inputs of [`parameterize`] besides the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizeOptions {
    pub static_data: StaticData,
    pub open_water: OpenWaterFractions,
    pub profile_depth: f64,
    pub manning: ManningDefaults,
    /// Cross-section profiles keyed on `meta_profielid_waterbeheerder`.
    pub manning_profiles: Option<BTreeMap<String, ManningProfile>>,
    pub forcing: ForcingRates,
}

impl Default for ParameterizeOptions {
    fn default() -> Self {
        Self {
            static_data: StaticData::default(),
            open_water: OpenWaterFractions::default(),
            profile_depth: PROFILE_DEPTH,
            manning: ManningDefaults::default(),
            manning_profiles: None,
            forcing: ForcingRates::default(),
        }
    }
}

impl ParameterizeOptions {
    pub fn with_static_data(static_data: StaticData) -> Self {
        Self {
            static_data,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParameterizeSummary {
    pub functions: usize,
    pub flow_boundaries: usize,
    pub structures_with_levels: usize,
    pub checked_basins: usize,
}

/// Derive all static tables of a model from its nodes, Basin areas and the
/// static data.
///
/// Every step replaces the table it writes, so running the pipeline twice
/// gives the same tables. The first missing prerequisite aborts the run.
pub fn parameterize(model: &mut Model, options: &ParameterizeOptions) -> ParamResult<ParameterizeSummary> {
    let data = &options.static_data;
    let functions = populate_function(model, data);
    update_pump_outlet_static(model, data)?;
    update_manning_static(model, options.manning, options.manning_profiles.as_ref());
    update_basin_profile(model, &options.open_water, options.profile_depth)?;
    update_basin_state(model);
    update_basin_static(model, options.forcing)?;
    update_level_boundary_static(model, data)?;
    let flow_boundaries = update_flow_boundary_static(model);
    let structures_with_levels = add_from_to_nodes_and_levels(model)?;
    let checked_basins = add_check_basin_level(model)?;

    let summary = ParameterizeSummary {
        functions,
        flow_boundaries,
        structures_with_levels,
        checked_basins,
    };
    info!(?summary, "parameterized model");
    Ok(summary)
}
