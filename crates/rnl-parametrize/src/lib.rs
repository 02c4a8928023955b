//! rnl-parametrize: derive the static tables of a Ribasim model.
//!
//! Contains:
//! - static data (category defaults and per-node overrides, xlsx workbook)
//! - Pump/Outlet, ManningResistance, LevelBoundary, FlowBoundary and Basin tables
//! - streefpeil assignment from peilgebieden
//! - aanvoer flags, from/to levels and the basin-level check
//! - berging (storage) Basins from groundwater rasters
//! - Basin / time forcing from offline groundwater budgets and meteo grids
//! - structure discharge curves and cross-section profile tables
//! - Basin area estimation and link geometry fitting
//! - the pipeline running the table steps in order

pub mod aanvoer;
pub mod basin;
pub mod basin_area;
pub mod berging;
pub mod boundary;
pub mod error;
pub mod forcing;
pub mod levels;
pub mod link_geometry;
pub mod manning;
pub mod pipeline;
pub mod profile;
pub mod static_data;
pub mod streefpeil;
pub mod structure_curves;
pub mod structures;
pub mod target_level;

#[cfg(test)]
mod test_support;

pub use aanvoer::{AanvoerSummary, set_aanvoer_flags};
pub use basin::{ForcingRates, OpenWaterFractions, add_basin_time_synthetic};
pub use basin_area::{BasinAreaOptions, WaterBodies, estimate_basin_area};
pub use berging::{BergingRasters, add_berging};
pub use error::{ParamError, ParamResult};
pub use forcing::{BudgetSeries, MeteoGrid, assign_meteo, assign_offline_budgets};
pub use levels::{add_check_basin_level, add_from_to_nodes_and_levels};
pub use link_geometry::{LinkGeometryOptions, fix_link_geometries};
pub use manning::{ManningDefaults, ManningProfile, read_profiles};
pub use pipeline::{ParameterizeOptions, ParameterizeSummary, parameterize};
pub use static_data::StaticData;
pub use streefpeil::{PeilgebiedIndex, assign_streefpeil, read_peilgebieden};
pub use target_level::{downstream_target_level, upstream_target_level};
