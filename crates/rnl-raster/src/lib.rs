//! rnl-raster: raster sampling for basin parameterization.
//!
//! Provides:
//! - `Raster`, a single-band north-up grid held in memory
//! - GeoTIFF and ESRI ASCII grid readers/writers
//! - level-area curves from a DEM clipped by a polygon
//! - zonal statistics (mean/min/max/sum/count) over polygons
//! - line-profile sampling

pub mod ascii;
pub mod error;
pub mod geotiff;
pub mod grid;
pub mod sample;

pub use error::{RasterError, RasterResult};
pub use geotiff::{read_geotiff, read_raster, write_geotiff};
pub use grid::Raster;
pub use sample::{
    DEFAULT_PERCENTILES, LevelArea, ProfileSample, ZonalOptions, ZonalStats, level_area,
    percentile, sample_line, zonal_stats,
};
