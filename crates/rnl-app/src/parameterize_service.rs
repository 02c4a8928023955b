//! Parameterizing a model bundle.

use std::path::{Path, PathBuf};

use geo::{MultiPolygon, Polygon};
use rnl_geometry::BasinGeometry;
use rnl_gpkg::GeoPackage;
use rnl_parametrize::{
    AanvoerSummary, BasinAreaOptions, BergingRasters, BudgetSeries, ParameterizeOptions,
    ParameterizeSummary, PeilgebiedIndex, StaticData, WaterBodies, add_basin_time_synthetic,
    add_berging, assign_offline_budgets, assign_streefpeil, estimate_basin_area, parameterize,
    read_peilgebieden, read_profiles, set_aanvoer_flags,
};
use tracing::{info, warn};

use crate::error::{AppResult, existing};
use crate::model_service::load_model;

/// Where to find the target levels of peilgebieden.
#[derive(Debug, Clone, PartialEq)]
pub struct PeilgebiedSource {
    pub path: PathBuf,
    pub layer: String,
    pub level_column: String,
    pub code_column: String,
}

impl PeilgebiedSource {
    /// The HyDAMO `peilgebiedpraktijk` layer with its `streefpeil` column.
    pub fn hydamo(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            layer: "peilgebiedpraktijk".to_string(),
            level_column: "streefpeil".to_string(),
            code_column: "code".to_string(),
        }
    }
}

/// Ground level, GHG, GLG and mean discharge rasters for storage Basins.
#[derive(Debug, Clone, PartialEq)]
pub struct BergingPaths {
    pub maaiveld: PathBuf,
    pub ghg: PathBuf,
    pub glg: PathBuf,
    pub ma: PathBuf,
}

impl BergingPaths {
    /// `maaiveld.tif`, `ghg.tif`, `glg.tif` and `ma.tif` in `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            maaiveld: dir.join("maaiveld.tif"),
            ghg: dir.join("ghg.tif"),
            glg: dir.join("glg.tif"),
            ma: dir.join("ma.tif"),
        }
    }

    fn load(&self) -> AppResult<BergingRasters> {
        Ok(BergingRasters::load(
            existing(&self.maaiveld)?,
            existing(&self.ghg)?,
            existing(&self.glg)?,
            existing(&self.ma)?,
        )?)
    }
}

/// Request to parameterize one bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterizeRequest {
    pub toml_path: PathBuf,
    pub output: PathBuf,
    /// Static data workbook; the built-in categories when absent.
    pub static_data: Option<PathBuf>,
    /// Cross-section profiles: GeoPackage and layer.
    pub profiles: Option<(PathBuf, String)>,
    /// Assign `meta_streefpeil` to Basin areas, estimated ones included.
    pub peilgebieden: Option<PeilgebiedSource>,
    /// Water-body polygons (GeoPackage and layer) for Basins without area.
    pub water_bodies: Option<(PathBuf, String)>,
    /// Supply-area polygons (GeoPackage and layer) for the aanvoer flags.
    pub supply_areas: Option<(PathBuf, String)>,
    /// Add storage Basins from these rasters.
    pub berging: Option<BergingPaths>,
    /// Write a synthetic `Basin / time` over the simulation period.
    pub basin_time: bool,
    /// Offline groundwater budgets (Arrow) written into `Basin / time`.
    pub budgets: Option<PathBuf>,
}

/// What parameterization did besides the static tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizeReport {
    pub summary: ParameterizeSummary,
    pub estimated_areas: usize,
    pub storage_basins: usize,
    pub aanvoer: Option<AanvoerSummary>,
    pub forcing_rows: usize,
}

/// Polygons of every feature in `layer`; multipolygons are exploded.
pub fn read_polygons(path: &Path, layer: &str) -> AppResult<Vec<Polygon<f64>>> {
    let gpkg = GeoPackage::open(existing(path)?)?;
    let layer = gpkg.read_layer(layer)?;
    let mut polygons = Vec::new();
    for feature in &layer.features {
        let Some(geometry) = feature.geometry.clone() else {
            continue;
        };
        match BasinGeometry::from_geometry(geometry) {
            Ok(basin) => polygons.extend(basin.explode()),
            Err(err) => warn!(fid = ?feature.fid, %err, "skipping non-polygon feature"),
        }
    }
    Ok(polygons)
}

pub fn parameterize_model(request: &ParameterizeRequest) -> AppResult<ParameterizeReport> {
    let mut model = load_model(&request.toml_path)?;

    let static_data = match &request.static_data {
        Some(path) => StaticData::load_xlsx(existing(path)?)?,
        None => StaticData::default(),
    };
    let mut options = ParameterizeOptions::with_static_data(static_data);
    if let Some((path, layer)) = &request.profiles {
        options.manning_profiles = Some(read_profiles(existing(path)?, layer)?);
    }

    let estimated_areas = match &request.water_bodies {
        Some((path, layer)) => {
            let water = WaterBodies::new(read_polygons(path, layer)?);
            estimate_basin_area(&mut model, &water, &BasinAreaOptions::default())?.len()
        }
        None => 0,
    };

    if let Some(source) = &request.peilgebieden {
        let peilgebieden = read_peilgebieden(
            existing(&source.path)?,
            &source.layer,
            &source.level_column,
            &source.code_column,
        )?;
        let unmatched = assign_streefpeil(&mut model, &PeilgebiedIndex::new(peilgebieden))?;
        if !unmatched.is_empty() {
            warn!(basins = ?unmatched, "basins without streefpeil");
        }
    }

    let summary = parameterize(&mut model, &options)?;

    let storage_basins = match &request.berging {
        Some(paths) => add_berging(&mut model, &paths.load()?)?.len(),
        None => 0,
    };

    let aanvoer = match &request.supply_areas {
        Some((path, layer)) => {
            let areas = MultiPolygon::new(read_polygons(path, layer)?);
            Some(set_aanvoer_flags(&mut model, &areas))
        }
        None => None,
    };

    if request.basin_time {
        let start = model.config.start()?;
        let end = model.config.end()?;
        add_basin_time_synthetic(&mut model, options.forcing, start, end)?;
    }
    let forcing_rows = match &request.budgets {
        Some(path) => assign_offline_budgets(&mut model, &BudgetSeries::read_arrow(existing(path)?)?)?,
        None => 0,
    };

    model.write(&request.output)?;
    info!(output = %request.output.display(), "wrote parameterized model");
    Ok(ParameterizeReport {
        summary,
        estimated_areas,
        storage_basins,
        aanvoer,
        forcing_rows,
    })
}
