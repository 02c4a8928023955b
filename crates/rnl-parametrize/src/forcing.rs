//! Dynamic Basin forcing: offline groundwater budgets and gridded meteo.
//!
//! Budgets come from an offline run of the national groundwater model (LHM).
//! Per time step they hold the exchange between groundwater and surface
//! water in m³/s, negative where groundwater drains into the surface water.
//! The main watercourse systems feed the primary Basins, ditches and tube
//! drainage feed the bergend Basins.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::{
    Column, DataFrame, DataType, IpcReader, IpcWriter, SerReader, SerWriter, TimeUnit,
};
use rnl_core::{NodeId, mm_per_day_to_m_per_second};
use rnl_model::config::to_datetime;
use rnl_model::{BasinForcing, BasinStatic, BasinTime, Model, NodeType, Table, TableKind};
use rnl_raster::{Raster, ZonalOptions, zonal_stats};
use tracing::{debug, info, warn};

use crate::berging::{BERGEND, basin_geometry};
use crate::error::{ParamError, ParamResult};

/// Makkink reference evaporation to open water evaporation.
pub const MAKKINK_OPEN_WATER_FACTOR: f64 = 1.26;

const CENTRES: ZonalOptions = ZonalOptions {
    all_touched: false,
    fill_value: None,
};

/// Groundwater budget per Basin and time step, in m³/s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BudgetSeries {
    by_basin: BTreeMap<NodeId, BTreeMap<NaiveDateTime, f64>>,
}

impl BudgetSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a budget; budgets of the same Basin and time are summed.
    pub fn insert(&mut self, node_id: NodeId, time: NaiveDateTime, budget: f64) {
        *self
            .by_basin
            .entry(node_id)
            .or_default()
            .entry(time)
            .or_insert(0.0) += budget;
    }

    pub fn get(&self, node_id: NodeId, time: NaiveDateTime) -> Option<f64> {
        self.by_basin.get(&node_id)?.get(&time).copied()
    }

    pub fn basin_count(&self) -> usize {
        self.by_basin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_basin.is_empty()
    }

    /// Every time step of any Basin, ascending.
    pub fn times(&self) -> BTreeSet<NaiveDateTime> {
        self.by_basin.values().flat_map(|s| s.keys().copied()).collect()
    }

    /// Sum budget grids over the Basin areas: `primary` over the primary
    /// Basins and `secondary` over the bergend Basins. Grids hold m³/s per cell.
    pub fn from_rasters(
        model: &Model,
        primary: &[(NaiveDateTime, Raster)],
        secondary: &[(NaiveDateTime, Raster)],
    ) -> ParamResult<Self> {
        let mut series = Self::new();
        for node in model.nodes_of_type(NodeType::Basin) {
            let geometry = match basin_geometry(model, node.node_id) {
                Ok(geometry) => geometry,
                Err(_) => {
                    warn!(node_id = %node.node_id, "basin without area gets no budget");
                    continue;
                }
            };
            let grids = if node.meta_categorie.as_deref() == Some(BERGEND) {
                secondary
            } else {
                primary
            };
            for (time, grid) in grids {
                let sum = zonal_stats(grid, &geometry, CENTRES).map_or(0.0, |s| s.sum);
                series.insert(node.node_id, *time, sum);
            }
        }
        debug!(basins = series.basin_count(), "summed budget grids");
        Ok(series)
    }

    /// Read columns `time`, `node_id` and `budget` from an Arrow IPC file.
    pub fn read_arrow(path: &Path) -> ParamResult<Self> {
        let frame = IpcReader::new(File::open(path)?).finish()?;
        let column = |name: &str| {
            frame
                .column(name)
                .map_err(|_| ParamError::invalid(format!("{}: no column '{name}'", path.display())))
        };
        let time_column = column("time")?;
        let DataType::Datetime(unit, _) = time_column.dtype() else {
            return Err(ParamError::invalid(format!(
                "{}: time is {:?}, expected a timestamp",
                path.display(),
                time_column.dtype()
            )));
        };
        let unit = *unit;
        let ticks = time_column.cast(&DataType::Int64)?;
        let ids = column("node_id")?.cast(&DataType::Int64)?;
        let budgets = column("budget")?.cast(&DataType::Float64)?;

        let mut series = Self::new();
        let rows = ticks
            .as_materialized_series()
            .i64()?
            .into_iter()
            .zip(ids.as_materialized_series().i64()?)
            .zip(budgets.as_materialized_series().f64()?);
        for (row, ((ticks, node_id), budget)) in rows.enumerate() {
            let time = ticks.and_then(|t| from_ticks(t, unit));
            let node_id = node_id.and_then(|id| NodeId::try_from(id).ok());
            match (time, node_id, budget) {
                (Some(time), Some(node_id), Some(budget)) => series.insert(node_id, time, budget),
                _ => {
                    return Err(ParamError::invalid(format!(
                        "{}: incomplete budget in row {row}",
                        path.display()
                    )));
                }
            }
        }
        debug!(path = %path.display(), basins = series.basin_count(), "read budgets");
        Ok(series)
    }

    pub fn write_arrow(&self, path: &Path) -> ParamResult<()> {
        let rows: Vec<(NodeId, NaiveDateTime, f64)> = self
            .by_basin
            .iter()
            .flat_map(|(id, s)| s.iter().map(|(t, b)| (*id, *t, *b)))
            .collect();
        let millis: Vec<i64> = rows.iter().map(|r| r.1.and_utc().timestamp_millis()).collect();
        let mut frame = DataFrame::new(vec![
            Column::new("time".into(), millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
            Column::new(
                "node_id".into(),
                rows.iter().map(|r| i64::from(r.0)).collect::<Vec<_>>(),
            ),
            Column::new("budget".into(), rows.iter().map(|r| r.2).collect::<Vec<_>>()),
        ])?;
        let mut file = File::create(path)?;
        IpcWriter::new(&mut file).finish(&mut frame)?;
        Ok(())
    }
}

fn from_ticks(ticks: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let time = match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(ticks),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(ticks),
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(ticks)),
    };
    time.map(|t| t.naive_utc())
}

/// Existing Basin / time rows by Basin and time.
fn existing_time_rows(model: &Model) -> BTreeMap<(NodeId, NaiveDateTime), BasinForcing> {
    model
        .table::<BasinTime>()
        .iter()
        .map(|row| ((row.node_id, row.time), row.forcing.clone()))
        .collect()
}

/// Write the budgets as drainage and infiltration into `Basin / time`.
///
/// The series is shifted so that its first time step falls on the model
/// start. Every Basin gets a row per time step; Basins without a budget get
/// zeros. Meteo of existing rows at the same time is kept, other forcing is
/// zero. `Basin / static` is removed. Returns the number of rows written.
pub fn assign_offline_budgets(model: &mut Model, budgets: &BudgetSeries) -> ParamResult<usize> {
    let times = budgets.times();
    let Some(first) = times.first().copied() else {
        return Err(ParamError::invalid("no budgets to assign"));
    };
    let shift = model.config.start()? - first;
    let existing = existing_time_rows(model);

    let mut rows = Vec::new();
    for node_id in model.node_ids_of_type(NodeType::Basin) {
        if !budgets.by_basin.contains_key(&node_id) {
            debug!(%node_id, "basin without budget");
        }
        for &time in &times {
            let budget = budgets.get(node_id, time).unwrap_or(0.0);
            let time = time + shift;
            let meteo = existing.get(&(node_id, time));
            rows.push(BasinTime {
                node_id,
                time,
                forcing: BasinForcing {
                    precipitation: Some(meteo.and_then(|m| m.precipitation).unwrap_or(0.0)),
                    potential_evaporation: Some(
                        meteo.and_then(|m| m.potential_evaporation).unwrap_or(0.0),
                    ),
                    drainage: Some((-budget).max(0.0)),
                    infiltration: Some(budget.max(0.0)),
                    surface_runoff: meteo.and_then(|m| m.surface_runoff),
                },
            });
        }
    }
    let count = rows.len();
    model.remove_table(TableKind::BasinStatic);
    model.set_table(Table::BasinTime(rows));
    info!(rows = count, time_steps = times.len(), "assigned offline budgets");
    Ok(count)
}

/// Daily meteo grids in mm/day: precipitation and Makkink evaporation.
#[derive(Debug, Clone)]
pub struct MeteoGrid {
    pub time: NaiveDateTime,
    pub precipitation: Raster,
    pub evaporation: Raster,
}

/// Mean of a grid over a Basin; the cell under the Basin node when no cell
/// centre lies inside the Basin area.
fn basin_mean(grid: &Raster, model: &Model, node_id: NodeId) -> ParamResult<Option<f64>> {
    let geometry = basin_geometry(model, node_id)?;
    if let Some(stats) = zonal_stats(grid, &geometry, CENTRES) {
        return Ok(Some(stats.mean));
    }
    Ok(grid.value_at(model.node(node_id)?.geometry))
}

/// Write Basin-average precipitation and open water evaporation into
/// `Basin / time`, in m/s.
///
/// Existing rows at the same time keep their drainage and infiltration; new
/// rows take them from `Basin / static`, or zero. `Basin / static` is removed
/// and the model period becomes the period of the grids.
pub fn assign_meteo(model: &mut Model, grids: &[MeteoGrid]) -> ParamResult<usize> {
    let (Some(first), Some(last)) = (
        grids.iter().map(|g| g.time).min(),
        grids.iter().map(|g| g.time).max(),
    ) else {
        return Err(ParamError::invalid("no meteo grids"));
    };
    let statics: BTreeMap<NodeId, BasinForcing> = model
        .table::<BasinStatic>()
        .iter()
        .map(|row| (row.node_id, row.forcing.clone()))
        .collect();
    let mut rows = existing_time_rows(model);

    for node_id in model.node_ids_of_type(NodeType::Basin) {
        for grid in grids {
            let precipitation = basin_mean(&grid.precipitation, model, node_id)?;
            let evaporation = basin_mean(&grid.evaporation, model, node_id)?;
            let forcing = rows.entry((node_id, grid.time)).or_insert_with(|| {
                let fixed = statics.get(&node_id);
                BasinForcing {
                    drainage: Some(fixed.and_then(|f| f.drainage).unwrap_or(0.0)),
                    infiltration: Some(fixed.and_then(|f| f.infiltration).unwrap_or(0.0)),
                    ..BasinForcing::default()
                }
            });
            forcing.precipitation = Some(precipitation.map_or(0.0, mm_per_day_to_m_per_second));
            forcing.potential_evaporation = Some(
                evaporation.map_or(0.0, |e| mm_per_day_to_m_per_second(e) * MAKKINK_OPEN_WATER_FACTOR),
            );
        }
    }

    let rows: Vec<BasinTime> = rows
        .into_iter()
        .map(|((node_id, time), forcing)| BasinTime {
            node_id,
            time,
            forcing,
        })
        .collect();
    let count = rows.len();
    model.remove_table(TableKind::BasinStatic);
    model.set_table(Table::BasinTime(rows));
    if last > first {
        model.config.starttime = to_datetime(first)?;
        model.config.endtime = to_datetime(last)?;
    }
    info!(rows = count, grids = grids.len(), "assigned meteo");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_basin, canal, id};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn day(year: i32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, 1, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    fn row(model: &Model, node_id: u32, time: NaiveDateTime) -> BasinForcing {
        model
            .table::<BasinTime>()
            .iter()
            .find(|r| r.node_id == id(node_id) && r.time == time)
            .map(|r| r.forcing.clone())
            .unwrap()
    }

    #[test]
    fn budgets_split_into_drainage_and_infiltration() {
        let mut model = canal();
        let start = model.config.start().unwrap();
        let mut budgets = BudgetSeries::new();
        // an LHM year that does not match the model period
        budgets.insert(id(2), day(2011, 1), -0.5);
        budgets.insert(id(2), day(2011, 2), 0.25);
        budgets.insert(id(2), day(2011, 2), 0.25);

        assert_eq!(assign_offline_budgets(&mut model, &budgets).unwrap(), 4);
        let first = row(&model, 2, start);
        assert_eq!((first.drainage, first.infiltration), (Some(0.5), Some(0.0)));
        let second = row(&model, 2, start + chrono::Duration::days(1));
        assert_eq!((second.drainage, second.infiltration), (Some(0.0), Some(0.5)));
        // Basin 4 has no budget
        let other = row(&model, 4, start);
        assert_eq!((other.drainage, other.infiltration), (Some(0.0), Some(0.0)));
        assert!(model.table::<BasinStatic>().is_empty());

        assert!(assign_offline_budgets(&mut model, &BudgetSeries::new()).is_err());
    }

    #[test]
    fn budget_grids_follow_the_basin_category() {
        let mut model = canal();
        add_basin(&mut model, 11, 500.0, 100.0, 1.0, BERGEND);
        // every 50 m cell holds 1 m³/s in the primary grid, 3 m³/s in the secondary one
        let grid = |value| Raster::filled(64, 40, 0.0, 1000.0, 50.0, value).unwrap();
        let series =
            BudgetSeries::from_rasters(&model, &[(day(2011, 1), grid(1.0))], &[(day(2011, 1), grid(3.0))])
                .unwrap();
        // a 100 m square covers 4 cell centres
        assert_relative_eq!(series.get(id(2), day(2011, 1)).unwrap(), 4.0);
        assert_relative_eq!(series.get(id(11), day(2011, 1)).unwrap(), 12.0);
        assert_eq!(series.basin_count(), 3);
    }

    #[test]
    fn budgets_survive_arrow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budgets.arrow");
        let mut budgets = BudgetSeries::new();
        budgets.insert(id(2), day(2011, 1), -0.5);
        budgets.insert(id(4), day(2011, 2), 1.5);
        budgets.write_arrow(&path).unwrap();
        assert_eq!(BudgetSeries::read_arrow(&path).unwrap(), budgets);
    }

    #[test]
    fn meteo_keeps_budget_forcing() {
        let mut model = canal();
        let mut budgets = BudgetSeries::new();
        budgets.insert(id(2), day(2020, 1), -0.5);
        assign_offline_budgets(&mut model, &budgets).unwrap();

        let grid = |value| Raster::filled(64, 40, 0.0, 1000.0, 50.0, value).unwrap();
        let grids = [
            MeteoGrid {
                time: day(2020, 1),
                precipitation: grid(8.64),
                evaporation: grid(0.0),
            },
            MeteoGrid {
                time: day(2020, 2),
                precipitation: grid(0.0),
                evaporation: grid(1.0),
            },
        ];
        assert_eq!(assign_meteo(&mut model, &grids).unwrap(), 4);
        let wet = row(&model, 2, day(2020, 1));
        assert_relative_eq!(wet.precipitation.unwrap(), 1e-7);
        assert_eq!(wet.drainage, Some(0.5));
        let dry = row(&model, 4, day(2020, 2));
        assert_relative_eq!(
            dry.potential_evaporation.unwrap(),
            MAKKINK_OPEN_WATER_FACTOR / 1000.0 / 86_400.0
        );
        assert_eq!(model.config.end().unwrap(), day(2020, 2));
    }
}
