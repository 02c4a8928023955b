//! Reading solver results and feeding them back into a model.
//!
//! The solver writes Arrow IPC files into the results directory of a bundle.
//! Times are timestamps of any unit, ids any integer type. Columns other than
//! `time`, `node_id` and `level` (basin) or `time`, `from_node_id`,
//! `to_node_id` and `flow_rate` (flow) may be absent.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::{
    Column, DataFrame, DataType, IpcReader, IpcWriter, SerReader, SerWriter, TimeUnit,
};
use rnl_core::{LinkId, NodeId};
use rnl_model::{BasinState, Model, NodeType, Table};
use tracing::{debug, info, warn};

use crate::types::{BasinResult, FlowResult};
use crate::{ResultsError, ResultsResult};

pub const BASIN_RESULTS: &str = "basin.arrow";
pub const FLOW_RESULTS: &str = "flow.arrow";

/// Name of the link id column in results of solvers that still called links edges.
const LEGACY_LINK_ID: &str = "edge_id";

fn read_frame(results_dir: &Path, name: &str) -> ResultsResult<DataFrame> {
    let path = results_dir.join(name);
    if !path.exists() {
        return Err(ResultsError::MissingResult { path });
    }
    let frame = IpcReader::new(File::open(&path)?).finish()?;
    debug!(path = %path.display(), rows = frame.height(), "read results");
    Ok(frame)
}

fn column<'a>(frame: &'a DataFrame, name: &str) -> ResultsResult<&'a Column> {
    frame.column(name).map_err(|_| ResultsError::MissingColumn {
        column: name.to_string(),
    })
}

fn floats(column: &Column) -> ResultsResult<Vec<Option<f64>>> {
    let values = column.cast(&DataType::Float64)?;
    Ok(values.as_materialized_series().f64()?.into_iter().collect())
}

fn integers(column: &Column) -> ResultsResult<Vec<Option<i64>>> {
    let values = column.cast(&DataType::Int64)?;
    Ok(values.as_materialized_series().i64()?.into_iter().collect())
}

fn from_ticks(ticks: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let time = match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(ticks),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(ticks),
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(ticks)),
    };
    time.map(|t| t.naive_utc())
}

fn times(frame: &DataFrame) -> ResultsResult<Vec<NaiveDateTime>> {
    let column = column(frame, "time")?;
    let DataType::Datetime(unit, _) = column.dtype() else {
        return Err(ResultsError::InvalidColumn {
            column: "time".to_string(),
            message: format!("expected a timestamp, found {:?}", column.dtype()),
        });
    };
    let unit = *unit;
    integers(column)?
        .into_iter()
        .enumerate()
        .map(|(row, ticks)| {
            ticks
                .and_then(|t| from_ticks(t, unit))
                .ok_or_else(|| ResultsError::InvalidColumn {
                    column: "time".to_string(),
                    message: format!("no time in row {row}"),
                })
        })
        .collect()
}

fn node_ids(frame: &DataFrame, name: &str) -> ResultsResult<Vec<NodeId>> {
    integers(column(frame, name)?)?
        .into_iter()
        .enumerate()
        .map(|(row, id)| {
            id.and_then(|id| NodeId::try_from(id).ok())
                .ok_or_else(|| ResultsError::InvalidColumn {
                    column: name.to_string(),
                    message: format!("no valid node id in row {row}"),
                })
        })
        .collect()
}

fn required_floats(frame: &DataFrame, name: &str) -> ResultsResult<Vec<f64>> {
    Ok(floats(column(frame, name)?)?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

fn optional_floats(frame: &DataFrame, name: &str) -> ResultsResult<Vec<Option<f64>>> {
    match frame.column(name) {
        Ok(column) => floats(column),
        Err(_) => Ok(vec![None; frame.height()]),
    }
}

/// Basin levels and storages over time from `<results_dir>/basin.arrow`.
pub fn read_basin_results(results_dir: &Path) -> ResultsResult<Vec<BasinResult>> {
    let frame = read_frame(results_dir, BASIN_RESULTS)?;
    let time = times(&frame)?;
    let node_id = node_ids(&frame, "node_id")?;
    let level = required_floats(&frame, "level")?;
    let storage = optional_floats(&frame, "storage")?;
    Ok(time
        .into_iter()
        .zip(node_id)
        .zip(level.into_iter().zip(storage))
        .map(|((time, node_id), (level, storage))| BasinResult {
            time,
            node_id,
            level,
            storage,
        })
        .collect())
}

/// Link flow rates over time from `<results_dir>/flow.arrow`.
pub fn read_flow_results(results_dir: &Path) -> ResultsResult<Vec<FlowResult>> {
    let frame = read_frame(results_dir, FLOW_RESULTS)?;
    let time = times(&frame)?;
    let link_id = match frame.column("link_id").or_else(|_| frame.column(LEGACY_LINK_ID)) {
        Ok(column) => integers(column)?
            .into_iter()
            .map(|id| id.and_then(|id| LinkId::try_from(id).ok()))
            .collect(),
        Err(_) => vec![None; frame.height()],
    };
    let from_node_id = node_ids(&frame, "from_node_id")?;
    let to_node_id = node_ids(&frame, "to_node_id")?;
    let flow_rate = required_floats(&frame, "flow_rate")?;

    let rows = time
        .into_iter()
        .zip(link_id)
        .zip(from_node_id.into_iter().zip(to_node_id))
        .zip(flow_rate)
        .map(|(((time, link_id), (from_node_id, to_node_id)), flow_rate)| FlowResult {
            time,
            link_id,
            from_node_id,
            to_node_id,
            flow_rate,
        })
        .collect();
    Ok(rows)
}

fn time_column(times: impl Iterator<Item = NaiveDateTime>) -> ResultsResult<Column> {
    let millis: Vec<i64> = times.map(|t| t.and_utc().timestamp_millis()).collect();
    Ok(Column::new("time".into(), millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?)
}

fn write_frame(results_dir: &Path, name: &str, mut frame: DataFrame) -> ResultsResult<()> {
    std::fs::create_dir_all(results_dir)?;
    let mut file = File::create(results_dir.join(name))?;
    IpcWriter::new(&mut file).finish(&mut frame)?;
    Ok(())
}

/// Write Basin results in the layout of the solver.
pub fn write_basin_results(results_dir: &Path, rows: &[BasinResult]) -> ResultsResult<()> {
    let frame = DataFrame::new(vec![
        time_column(rows.iter().map(|r| r.time))?,
        Column::new(
            "node_id".into(),
            rows.iter().map(|r| i64::from(r.node_id.get())).collect::<Vec<_>>(),
        ),
        Column::new("level".into(), rows.iter().map(|r| r.level).collect::<Vec<_>>()),
        Column::new("storage".into(), rows.iter().map(|r| r.storage).collect::<Vec<_>>()),
    ])?;
    write_frame(results_dir, BASIN_RESULTS, frame)
}

/// Write flow results in the layout of the solver.
pub fn write_flow_results(results_dir: &Path, rows: &[FlowResult]) -> ResultsResult<()> {
    let frame = DataFrame::new(vec![
        time_column(rows.iter().map(|r| r.time))?,
        Column::new(
            "link_id".into(),
            rows.iter()
                .map(|r| r.link_id.map(|l| i64::from(l.get())))
                .collect::<Vec<_>>(),
        ),
        Column::new(
            "from_node_id".into(),
            rows.iter().map(|r| i64::from(r.from_node_id.get())).collect::<Vec<_>>(),
        ),
        Column::new(
            "to_node_id".into(),
            rows.iter().map(|r| i64::from(r.to_node_id.get())).collect::<Vec<_>>(),
        ),
        Column::new("flow_rate".into(), rows.iter().map(|r| r.flow_rate).collect::<Vec<_>>()),
    ])?;
    write_frame(results_dir, FLOW_RESULTS, frame)
}

/// Level of every Basin at the last time step it appears in.
pub fn final_basin_levels(results: &[BasinResult]) -> BTreeMap<NodeId, f64> {
    let mut last: BTreeMap<NodeId, (NaiveDateTime, f64)> = BTreeMap::new();
    for row in results {
        match last.get(&row.node_id) {
            Some((time, _)) if *time > row.time => {}
            _ => {
                last.insert(row.node_id, (row.time, row.level));
            }
        }
    }
    last.into_iter().map(|(id, (_, level))| (id, level)).collect()
}

/// Write `levels` into `Basin / state`. Levels of nodes that are no Basin
/// (anymore) are skipped. Returns the number of updated Basins.
pub fn update_state(model: &mut Model, levels: &BTreeMap<NodeId, f64>) -> ResultsResult<usize> {
    let mut rows = Vec::new();
    for (&node_id, &level) in levels {
        match model.node_type(node_id) {
            Ok(NodeType::Basin) => rows.push(BasinState { node_id, level }),
            _ => warn!(%node_id, "result for a node that is not a Basin"),
        }
    }
    let updated = rows.len();
    model.update_table(Table::BasinState(rows))?;
    info!(basins = updated, "updated basin state from results");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    fn node(v: u32) -> NodeId {
        NodeId::new(v).unwrap()
    }

    fn basin(d: u32, node_id: u32, level: f64) -> BasinResult {
        BasinResult {
            time: day(d),
            node_id: node(node_id),
            level,
            storage: Some(level * 100.0),
        }
    }

    #[test]
    fn basin_results_survive_arrow() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![basin(1, 1, 1.0), basin(2, 1, 1.5), basin(1, 3, 0.2), basin(2, 3, 0.25)];
        write_basin_results(dir.path(), &rows).unwrap();

        let read = read_basin_results(dir.path()).unwrap();
        assert_eq!(read, rows);
        let levels = final_basin_levels(&read);
        assert_relative_eq!(levels[&node(1)], 1.5);
        assert_relative_eq!(levels[&node(3)], 0.25);
    }

    #[test]
    fn boundary_flows_have_no_link() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            FlowResult {
                time: day(1),
                link_id: LinkId::new(1),
                from_node_id: node(1),
                to_node_id: node(2),
                flow_rate: 0.5,
            },
            FlowResult {
                time: day(1),
                link_id: None,
                from_node_id: node(4),
                to_node_id: node(4),
                flow_rate: -0.001,
            },
        ];
        write_flow_results(dir.path(), &rows).unwrap();
        assert_eq!(read_flow_results(dir.path()).unwrap(), rows);
    }

    #[test]
    fn optional_columns_may_be_absent() {
        let dir = tempfile::tempdir().unwrap();
        let time = |n: usize| time_column((1..=n as u32).map(day)).unwrap();

        // nanosecond timestamps, 32-bit ids and no storage column
        let mut basins = DataFrame::new(vec![
            time(2)
                .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))
                .unwrap(),
            Column::new("node_id".into(), vec![1i32, 1]),
            Column::new("level".into(), vec![0.5, 0.75]),
        ])
        .unwrap();
        let mut file = File::create(dir.path().join(BASIN_RESULTS)).unwrap();
        IpcWriter::new(&mut file).finish(&mut basins).unwrap();

        // links still called edges
        let mut flows = DataFrame::new(vec![
            time(1),
            Column::new("edge_id".into(), vec![7i32]),
            Column::new("from_node_id".into(), vec![1i32]),
            Column::new("to_node_id".into(), vec![2i32]),
            Column::new("flow_rate".into(), vec![0.25]),
        ])
        .unwrap();
        let mut file = File::create(dir.path().join(FLOW_RESULTS)).unwrap();
        IpcWriter::new(&mut file).finish(&mut flows).unwrap();

        let basins = read_basin_results(dir.path()).unwrap();
        assert_eq!(basins.len(), 2);
        assert_eq!(basins[1].time, day(2));
        assert_eq!(basins[1].storage, None);
        let flows = read_flow_results(dir.path()).unwrap();
        assert_eq!(flows[0].link_id.map(|l| l.get()), Some(7));
    }

    #[test]
    fn required_columns_must_be_present() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = DataFrame::new(vec![
            time_column([day(1)].into_iter()).unwrap(),
            Column::new("node_id".into(), vec![1i64]),
        ])
        .unwrap();
        let mut file = File::create(dir.path().join(BASIN_RESULTS)).unwrap();
        IpcWriter::new(&mut file).finish(&mut frame).unwrap();
        assert!(matches!(
            read_basin_results(dir.path()),
            Err(ResultsError::MissingColumn { column }) if column == "level"
        ));
    }

    #[test]
    fn missing_results() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_basin_results(dir.path()),
            Err(ResultsError::MissingResult { .. })
        ));
        assert!(matches!(
            read_flow_results(dir.path()),
            Err(ResultsError::MissingResult { .. })
        ));
    }
}
