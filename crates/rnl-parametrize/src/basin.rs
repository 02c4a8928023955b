//! Basin profile, state, static and time tables.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rnl_core::{NodeId, SECONDS_PER_DAY, round_to_precision};
use rnl_model::config::to_datetime;
use rnl_model::{
    BasinForcing, BasinProfile, BasinState, BasinStatic, BasinTime, Model, NodeType, Table,
    TableKind,
};
use tracing::info;

use crate::error::{ParamError, ParamResult};
use crate::target_level::{basin_area, basin_streefpeil};

/// Depth of the generated profile below streefpeil.
pub const PROFILE_DEPTH: f64 = 2.0;

/// Open-water fraction of a Basin area, by Basin categorie.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenWaterFractions {
    pub by_categorie: BTreeMap<String, f64>,
    pub default: f64,
}

impl Default for OpenWaterFractions {
    fn default() -> Self {
        Self {
            by_categorie: BTreeMap::from([
                ("hoofdwater".to_string(), 0.9),
                ("doorgaand".to_string(), 0.1),
                ("bergend".to_string(), 0.03),
            ]),
            default: 0.1,
        }
    }
}

impl OpenWaterFractions {
    pub fn of(&self, categorie: Option<&str>) -> f64 {
        categorie
            .and_then(|c| self.by_categorie.get(c))
            .copied()
            .unwrap_or(self.default)
    }
}

/// Three-row profile of one Basin: a 0.1 m² bottom at `streefpeil - depth`,
/// open water of `fraction * area` from 1 cm above the bottom up to
/// streefpeil.
pub fn basin_profile(
    node_id: NodeId,
    streefpeil: f64,
    area: f64,
    fraction: f64,
    depth: f64,
) -> Vec<BasinProfile> {
    let open_water = round_to_precision(area * fraction, 0.1);
    let bottom = streefpeil - depth;
    vec![
        BasinProfile {
            node_id,
            level: bottom,
            area: 0.1,
        },
        BasinProfile {
            node_id,
            level: bottom + 0.01,
            area: open_water,
        },
        BasinProfile {
            node_id,
            level: streefpeil,
            area: open_water,
        },
    ]
}

/// Profiles for every Basin from its area row and `meta_streefpeil`.
pub fn basin_profiles(
    model: &Model,
    fractions: &OpenWaterFractions,
    depth: f64,
) -> ParamResult<Vec<BasinProfile>> {
    let mut rows = Vec::new();
    for node in model.nodes_of_type(NodeType::Basin) {
        let node_id = node.node_id;
        let area = basin_area(model, node_id).ok_or(ParamError::MissingBasinArea { node_id })?;
        let streefpeil =
            basin_streefpeil(model, node_id).ok_or(ParamError::MissingStreefpeil { node_id })?;
        let fraction = fractions.of(node.meta_categorie.as_deref());
        rows.extend(basin_profile(node_id, streefpeil, area, fraction, depth));
    }
    Ok(rows)
}

pub fn update_basin_profile(
    model: &mut Model,
    fractions: &OpenWaterFractions,
    depth: f64,
) -> ParamResult<()> {
    let rows = basin_profiles(model, fractions, depth)?;
    info!(basins = rows.len() / 3, "updated Basin profile table");
    model.set_table(Table::BasinProfile(rows));
    Ok(())
}

fn max_by_node(rows: &[BasinProfile], value: impl Fn(&BasinProfile) -> f64) -> BTreeMap<NodeId, f64> {
    let mut max: BTreeMap<NodeId, f64> = BTreeMap::new();
    for row in rows {
        let v = value(row);
        max.entry(row.node_id)
            .and_modify(|m| *m = m.max(v))
            .or_insert(v);
    }
    max
}

/// Initial state at the highest profile level of every Basin.
pub fn update_basin_state(model: &mut Model) {
    let states: Vec<BasinState> = max_by_node(model.table::<BasinProfile>(), |r| r.level)
        .into_iter()
        .map(|(node_id, level)| BasinState { node_id, level })
        .collect();
    info!(count = states.len(), "updated Basin state table");
    model.set_table(Table::BasinState(states));
}

/// Forcing rates in mm/day. Absent rates are written as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForcingRates {
    pub precipitation: Option<f64>,
    pub evaporation: Option<f64>,
    pub drainage: Option<f64>,
    pub infiltration: Option<f64>,
}

/// Basin-average forcing.
///
/// Precipitation and evaporation are depths per second on the open water,
/// scaled by area over maximum profile area so the volume matches the whole
/// Basin area. Drainage and infiltration are volumes: area times rate.
pub fn basin_forcing(model: &Model, rates: ForcingRates) -> ParamResult<Vec<BasinStatic>> {
    let max_profile_area = max_by_node(model.table::<BasinProfile>(), |r| r.area);
    let per_second = |mm: f64| mm / 1000.0 / SECONDS_PER_DAY;
    let mut rows = Vec::new();
    for node_id in model.node_ids_of_type(NodeType::Basin) {
        let area = basin_area(model, node_id).ok_or(ParamError::MissingBasinArea { node_id })?;
        let factor = match max_profile_area.get(&node_id) {
            Some(max) if *max > 0.0 => area / max,
            _ => 1.0,
        };
        let forcing = BasinForcing {
            precipitation: Some(rates.precipitation.map_or(0.0, |p| factor * per_second(p))),
            potential_evaporation: Some(rates.evaporation.map_or(0.0, |e| factor * per_second(e))),
            drainage: Some(rates.drainage.map_or(0.0, |d| area * per_second(d))),
            infiltration: Some(rates.infiltration.map_or(0.0, |i| area * per_second(i))),
            surface_runoff: None,
        };
        rows.push(BasinStatic { node_id, forcing });
    }
    Ok(rows)
}

pub fn update_basin_static(model: &mut Model, rates: ForcingRates) -> ParamResult<()> {
    let rows = basin_forcing(model, rates)?;
    info!(count = rows.len(), ?rates, "updated Basin static table");
    model.set_table(Table::BasinStatic(rows));
    Ok(())
}

/// Replace Basin static forcing by a synthetic series: precipitation at
/// `start`, evaporation at the midpoint and at `end`.
///
/// The model's time window is set to `[start, end]`.
pub fn add_basin_time_synthetic(
    model: &mut Model,
    rates: ForcingRates,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> ParamResult<()> {
    if end <= start {
        return Err(ParamError::invalid(format!("end {end} is not after start {start}")));
    }
    let half = start + (end - start) / 2;
    let forcing = basin_forcing(model, rates)?;
    let mut rows = Vec::with_capacity(forcing.len() * 3);
    for row in forcing {
        let at = |time: NaiveDateTime, precipitation: bool, evaporation: bool| BasinTime {
            node_id: row.node_id,
            time,
            forcing: BasinForcing {
                precipitation: Some(if precipitation {
                    row.forcing.precipitation.unwrap_or(0.0)
                } else {
                    0.0
                }),
                potential_evaporation: Some(if evaporation {
                    row.forcing.potential_evaporation.unwrap_or(0.0)
                } else {
                    0.0
                }),
                drainage: Some(0.0),
                infiltration: Some(0.0),
                surface_runoff: None,
            },
        };
        rows.push(at(start, true, false));
        rows.push(at(half, false, true));
        rows.push(at(end, false, true));
    }
    info!(count = rows.len(), %start, %end, "added synthetic Basin time table");
    model.remove_table(TableKind::BasinStatic);
    model.set_table(Table::BasinTime(rows));
    model.config.starttime = to_datetime(start)?;
    model.config.endtime = to_datetime(end)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{canal, id};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    #[test]
    fn profile_uses_category_fraction() {
        let model = canal();
        let rows = basin_profiles(&model, &OpenWaterFractions::default(), PROFILE_DEPTH).unwrap();
        assert_eq!(rows.len(), 6);
        // Basin 4: hoofdwater, 40_000 m2, streefpeil 0.5
        let basin4: Vec<_> = rows.iter().filter(|r| r.node_id == id(4)).collect();
        assert_relative_eq!(basin4[0].level, -1.5);
        assert_eq!(basin4[0].area, 0.1);
        assert_relative_eq!(basin4[1].level, -1.49);
        assert_relative_eq!(basin4[2].area, 36_000.0, epsilon = 1e-6);
        assert_eq!(basin4[2].level, 0.5);
    }

    #[test]
    fn missing_streefpeil_names_the_basin() {
        let mut model = canal();
        model.table_mut::<rnl_model::BasinArea>()[0].meta_streefpeil = None;
        let err = basin_profiles(&model, &OpenWaterFractions::default(), PROFILE_DEPTH).unwrap_err();
        assert!(matches!(err, ParamError::MissingStreefpeil { node_id } if node_id == id(2)));
    }

    #[test]
    fn state_is_top_of_profile() {
        let mut model = canal();
        update_basin_profile(&mut model, &OpenWaterFractions::default(), PROFILE_DEPTH).unwrap();
        update_basin_state(&mut model);
        let states = model.table::<BasinState>();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].level, 1.0);
        assert_eq!(states[1].level, 0.5);
    }

    #[test]
    fn forcing_scales_to_the_whole_area() {
        let mut model = canal();
        update_basin_profile(&mut model, &OpenWaterFractions::default(), PROFILE_DEPTH).unwrap();
        let rates = ForcingRates {
            precipitation: Some(2.0),
            drainage: Some(1.0),
            ..ForcingRates::default()
        };
        let rows = basin_forcing(&model, rates).unwrap();
        let basin2 = &rows[0].forcing;
        // area / open water = 1 / 0.1
        assert_relative_eq!(basin2.precipitation.unwrap(), 10.0 * 2.0 / 1000.0 / 86_400.0, epsilon = 1e-15);
        assert_relative_eq!(basin2.drainage.unwrap(), 10_000.0 / 1000.0 / 86_400.0, epsilon = 1e-12);
        assert_eq!(basin2.potential_evaporation, Some(0.0));
        assert_eq!(basin2.infiltration, Some(0.0));
    }

    #[test]
    fn synthetic_time_series() {
        let mut model = canal();
        update_basin_profile(&mut model, &OpenWaterFractions::default(), PROFILE_DEPTH).unwrap();
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 1, 3).and_then(|d| d.and_hms_opt(0, 0, 0)).unwrap();
        let rates = ForcingRates {
            precipitation: Some(5.0),
            evaporation: Some(1.0),
            ..ForcingRates::default()
        };
        add_basin_time_synthetic(&mut model, rates, start, end).unwrap();
        assert!(model.table_by_kind(TableKind::BasinStatic).is_none());
        let rows: Vec<_> = model.rows_of::<BasinTime>(id(2)).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].forcing.precipitation.unwrap() > 0.0);
        assert_eq!(rows[0].forcing.potential_evaporation, Some(0.0));
        assert_eq!(rows[1].time, start + chrono::Duration::days(1));
        assert_eq!(rows[1].forcing.precipitation, Some(0.0));
        assert!(rows[2].forcing.potential_evaporation.unwrap() > 0.0);
        assert_eq!(model.config.end().unwrap(), end);
    }

    proptest! {
        #[test]
        fn profile_is_monotone(level in -5.0f64..5.0, area in 100.0f64..1e7, fraction in 0.01f64..1.0) {
            let rows = basin_profile(id(1), level, area, fraction, PROFILE_DEPTH);
            prop_assert!(rows.windows(2).all(|w| w[0].level < w[1].level));
            prop_assert!(rows.windows(2).all(|w| w[0].area <= w[1].area));
        }
    }
}
