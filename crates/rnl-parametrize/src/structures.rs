//! Pump and Outlet static tables from category defaults and overrides.

use std::collections::BTreeMap;

use rnl_core::{NodeId, round_decimals, round_to_significant_digits};
use rnl_model::{
    Model, Node, NodeFunction, NodeType, OutletStatic, StopAt, StructureStatic, Table,
};
use tracing::{debug, info};

use crate::error::{ParamError, ParamResult};
use crate::static_data::{CategoryDefaults, StaticData};
use crate::target_level::{basin_area, downstream_target_level, upstream_target_level};

const SIGNIFICANT_DIGITS: u32 = 3;

/// Set `meta_function` (and `meta_categorie` from the override sheet) on
/// every Pump and Outlet with a known category. Returns the number of nodes
/// updated.
pub fn populate_function(model: &mut Model, static_data: &StaticData) -> usize {
    let mut updates: Vec<(NodeId, String, NodeFunction)> = Vec::new();
    for node_type in [NodeType::Pump, NodeType::Outlet] {
        for node in model.nodes_of_type(node_type) {
            if let Some(categorie) = static_data.categorie_of(node)
                && let Some(defaults) = static_data.category(categorie)
            {
                updates.push((node.node_id, categorie.to_string(), defaults.function));
            }
        }
    }
    let count = updates.len();
    for (node_id, categorie, function) in updates {
        if let Ok(node) = model.node_mut(node_id) {
            node.meta_categorie = Some(categorie);
            node.meta_function = Some(function);
        }
    }
    debug!(count, "populated meta_function");
    count
}

fn resolve_categories<'a>(
    nodes: &[&'a Node],
    node_type: NodeType,
    static_data: &'a StaticData,
) -> ParamResult<Vec<(&'a Node, &'a str, &'a CategoryDefaults)>> {
    let mut missing = Vec::new();
    let mut unknown: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
    let mut resolved = Vec::with_capacity(nodes.len());
    for node in nodes {
        match static_data.categorie_of(node) {
            None => missing.push(node.node_id),
            Some(categorie) => match static_data.category(categorie) {
                Some(defaults) => resolved.push((*node, categorie, defaults)),
                None => unknown.entry(categorie).or_default().push(node.node_id),
            },
        }
    }
    if !missing.is_empty() {
        return Err(ParamError::MissingCategory {
            node_type,
            node_ids: missing,
        });
    }
    if !unknown.is_empty() {
        let categorie = unknown.keys().copied().collect::<Vec<_>>().join(", ");
        return Err(ParamError::UnknownCategory {
            categorie,
            node_ids: unknown.into_values().flatten().collect(),
        });
    }
    Ok(resolved)
}

/// Flow rate from the category: specific discharge over the Basins the
/// structure drains (outlet) or supplies (inlet), else the fixed rate.
fn default_flow_rate(
    model: &Model,
    node_id: NodeId,
    defaults: &CategoryDefaults,
) -> ParamResult<Option<f64>> {
    if let Some(mm_per_day) = defaults.flow_rate_mm_per_day {
        let basins = match defaults.function {
            NodeFunction::Outlet => model.get_upstream_basins(node_id, &StopAt::function())?,
            NodeFunction::Inlet => model.get_downstream_basins(node_id, &StopAt::function())?,
        };
        let area: f64 = basins
            .iter()
            .filter_map(|basin_id| basin_area(model, *basin_id))
            .sum();
        let flow_rate = area * mm_per_day / 1000.0 / rnl_core::SECONDS_PER_DAY;
        return Ok(Some(round_to_significant_digits(flow_rate, SIGNIFICANT_DIGITS)?));
    }
    Ok(defaults.flow_rate)
}

/// Static rows for all nodes of `node_type` (Pump or Outlet).
///
/// Overrides win; missing values come from the category defaults. Nodes
/// without a category, with an unknown category or without a computable
/// flow rate are reported together.
pub fn structure_static(
    model: &Model,
    static_data: &StaticData,
    node_type: NodeType,
) -> ParamResult<Vec<StructureStatic>> {
    if !matches!(node_type, NodeType::Pump | NodeType::Outlet) {
        return Err(ParamError::invalid(format!(
            "static structure tables exist for Pump and Outlet, not {node_type}"
        )));
    }
    let nodes: Vec<&Node> = model.nodes_of_type(node_type).collect();
    let resolved = resolve_categories(&nodes, node_type, static_data)?;

    let mut rows = Vec::with_capacity(resolved.len());
    let mut no_flow_rate = Vec::new();
    for (node, categorie, defaults) in resolved {
        let node_id = node.node_id;
        let overrides = static_data.structure_override(node);

        let flow_rate = match overrides.and_then(|o| o.flow_rate) {
            Some(flow_rate) => Some(round_to_significant_digits(flow_rate, SIGNIFICANT_DIGITS)?),
            None => default_flow_rate(model, node_id, defaults)?,
        };
        let Some(flow_rate) = flow_rate else {
            no_flow_rate.push(node_id);
            continue;
        };

        let mut row = StructureStatic::new(node_id, flow_rate);
        row.min_upstream_level = match overrides.and_then(|o| o.min_upstream_level) {
            Some(level) => Some(level),
            None => upstream_target_level(model, node_id)?
                .map(|level| round_decimals(level + defaults.upstream_level_offset, 2)),
        };
        row.max_downstream_level = match overrides.and_then(|o| o.max_downstream_level) {
            Some(level) => Some(level),
            None => downstream_target_level(model, node_id)?
                .map(|level| round_decimals(level - defaults.downstream_level_offset, 2)),
        };
        row.meta.insert("meta_categorie".to_string(), categorie.into());
        if let Some(code) = &node.meta_code_waterbeheerder {
            row.meta
                .insert("meta_code_waterbeheerder".to_string(), code.as_str().into());
        }
        if let Some(remark) = overrides.and_then(|o| o.opmerking_waterbeheerder.as_deref()) {
            row.meta
                .insert("meta_opmerking_waterbeheerder".to_string(), remark.into());
        }
        rows.push(row);
    }
    if !no_flow_rate.is_empty() {
        return Err(ParamError::NoFlowRate {
            node_ids: no_flow_rate,
        });
    }
    Ok(rows)
}

/// Replace the Pump and Outlet static tables.
pub fn update_pump_outlet_static(model: &mut Model, static_data: &StaticData) -> ParamResult<()> {
    let pumps = structure_static(model, static_data, NodeType::Pump)?;
    let outlets = structure_static(model, static_data, NodeType::Outlet)?;
    info!(pumps = pumps.len(), outlets = outlets.len(), "updated structure static tables");
    model.set_table(Table::PumpStatic(pumps));
    model.set_table(Table::OutletStatic(
        outlets.into_iter().map(OutletStatic).collect(),
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_data::StructureOverride;
    use crate::test_support::{canal, id};
    use rnl_model::NodeAttrs;

    fn parameterized() -> (Model, StaticData) {
        let mut model = canal();
        let data = StaticData::default();
        populate_function(&mut model, &data);
        (model, data)
    }

    fn row(rows: &[StructureStatic], node_id: u32) -> &StructureStatic {
        rows.iter().find(|r| r.node_id == id(node_id)).unwrap()
    }

    #[test]
    fn function_follows_category() {
        let (model, _) = parameterized();
        assert_eq!(model.node(id(8)).unwrap().meta_function, Some(NodeFunction::Outlet));
        assert_eq!(model.node(id(10)).unwrap().meta_function, Some(NodeFunction::Inlet));
    }

    #[test]
    fn pump_defaults_from_upstream_area_and_levels() {
        let (model, data) = parameterized();
        let pumps = structure_static(&model, &data, NodeType::Pump).unwrap();
        let pump = row(&pumps, 8);
        // 10_000 m2 * 15 mm/day
        approx::assert_relative_eq!(pump.flow_rate, 0.00174);
        assert_eq!(pump.min_upstream_level, Some(1.0));
        assert_eq!(pump.max_downstream_level, Some(0.3));
    }

    #[test]
    fn outlet_and_inlet_defaults() {
        let (model, data) = parameterized();
        let outlets = structure_static(&model, &data, NodeType::Outlet).unwrap();
        // the inlet stops the upstream walk: Basins 2 and 4, 50_000 m2 * 50 mm/day
        let uitlaat = row(&outlets, 5);
        approx::assert_relative_eq!(uitlaat.flow_rate, 0.0289);
        assert_eq!(uitlaat.min_upstream_level, Some(0.5));
        assert_eq!(uitlaat.max_downstream_level, None);
        // Pump 8 and Outlet 5 stop the downstream walk: Basins 2 and 4 again
        let inlaat = row(&outlets, 10);
        approx::assert_relative_eq!(inlaat.flow_rate, 0.00231);
        assert_eq!(inlaat.min_upstream_level, None);
        assert_eq!(inlaat.max_downstream_level, Some(1.0));
    }

    #[test]
    fn overrides_win() {
        let (model, mut data) = parameterized();
        data.pump.push(StructureOverride {
            code: Some("KGM8".to_string()),
            flow_rate: Some(1.23456),
            max_downstream_level: Some(0.75),
            opmerking_waterbeheerder: Some("capaciteit uit legger".to_string()),
            ..StructureOverride::default()
        });
        let pumps = structure_static(&model, &data, NodeType::Pump).unwrap();
        let pump = row(&pumps, 8);
        assert_eq!(pump.flow_rate, 1.23);
        assert_eq!(pump.max_downstream_level, Some(0.75));
        assert_eq!(pump.min_upstream_level, Some(1.0));
        assert!(pump.meta.contains_key("meta_opmerking_waterbeheerder"));
    }

    #[test]
    fn missing_categories_are_reported_together() {
        let (mut model, data) = parameterized();
        model.node_mut(id(5)).unwrap().meta_categorie = None;
        model.node_mut(id(10)).unwrap().meta_categorie = None;
        let err = structure_static(&model, &data, NodeType::Outlet).unwrap_err();
        match err {
            ParamError::MissingCategory { node_ids, .. } => assert_eq!(node_ids, vec![id(5), id(10)]),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn category_without_any_flow_rate() {
        let (mut model, mut data) = parameterized();
        data.defaults.insert(
            "Stuw".to_string(),
            CategoryDefaults {
                upstream_level_offset: 0.0,
                downstream_level_offset: 0.0,
                flow_rate: None,
                flow_rate_mm_per_day: None,
                function: NodeFunction::Outlet,
            },
        );
        model
            .add_and_connect_node(
                id(4),
                id(6),
                geo::Point::new(2600.0, 10.0),
                NodeType::Outlet,
                NodeAttrs {
                    node_id: Some(id(11)),
                    meta_categorie: Some("Stuw".to_string()),
                    ..NodeAttrs::default()
                },
            )
            .unwrap();
        let err = structure_static(&model, &data, NodeType::Outlet).unwrap_err();
        assert!(matches!(err, ParamError::NoFlowRate { ref node_ids } if node_ids == &vec![id(11)]));
    }

    #[test]
    fn update_replaces_placeholder_rows() {
        let (mut model, data) = parameterized();
        update_pump_outlet_static(&mut model, &data).unwrap();
        assert_eq!(model.table::<OutletStatic>().len(), 2);
        assert_eq!(model.rows_of::<StructureStatic>(id(8)).count(), 1);
    }
}
