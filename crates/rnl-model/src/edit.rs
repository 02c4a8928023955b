//! Editing operations on a [`Model`].
//!
//! Every operation validates its inputs before touching any table, so a
//! failed edit leaves the model unchanged.

use std::collections::BTreeSet;

use geo::{BooleanOps, Coord, LineString, MultiPolygon, Point};
use rnl_core::{LinkId, NodeId};
use rnl_gpkg::Value;
use tracing::{debug, info};

use crate::error::{ModelError, ModelResult};
use crate::model::{LinkAttrs, Model, NodeAttrs};
use crate::node_type::NodeType;
use crate::tables::{
    BasinArea, FlowBoundaryStatic, LevelBoundaryStatic, LinearResistanceStatic,
    ManningResistanceStatic, OutletStatic, PumpStatic, TabulatedRatingCurveStatic, Table,
    TableKind,
};

/// Distance between a connector and the Terminal added by `add_basin_outlet`.
pub const TERMINAL_OFFSET: f64 = 10.0;

/// Operator overrides of a structure's static row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticUpdate {
    pub flow_rate: Option<f64>,
    pub min_upstream_level: Option<f64>,
    pub max_downstream_level: Option<f64>,
    pub level: Option<f64>,
    pub active: Option<bool>,
}

fn reanchor(geometry: &mut LineString<f64>, start: Option<Coord<f64>>, end: Option<Coord<f64>>) {
    if geometry.0.len() < 2 {
        if let (Some(a), Some(b)) = (
            start.or_else(|| geometry.0.first().copied()),
            end.or_else(|| geometry.0.last().copied()),
        ) {
            *geometry = LineString::from(vec![a, b]);
        }
        return;
    }
    if let Some(start) = start {
        geometry.0[0] = start;
    }
    if let Some(end) = end {
        let last = geometry.0.len() - 1;
        geometry.0[last] = end;
    }
}

impl Model {
    /// Change the type of a node.
    ///
    /// Rows of the old type's tables are removed, `data` (or placeholder
    /// rows) are inserted for the new type and incident links get the new
    /// type in their node-type columns.
    pub fn update_node(
        &mut self,
        node_id: NodeId,
        node_type: NodeType,
        data: Vec<Table>,
    ) -> ModelResult<()> {
        let old_type = self.node_type(node_id)?;
        if let Some(table) = data.iter().find(|t| t.kind().node_type() != node_type) {
            return Err(ModelError::WrongTable {
                table: table.kind().to_string(),
                node_type,
            });
        }
        for kind in TableKind::for_node_type(old_type) {
            if let Some(table) = self.table_by_kind(kind).cloned() {
                let mut table = table;
                table.retain_nodes(|id| id != node_id);
                self.set_table(table);
            }
        }
        self.node_mut(node_id)?.node_type = node_type;
        self.insert_rows(node_type, node_id, data)?;
        self.refresh_link_types(node_id);
        debug!(%node_id, from = %old_type, to = %node_type, "updated node type");
        Ok(())
    }

    /// Merge Basin `basin_id` into `to_basin_id`.
    ///
    /// With `are_connected` the connector nodes linking both Basins directly
    /// are removed; it is an error when there are none. Remaining links of
    /// `basin_id` are redirected to `to_basin_id` and the area becomes the
    /// union of both areas. Flow links that turn into self-loops are dropped
    /// only with `are_connected`.
    pub fn merge_basins(
        &mut self,
        basin_id: NodeId,
        to_basin_id: NodeId,
        are_connected: bool,
    ) -> ModelResult<()> {
        self.expect_node_type(basin_id, NodeType::Basin)?;
        self.expect_node_type(to_basin_id, NodeType::Basin)?;
        if basin_id == to_basin_id {
            return Err(ModelError::invalid(format!(
                "cannot merge basin {basin_id} with itself"
            )));
        }

        if are_connected {
            let connectors = self.connecting_nodes(basin_id, to_basin_id);
            let direct = self
                .links()
                .any(|l| l.touches(basin_id) && l.touches(to_basin_id));
            if connectors.is_empty() && !direct {
                return Err(ModelError::invalid(format!(
                    "basins {basin_id} and {to_basin_id} are not connected by one node"
                )));
            }
            for connector in connectors {
                self.remove_node(connector, true)?;
            }
        }

        // area
        let merged: Option<MultiPolygon<f64>> = {
            let areas = self.table::<BasinArea>();
            let from: Vec<&BasinArea> = areas.iter().filter(|a| a.node_id == basin_id).collect();
            let into: Vec<&BasinArea> = areas.iter().filter(|a| a.node_id == to_basin_id).collect();
            if from.is_empty() {
                None
            } else {
                Some(
                    from.iter()
                        .chain(into.iter())
                        .fold(MultiPolygon::new(Vec::new()), |acc, a| acc.union(&a.geometry)),
                )
            }
        };
        if let Some(geometry) = merged {
            let areas = self.table_mut::<BasinArea>();
            let template = areas
                .iter()
                .find(|a| a.node_id == to_basin_id)
                .or_else(|| areas.iter().find(|a| a.node_id == basin_id))
                .cloned();
            areas.retain(|a| a.node_id != basin_id && a.node_id != to_basin_id);
            if let Some(mut area) = template {
                area.node_id = to_basin_id;
                area.geometry = geometry;
                areas.push(area);
            }
        }

        // links
        let to_point = self.node(to_basin_id)?.geometry;
        let mut self_loops = Vec::new();
        for link in self.links_mut() {
            if !link.touches(basin_id) {
                continue;
            }
            let start = (link.from_node_id == basin_id).then_some(to_point.0);
            let end = (link.to_node_id == basin_id).then_some(to_point.0);
            if start.is_some() {
                link.from_node_id = to_basin_id;
            }
            if end.is_some() {
                link.to_node_id = to_basin_id;
            }
            reanchor(&mut link.geometry, start, end);
            if are_connected && link.from_node_id == link.to_node_id && link.is_flow() {
                self_loops.push(link.link_id);
            }
        }
        for link_id in self_loops {
            self.take_link(link_id)?;
        }
        self.refresh_link_types(to_basin_id);

        // references from control tables
        let listeners: Vec<TableKind> = self
            .tables()
            .filter(|t| t.referenced_nodes().contains(&basin_id))
            .map(Table::kind)
            .collect();
        for kind in listeners {
            if let Some(mut table) = self.remove_table(kind) {
                let owners = table.node_ids();
                table.remap_nodes(&|id| {
                    if id == basin_id && !owners.contains(&basin_id) {
                        to_basin_id
                    } else {
                        id
                    }
                });
                self.set_table(table);
            }
        }

        self.remove_rows(basin_id);
        self.take_node(basin_id)?;
        info!(%basin_id, %to_basin_id, are_connected, "merged basins");
        Ok(())
    }

    /// Nodes with a link to `a` and a link to `b` (in any direction).
    fn connecting_nodes(&self, a: NodeId, b: NodeId) -> Vec<NodeId> {
        let neighbours = |node: NodeId| -> BTreeSet<NodeId> {
            self.links()
                .filter(|l| l.is_flow() && l.touches(node))
                .map(|l| if l.from_node_id == node { l.to_node_id } else { l.from_node_id })
                .collect()
        };
        let around_a = neighbours(a);
        neighbours(b)
            .intersection(&around_a)
            .copied()
            .filter(|id| *id != a && *id != b)
            .collect()
    }

    /// Swap the endpoints of a link and reverse its geometry.
    pub fn reverse_link(&mut self, link_id: LinkId) -> ModelResult<()> {
        let link = self.link_mut(link_id)?;
        std::mem::swap(&mut link.from_node_id, &mut link.to_node_id);
        std::mem::swap(&mut link.from_node_type, &mut link.to_node_type);
        link.geometry.0.reverse();
        debug!(%link_id, "reversed link");
        Ok(())
    }

    /// Reverse every flow link touching `node_id`.
    pub fn reverse_direction_at_node(&mut self, node_id: NodeId) -> ModelResult<Vec<LinkId>> {
        self.node(node_id)?;
        let link_ids: Vec<LinkId> = self
            .links()
            .filter(|l| l.is_flow() && l.touches(node_id))
            .map(|l| l.link_id)
            .collect();
        for link_id in &link_ids {
            self.reverse_link(*link_id)?;
        }
        Ok(link_ids)
    }

    /// Remove a node and its sub-table rows.
    ///
    /// Incident links are removed with `remove_links`; otherwise the node
    /// must not be referenced by any link.
    pub fn remove_node(&mut self, node_id: NodeId, remove_links: bool) -> ModelResult<()> {
        self.node(node_id)?;
        let links: Vec<LinkId> = self
            .incident_links(node_id)
            .iter()
            .map(|l| l.link_id)
            .collect();
        if !links.is_empty() && !remove_links {
            return Err(ModelError::NodeInUse { node_id, links });
        }
        for link_id in &links {
            self.take_link(*link_id)?;
        }
        self.remove_rows(node_id);
        self.take_node(node_id)?;
        debug!(%node_id, removed_links = links.len(), "removed node");
        Ok(())
    }

    pub fn remove_link(&mut self, link_id: LinkId) -> ModelResult<()> {
        self.take_link(link_id)?;
        debug!(%link_id, "removed link");
        Ok(())
    }

    /// Point a link to other endpoint(s), keeping its interior vertices.
    pub fn redirect_link(
        &mut self,
        link_id: LinkId,
        from_node_id: Option<NodeId>,
        to_node_id: Option<NodeId>,
    ) -> ModelResult<()> {
        let start = from_node_id
            .map(|id| self.node(id).map(|n| n.geometry.0))
            .transpose()?;
        let end = to_node_id
            .map(|id| self.node(id).map(|n| n.geometry.0))
            .transpose()?;
        let link = self.link(link_id)?;
        let new_from = from_node_id.unwrap_or(link.from_node_id);
        let new_to = to_node_id.unwrap_or(link.to_node_id);
        if new_from == new_to && link.is_flow() {
            return Err(ModelError::SelfLoop { node_id: new_from });
        }
        let link = self.link_mut(link_id)?;
        link.from_node_id = new_from;
        link.to_node_id = new_to;
        reanchor(&mut link.geometry, start, end);
        self.refresh_link_types(new_from);
        self.refresh_link_types(new_to);
        debug!(%link_id, from = %new_from, to = %new_to, "redirected link");
        Ok(())
    }

    /// Add a connector between two nodes: `from -> new -> to`.
    pub fn add_and_connect_node(
        &mut self,
        from_basin_id: NodeId,
        to_basin_id: NodeId,
        geometry: Point<f64>,
        node_type: NodeType,
        attrs: NodeAttrs,
    ) -> ModelResult<NodeId> {
        self.node(from_basin_id)?;
        self.node(to_basin_id)?;
        if !node_type.is_connector() {
            return Err(ModelError::WrongNodeType {
                node_id: attrs.node_id.unwrap_or(NodeId::MIN),
                found: node_type,
                expected: "a connector node type",
            });
        }
        let node_id = self.add_node(node_type, geometry, attrs)?;
        self.add_link(from_basin_id, node_id, LinkAttrs::default())?;
        self.add_link(node_id, to_basin_id, LinkAttrs::default())?;
        info!(%node_id, %from_basin_id, %to_basin_id, "connected basins");
        Ok(node_id)
    }

    /// Add a connector draining `basin_id` into a new Terminal.
    ///
    /// The Terminal is placed `TERMINAL_OFFSET` beyond the connector, in the
    /// direction from the Basin to the connector. Returns the connector id.
    pub fn add_basin_outlet(
        &mut self,
        basin_id: NodeId,
        geometry: Point<f64>,
        node_type: NodeType,
        attrs: NodeAttrs,
    ) -> ModelResult<NodeId> {
        let basin = self.expect_node_type(basin_id, NodeType::Basin)?.geometry;
        let (dx, dy) = (geometry.x() - basin.x(), geometry.y() - basin.y());
        let length = dx.hypot(dy);
        let (ux, uy) = if length > 0.0 {
            (dx / length, dy / length)
        } else {
            (1.0, 0.0)
        };
        let terminal_point = Point::new(
            geometry.x() + TERMINAL_OFFSET * ux,
            geometry.y() + TERMINAL_OFFSET * uy,
        );
        let connector = self.add_node(node_type, geometry, attrs)?;
        let terminal = self.add_node(NodeType::Terminal, terminal_point, NodeAttrs::default())?;
        self.add_link(basin_id, connector, LinkAttrs::default())?;
        self.add_link(connector, terminal, LinkAttrs::default())?;
        info!(%basin_id, %connector, %terminal, "added basin outlet");
        Ok(connector)
    }

    /// Drop basin-area rows without a Basin node. Returns the number dropped.
    pub fn remove_unassigned_basin_area(&mut self) -> usize {
        let basins: BTreeSet<NodeId> = self.node_ids_of_type(NodeType::Basin).into_iter().collect();
        let areas = self.table_mut::<BasinArea>();
        let before = areas.len();
        areas.retain(|a| basins.contains(&a.node_id));
        let removed = before - areas.len();
        if removed > 0 {
            info!(removed, "removed unassigned basin areas");
        }
        removed
    }

    /// One basin-area row per polygon.
    pub fn explode_basin_area(&mut self) {
        let areas = std::mem::take(self.table_mut::<BasinArea>());
        let exploded: Vec<BasinArea> = areas
            .into_iter()
            .flat_map(|area| {
                let polygons = area.geometry.0.clone();
                polygons.into_iter().map(move |polygon| BasinArea {
                    geometry: MultiPolygon::new(vec![polygon]),
                    ..area.clone()
                })
            })
            .collect();
        *self.table_mut::<BasinArea>() = exploded;
    }

    /// Add area to a Basin; an existing area is extended with the union.
    pub fn add_basin_area(&mut self, node_id: NodeId, geometry: MultiPolygon<f64>) -> ModelResult<()> {
        self.expect_node_type(node_id, NodeType::Basin)?;
        let areas = self.table_mut::<BasinArea>();
        match areas.iter_mut().find(|a| a.node_id == node_id) {
            Some(area) => area.geometry = area.geometry.union(&geometry),
            None => areas.push(BasinArea::new(node_id, geometry)),
        }
        debug!(%node_id, "added basin area");
        Ok(())
    }

    /// Replace the area of a Basin.
    pub fn update_basin_area(
        &mut self,
        node_id: NodeId,
        geometry: MultiPolygon<f64>,
    ) -> ModelResult<()> {
        self.expect_node_type(node_id, NodeType::Basin)?;
        let areas = self.table_mut::<BasinArea>();
        let mut rows = areas.iter_mut().filter(|a| a.node_id == node_id);
        match rows.next() {
            Some(area) => area.geometry = geometry,
            None => {
                return Err(ModelError::invalid(format!("basin {node_id} has no area")));
            }
        }
        drop(rows);
        let mut seen = false;
        areas.retain(|a| {
            if a.node_id != node_id {
                return true;
            }
            let keep = !seen;
            seen = true;
            keep
        });
        Ok(())
    }

    /// Move a node and re-anchor the ends of its links.
    pub fn move_node(&mut self, node_id: NodeId, geometry: Point<f64>) -> ModelResult<()> {
        self.node_mut(node_id)?.geometry = geometry;
        for link in self.links_mut() {
            let start = (link.from_node_id == node_id).then_some(geometry.0);
            let end = (link.to_node_id == node_id).then_some(geometry.0);
            if start.is_some() || end.is_some() {
                reanchor(&mut link.geometry, start, end);
            }
        }
        debug!(%node_id, x = geometry.x(), y = geometry.y(), "moved node");
        Ok(())
    }

    /// Set `active = false` on all static rows of a node.
    pub fn deactivate_node(&mut self, node_id: NodeId) -> ModelResult<()> {
        let node_type = self.node_type(node_id)?;
        self.update_static(
            node_id,
            StaticUpdate {
                active: Some(false),
                ..StaticUpdate::default()
            },
        )?;
        debug!(%node_id, %node_type, "deactivated node");
        Ok(())
    }

    /// Apply operator overrides to the static rows of a node.
    pub fn update_static(&mut self, node_id: NodeId, update: StaticUpdate) -> ModelResult<()> {
        let node_type = self.node_type(node_id)?;
        let unsupported = |field: &str| ModelError::Edit {
            tag: "update_static".to_string(),
            message: format!("{field} does not apply to {node_type} node {node_id}"),
        };
        match node_type {
            NodeType::Pump | NodeType::Outlet => {
                if update.level.is_some() {
                    return Err(unsupported("level"));
                }
                let apply = |row: &mut PumpStatic| {
                    if let Some(v) = update.flow_rate {
                        row.flow_rate = v;
                    }
                    if let Some(v) = update.min_upstream_level {
                        row.min_upstream_level = Some(v);
                    }
                    if let Some(v) = update.max_downstream_level {
                        row.max_downstream_level = Some(v);
                    }
                    if let Some(v) = update.active {
                        row.active = Some(v);
                    }
                };
                if node_type == NodeType::Pump {
                    self.table_mut::<PumpStatic>()
                        .iter_mut()
                        .filter(|r| r.node_id == node_id)
                        .for_each(apply);
                } else {
                    self.table_mut::<OutletStatic>()
                        .iter_mut()
                        .filter(|r| r.node_id == node_id)
                        .for_each(|r| apply(&mut r.0));
                }
            }
            NodeType::LevelBoundary => {
                if update.flow_rate.is_some() {
                    return Err(unsupported("flow_rate"));
                }
                for row in self
                    .table_mut::<LevelBoundaryStatic>()
                    .iter_mut()
                    .filter(|r| r.node_id == node_id)
                {
                    if let Some(v) = update.level {
                        row.level = v;
                    }
                    if let Some(v) = update.active {
                        row.active = Some(v);
                    }
                }
            }
            NodeType::FlowBoundary => {
                if update.level.is_some() {
                    return Err(unsupported("level"));
                }
                for row in self
                    .table_mut::<FlowBoundaryStatic>()
                    .iter_mut()
                    .filter(|r| r.node_id == node_id)
                {
                    if let Some(v) = update.flow_rate {
                        row.flow_rate = v;
                    }
                    if let Some(v) = update.active {
                        row.active = Some(v);
                    }
                }
            }
            NodeType::TabulatedRatingCurve => {
                if update.flow_rate.is_some() || update.level.is_some() {
                    return Err(unsupported("flow_rate/level"));
                }
                for row in self
                    .table_mut::<TabulatedRatingCurveStatic>()
                    .iter_mut()
                    .filter(|r| r.node_id == node_id)
                {
                    if let Some(v) = update.max_downstream_level {
                        row.max_downstream_level = Some(v);
                    }
                    if let Some(v) = update.active {
                        row.active = Some(v);
                    }
                }
            }
            NodeType::ManningResistance => {
                if let Some(v) = update.active {
                    self.table_mut::<ManningResistanceStatic>()
                        .iter_mut()
                        .filter(|r| r.node_id == node_id)
                        .for_each(|r| r.active = Some(v));
                }
            }
            NodeType::LinearResistance => {
                if let Some(v) = update.active {
                    self.table_mut::<LinearResistanceStatic>()
                        .iter_mut()
                        .filter(|r| r.node_id == node_id)
                        .for_each(|r| r.active = Some(v));
                }
            }
            _ => return Err(unsupported("a static update")),
        }
        debug!(%node_id, ?update, "updated static");
        Ok(())
    }

    /// Set a meta attribute on a node.
    pub fn set_node_meta(
        &mut self,
        node_id: NodeId,
        key: &str,
        value: impl Into<Value>,
    ) -> ModelResult<()> {
        self.node_mut(node_id)?.set_meta(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{BasinProfile, DiscreteControlCondition};
    use crate::test_support::{add_basin, add_connector, id, two_basin_model};
    use geo::Area;

    fn link_between(model: &Model, from: u32, to: u32) -> Option<LinkId> {
        model.find_link(id(from), id(to)).map(|l| l.link_id)
    }

    #[test]
    fn merge_connected_basins_drops_connector() {
        let mut model = two_basin_model();
        let area_before: f64 = model.table::<BasinArea>().iter().map(|a| a.geometry.unsigned_area()).sum();
        model.merge_basins(id(3), id(1), true).unwrap();
        assert!(!model.has_node(id(3)));
        assert!(!model.has_node(id(2)));
        assert_eq!(model.link_count(), 0);
        let areas = model.table::<BasinArea>();
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].node_id, id(1));
        assert!((areas[0].geometry.unsigned_area() - area_before).abs() < 1e-6);
        assert_eq!(model.rows_of::<BasinProfile>(id(3)).count(), 0);
    }

    #[test]
    fn merge_unconnected_keeps_connector_loop() {
        let mut model = two_basin_model();
        model.merge_basins(id(3), id(1), false).unwrap();
        assert!(link_between(&model, 1, 2).is_some());
        let back = model.find_link(id(2), id(1)).unwrap();
        assert_eq!(back.geometry.0.last(), Some(&Coord { x: 0.0, y: 0.0 }));
        assert_eq!(back.to_node_type, Some(NodeType::Basin));
    }

    #[test]
    fn self_loops_are_dropped_only_for_connected_basins() {
        for are_connected in [true, false] {
            let mut model = two_basin_model();
            let direct = model.add_link(id(3), id(1), LinkAttrs::default()).unwrap();
            model.merge_basins(id(3), id(1), are_connected).unwrap();
            let kept = model.link(direct).ok().map(|l| (l.from_node_id, l.to_node_id));
            if are_connected {
                assert_eq!(kept, None);
            } else {
                assert_eq!(kept, Some((id(1), id(1))));
            }
        }
    }

    #[test]
    fn merge_requires_connection() {
        let mut model = two_basin_model();
        add_basin(&mut model, 5, 100.0);
        let err = model.merge_basins(id(5), id(1), true).unwrap_err();
        assert!(matches!(err, ModelError::Invalid { .. }));
        assert!(model.has_node(id(5)));
    }

    #[test]
    fn merge_retargets_listeners() {
        let mut model = two_basin_model();
        let control = add_connector(&mut model, NodeType::DiscreteControl, 9, 30.0);
        model.table_mut::<DiscreteControlCondition>().push(DiscreteControlCondition {
            node_id: control,
            listen_node_id: id(3),
            variable: "level".into(),
            greater_than: 0.0,
            meta: Default::default(),
        });
        model.merge_basins(id(3), id(1), false).unwrap();
        assert_eq!(model.table::<DiscreteControlCondition>()[0].listen_node_id, id(1));
    }

    #[test]
    fn reverse_link_is_self_inverse() {
        let mut model = two_basin_model();
        let link_id = link_between(&model, 1, 2).unwrap();
        let before = model.link(link_id).unwrap().clone();
        model.reverse_link(link_id).unwrap();
        let reversed = model.link(link_id).unwrap();
        assert_eq!((reversed.from_node_id, reversed.to_node_id), (id(2), id(1)));
        assert_eq!(reversed.from_node_type, Some(NodeType::Pump));
        model.reverse_link(link_id).unwrap();
        assert_eq!(model.link(link_id).unwrap(), &before);
    }

    #[test]
    fn remove_node_respects_flag() {
        let mut model = two_basin_model();
        assert!(matches!(
            model.remove_node(id(2), false),
            Err(ModelError::NodeInUse { .. })
        ));
        model.remove_node(id(2), true).unwrap();
        assert_eq!(model.link_count(), 0);
        assert!(model.table::<PumpStatic>().is_empty());
    }

    #[test]
    fn update_node_swaps_tables_and_link_types() {
        let mut model = two_basin_model();
        model.update_node(id(2), NodeType::Outlet, Vec::new()).unwrap();
        assert!(model.table::<PumpStatic>().is_empty());
        assert_eq!(model.table::<OutletStatic>().len(), 1);
        let link = model.find_link(id(1), id(2)).unwrap();
        assert_eq!(link.to_node_type, Some(NodeType::Outlet));
    }

    #[test]
    fn redirect_keeps_interior_vertices() {
        let mut model = two_basin_model();
        let link_id = link_between(&model, 2, 3).unwrap();
        model.link_mut(link_id).unwrap().geometry =
            LineString::from(vec![(10.0, 0.0), (15.0, 3.0), (20.0, 0.0)]);
        add_basin(&mut model, 4, 40.0);
        model.redirect_link(link_id, None, Some(id(4))).unwrap();
        let link = model.link(link_id).unwrap();
        assert_eq!(link.to_node_id, id(4));
        assert_eq!(
            link.geometry,
            LineString::from(vec![(10.0, 0.0), (15.0, 3.0), (40.0, 0.0)])
        );
    }

    #[test]
    fn basin_outlet_adds_terminal() {
        let mut model = two_basin_model();
        let connector = model
            .add_basin_outlet(id(3), Point::new(30.0, 0.0), NodeType::Outlet, NodeAttrs::default())
            .unwrap();
        let terminal = model.outgoing_links(connector)[0].to_node_id;
        let node = model.node(terminal).unwrap();
        assert_eq!(node.node_type, NodeType::Terminal);
        assert_eq!(node.geometry, Point::new(40.0, 0.0));
    }

    #[test]
    fn explode_and_remove_unassigned_areas() {
        let mut model = two_basin_model();
        model.table_mut::<BasinArea>().push(BasinArea::new(
            id(77),
            crate::test_support::square(100.0, 100.0, 1.0),
        ));
        assert_eq!(model.remove_unassigned_basin_area(), 1);
        let mut two = crate::test_support::square(0.0, 0.0, 1.0);
        two.0.extend(crate::test_support::square(5.0, 5.0, 1.0).0);
        model.update_basin_area(id(1), two).unwrap();
        model.explode_basin_area();
        assert_eq!(model.rows_of::<BasinArea>(id(1)).count(), 2);
    }

    #[test]
    fn static_updates_follow_node_type() {
        let mut model = two_basin_model();
        model
            .update_static(
                id(2),
                StaticUpdate {
                    flow_rate: Some(1.0),
                    ..StaticUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(model.table::<PumpStatic>()[0].flow_rate, 1.0);
        model.deactivate_node(id(2)).unwrap();
        assert_eq!(model.table::<PumpStatic>()[0].active, Some(false));
        assert!(model.deactivate_node(id(1)).is_err());
    }

    #[test]
    fn move_node_reanchors_links() {
        let mut model = two_basin_model();
        model.move_node(id(2), Point::new(10.0, 4.0)).unwrap();
        let incoming = model.find_link(id(1), id(2)).unwrap();
        assert_eq!(incoming.geometry.0[1], Coord { x: 10.0, y: 4.0 });
        let outgoing = model.find_link(id(2), id(3)).unwrap();
        assert_eq!(outgoing.geometry.0[0], Coord { x: 10.0, y: 4.0 });
    }
}
