//! Estimated Basin areas for Basins without a peilgebied.

use geo::{BooleanOps, BoundingRect, Intersects, MultiPolygon, Polygon};
use rnl_core::NodeId;
use rnl_geometry::buffer_line;
use rnl_model::{BasinArea, Model, NodeType};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};
use tracing::{info, warn};

use crate::error::ParamResult;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasinAreaOptions {
    /// Buffer around the Basin's flow links.
    pub link_buffer: f64,
    /// Water bodies are clipped to this distance from the links.
    pub max_distance: f64,
}

impl Default for BasinAreaOptions {
    fn default() -> Self {
        Self {
            link_buffer: 25.0,
            max_distance: 100.0,
        }
    }
}

type Envelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Water-body polygons (e.g. BGT waterdeel) with an envelope index.
pub struct WaterBodies {
    polygons: Vec<Polygon<f64>>,
    tree: RTree<Envelope>,
}

impl WaterBodies {
    pub fn new(polygons: Vec<Polygon<f64>>) -> Self {
        let items = polygons
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let r = p.bounding_rect()?;
                Some(GeomWithData::new(
                    Rectangle::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]),
                    i,
                ))
            })
            .collect();
        Self {
            polygons,
            tree: RTree::bulk_load(items),
        }
    }

    fn intersecting(&self, area: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        let Some(r) = area.bounding_rect() else {
            return MultiPolygon::new(Vec::new());
        };
        let envelope = AABB::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]);
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|item| item.data)
            .collect();
        hits.sort_unstable();
        MultiPolygon::new(
            hits.into_iter()
                .map(|i| &self.polygons[i])
                .filter(|p| area.intersects(*p))
                .cloned()
                .collect(),
        )
    }
}

/// Buffered flow links of a Basin united with the water bodies they touch.
pub fn estimate_area(
    model: &Model,
    basin_id: NodeId,
    water: &WaterBodies,
    options: &BasinAreaOptions,
) -> ParamResult<Option<MultiPolygon<f64>>> {
    let links = model.incident_links(basin_id);
    let lines: Vec<_> = links.iter().filter(|l| l.is_flow()).map(|l| &l.geometry).collect();
    if lines.is_empty() {
        return Ok(None);
    }
    let mut near = MultiPolygon::new(Vec::new());
    let mut reach = MultiPolygon::new(Vec::new());
    for line in lines {
        near = near.union(&buffer_line(line, options.link_buffer)?);
        reach = reach.union(&buffer_line(line, options.max_distance)?);
    }
    let touched = water.intersecting(&near).intersection(&reach);
    Ok(Some(near.union(&touched)))
}

/// Give every Basin without an area row an estimated area.
pub fn estimate_basin_area(
    model: &mut Model,
    water: &WaterBodies,
    options: &BasinAreaOptions,
) -> ParamResult<Vec<NodeId>> {
    let missing: Vec<NodeId> = model
        .node_ids_of_type(NodeType::Basin)
        .into_iter()
        .filter(|id| model.rows_of::<BasinArea>(*id).next().is_none())
        .collect();
    let mut estimated = Vec::new();
    for basin_id in missing {
        match estimate_area(model, basin_id, water, options)? {
            Some(area) => {
                model.add_basin_area(basin_id, area)?;
                estimated.push(basin_id);
            }
            None => warn!(%basin_id, "basin without flow links, no area estimated"),
        }
    }
    info!(count = estimated.len(), "estimated basin areas");
    Ok(estimated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{canal, id, square};
    use geo::{Area, Contains, Point};

    fn pond(x: f64, y: f64) -> Polygon<f64> {
        square(x, y, 40.0).0.into_iter().next().unwrap()
    }

    #[test]
    fn area_grows_with_touching_water() {
        let mut model = canal();
        model.table_mut::<BasinArea>().retain(|a| a.node_id != id(2));
        let water = WaterBodies::new(vec![pond(500.0, 40.0), pond(500.0, 500.0)]);

        let estimated = estimate_basin_area(&mut model, &water, &BasinAreaOptions::default()).unwrap();
        assert_eq!(estimated, vec![id(2)]);

        let area = &model.rows_of::<BasinArea>(id(2)).next().unwrap().geometry;
        assert!(area.contains(&Point::new(500.0, 55.0)));
        assert!(area.contains(&Point::new(1250.0, 0.0)));
        assert!(!area.contains(&Point::new(500.0, 500.0)));
        assert!(area.unsigned_area() > 1000.0 * 50.0);
        // Basin 4 keeps its own area
        assert_eq!(model.rows_of::<BasinArea>(id(4)).count(), 1);
    }
}
