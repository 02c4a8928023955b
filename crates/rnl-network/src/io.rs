//! Network persistence and construction from GeoPackage layers.

use std::collections::BTreeMap;
use std::path::Path;

use geo::Geometry;
use rnl_gpkg::{ColumnKind, EPSG_RD_NEW, Feature, GeoPackage, GeometryType, Layer};
use tracing::info;

use crate::error::{NetworkError, NetworkResult};
use crate::network::Network;
use crate::types::{InputLine, NetworkLink, NetworkNode, NetworkNodeType, NetworkOptions};

pub const NODES_LAYER: &str = "nodes";
pub const LINKS_LAYER: &str = "links";

/// Link columns derived from the frame rather than carried attributes.
const RESERVED: [&str; 3] = ["node_from", "node_to", "length"];

impl Network {
    /// Build a network from a line layer; MultiLineStrings are exploded.
    pub fn from_layer(layer: &Layer, options: NetworkOptions) -> NetworkResult<Self> {
        let mut lines = Vec::with_capacity(layer.len());
        for feature in &layer.features {
            let parts = match &feature.geometry {
                Some(Geometry::LineString(l)) => vec![l.clone()],
                Some(Geometry::MultiLineString(ml)) => ml.0.clone(),
                Some(_) => {
                    return Err(NetworkError::InvalidInput {
                        what: format!(
                            "layer '{}' feature {:?} is not a line",
                            layer.name, feature.fid
                        ),
                    });
                }
                None => continue,
            };
            for geometry in parts {
                let mut attributes = BTreeMap::new();
                if let Some(column) = &options.id_column {
                    attributes.insert("id".to_string(), feature.get(column).clone());
                }
                if let Some(column) = &options.name_column {
                    attributes.insert("name".to_string(), feature.get(column).clone());
                }
                if options.id_column.is_none() && options.name_column.is_none() {
                    attributes = feature.attributes.clone();
                }
                lines.push(InputLine {
                    geometry,
                    attributes,
                });
            }
        }
        Self::from_lines(&lines, options)
    }

    /// Node frame as a layer.
    pub fn nodes_layer(&self) -> Layer {
        let mut layer = Layer::new(NODES_LAYER)
            .with_geometry(GeometryType::Point, EPSG_RD_NEW)
            .with_column("type", ColumnKind::Text);
        for node in self.nodes.values() {
            layer.push(
                Feature::new(Some(i64::from(node.id)), Some(Geometry::Point(node.point)))
                    .with("type", node.node_type.as_str()),
            );
        }
        layer
    }

    /// Link frame as a layer.
    pub fn links_layer(&self) -> Layer {
        let mut layer = Layer::new(LINKS_LAYER)
            .with_geometry(GeometryType::LineString, EPSG_RD_NEW)
            .with_column("node_from", ColumnKind::Integer)
            .with_column("node_to", ColumnKind::Integer)
            .with_column("length", ColumnKind::Real);
        for link in self.links.values() {
            let mut feature = Feature::new(
                Some(i64::from(link.id)),
                Some(Geometry::LineString(link.geometry.clone())),
            )
            .with("node_from", link.node_from)
            .with("node_to", link.node_to)
            .with("length", link.length());
            for (name, value) in &link.attributes {
                if !RESERVED.contains(&name.as_str()) {
                    feature.attributes.insert(name.clone(), value.clone());
                }
            }
            layer.push(feature);
        }
        layer.infer_columns();
        layer
    }

    /// Write `nodes` and `links` layers to a GeoPackage.
    pub fn to_gpkg(&self, path: &Path) -> NetworkResult<()> {
        let mut gpkg = if path.exists() {
            GeoPackage::open(path)?
        } else {
            GeoPackage::create(path)?
        };
        gpkg.write_layer(&self.nodes_layer())?;
        gpkg.write_layer(&self.links_layer())?;
        info!(path = %path.display(), nodes = self.node_count(), links = self.link_count(), "wrote network");
        Ok(())
    }

    /// Read a network written by `to_gpkg`.
    pub fn from_gpkg(path: &Path, options: NetworkOptions) -> NetworkResult<Self> {
        let gpkg = GeoPackage::open(path)?;
        let node_layer = gpkg.read_layer(NODES_LAYER)?;
        let link_layer = gpkg.read_layer(LINKS_LAYER)?;

        let mut nodes = BTreeMap::new();
        for feature in node_layer.features {
            let id = feature_id(&feature, NODES_LAYER)?;
            let Some(Geometry::Point(point)) = feature.geometry else {
                return Err(NetworkError::InvalidInput {
                    what: format!("node {id} has no point geometry"),
                });
            };
            let node_type = feature
                .get_str("type")
                .and_then(NetworkNodeType::parse)
                .unwrap_or(NetworkNodeType::Connection);
            nodes.insert(id, NetworkNode { id, point, node_type });
        }

        let mut links = BTreeMap::new();
        for feature in link_layer.features {
            let id = feature_id(&feature, LINKS_LAYER)?;
            let endpoint = |column: &str| {
                feature
                    .get_i64(column)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| NetworkError::InvalidInput {
                        what: format!("link {id} has no valid {column}"),
                    })
            };
            let (node_from, node_to) = (endpoint("node_from")?, endpoint("node_to")?);
            let Some(Geometry::LineString(geometry)) = feature.geometry.clone() else {
                return Err(NetworkError::InvalidInput {
                    what: format!("link {id} has no line geometry"),
                });
            };
            let attributes = feature
                .attributes
                .iter()
                .filter(|(k, _)| !RESERVED.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            links.insert(
                id,
                NetworkLink {
                    id,
                    node_from,
                    node_to,
                    geometry,
                    attributes,
                },
            );
        }
        Self::from_frames(nodes, links, options)
    }
}

fn feature_id(feature: &Feature, layer: &str) -> NetworkResult<u32> {
    feature
        .fid
        .and_then(|fid| u32::try_from(fid).ok())
        .ok_or_else(|| NetworkError::InvalidInput {
            what: format!("feature in '{layer}' has no valid fid"),
        })
}
