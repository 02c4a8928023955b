//! The HyDAMO data model: one validated layer per HyDAMO object class.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rnl_gpkg::{EPSG_RD_NEW, Feature, GeoPackage};
use tracing::{debug, info};

use crate::error::{HydamoError, HydamoResult};
use crate::layer::{ExtendedLayer, SetDataOptions};
use crate::schema::read_schema;

pub const DEFAULT_VERSION: &str = "2.2";

const HYDAMO_2_2: &str = include_str!("../data/HyDAMO_2.2.json");

/// HyDAMO layers that are not part of the model.
pub const IGNORED_LAYERS: [&str; 5] = [
    "afvoeraanvoergebied",
    "imwa_geoobject",
    "leggerwatersysteem",
    "leggerwaterveiligheid",
    "waterbeheergebied",
];

#[derive(Debug, Clone, PartialEq)]
pub struct HyDAMO {
    pub version: String,
    pub ignored_layers: Vec<String>,
    layers: BTreeMap<String, ExtendedLayer>,
    /// Layer names in schema order.
    order: Vec<String>,
}

impl HyDAMO {
    /// Data model of the bundled HyDAMO 2.2 schema.
    pub fn new() -> HydamoResult<Self> {
        Self::from_schema(DEFAULT_VERSION, HYDAMO_2_2, &IGNORED_LAYERS)
    }

    /// Data model of a HyDAMO JSON schema document.
    pub fn from_schema(version: &str, document: &str, ignored_layers: &[&str]) -> HydamoResult<Self> {
        let mut layers = BTreeMap::new();
        let mut order = Vec::new();
        for (name, schema) in read_schema(document)? {
            if ignored_layers.contains(&name.as_str()) {
                continue;
            }
            order.push(name.clone());
            layers.insert(name.clone(), ExtendedLayer::new(name, schema));
        }
        Ok(Self {
            version: version.to_string(),
            ignored_layers: ignored_layers.iter().map(|s| s.to_string()).collect(),
            layers,
            order,
        })
    }

    /// Schema file `HyDAMO_{version}.json` in `schemas_dir`.
    pub fn from_schemas_dir(schemas_dir: &Path, version: &str) -> HydamoResult<Self> {
        let document = fs::read_to_string(schemas_dir.join(format!("HyDAMO_{version}.json")))?;
        Self::from_schema(version, &document, &IGNORED_LAYERS)
    }

    /// All layer names.
    pub fn layers(&self) -> &[String] {
        &self.order
    }

    /// Names of the layers holding data.
    pub fn data_layers(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| self.layers.get(*name).is_some_and(|l| !l.is_empty()))
            .map(String::as_str)
            .collect()
    }

    pub fn layer(&self, name: &str) -> HydamoResult<&ExtendedLayer> {
        self.layers
            .get(name)
            .ok_or_else(|| HydamoError::UnknownLayer(name.to_string()))
    }

    pub fn layer_mut(&mut self, name: &str) -> HydamoResult<&mut ExtendedLayer> {
        self.layers
            .get_mut(name)
            .ok_or_else(|| HydamoError::UnknownLayer(name.to_string()))
    }

    /// Feature of `layer` with this `globalid`.
    pub fn get(&self, layer: &str, global_id: &str) -> HydamoResult<Option<&Feature>> {
        Ok(self.layer(layer)?.get(global_id))
    }

    pub fn set_data(&mut self, layer: &str, features: Vec<Feature>, options: &SetDataOptions) -> HydamoResult<()> {
        self.layer_mut(layer)?.set_data(features, options)
    }

    /// Write every layer holding data. Nothing is written, not even an empty
    /// file, when all layers are empty.
    pub fn to_geopackage(&self, path: &Path, use_schema: bool) -> HydamoResult<()> {
        let layers = self.data_layers();
        if layers.is_empty() {
            debug!(path = %path.display(), "no HyDAMO data to write");
            return Ok(());
        }
        let mut gpkg = GeoPackage::create(path)?;
        for name in &layers {
            gpkg.write_layer(&self.layer(name)?.to_layer(EPSG_RD_NEW, use_schema))?;
        }
        info!(path = %path.display(), layers = layers.len(), "wrote HyDAMO");
        Ok(())
    }

    /// Read all HyDAMO layers from a GeoPackage; other layers are skipped.
    pub fn from_geopackage(path: &Path, options: &SetDataOptions) -> HydamoResult<Self> {
        let mut hydamo = Self::new()?;
        let gpkg = GeoPackage::open(path)?;
        for name in gpkg.list_layers()? {
            if !hydamo.layers.contains_key(&name) {
                debug!(layer = %name, "skipping non-HyDAMO layer");
                continue;
            }
            let layer = gpkg.read_layer(&name)?;
            hydamo.set_data(&name, layer.features, options)?;
        }
        info!(path = %path.display(), layers = hydamo.data_layers().len(), "read HyDAMO");
        Ok(hydamo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_schema() {
        let hydamo = HyDAMO::new().unwrap();
        assert_eq!(hydamo.version, "2.2");
        assert!(hydamo.layers().iter().any(|l| l == "stuw"));
        assert!(!hydamo.layers().iter().any(|l| l == "waterbeheergebied"));
        let stuw = hydamo.layer("stuw").unwrap();
        assert!(stuw.columns().iter().any(|c| c == "kruinbreedte"));
        assert!(stuw.is_empty());
        assert!(hydamo.data_layers().is_empty());
        assert!(matches!(hydamo.layer("waterbeheergebied"), Err(HydamoError::UnknownLayer(_))));
    }

    #[test]
    fn empty_model_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hydamo.gpkg");
        HyDAMO::new().unwrap().to_geopackage(&path, true).unwrap();
        assert!(!path.exists());
    }
}
