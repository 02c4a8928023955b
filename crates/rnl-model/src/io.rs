//! Model bundles: `<name>.toml` plus `database.gpkg`, which holds every
//! table, time tables included.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use rnl_gpkg::{ColumnKind, GeoPackage, GeometryType, Layer};
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::{ModelError, ModelResult};
use crate::model::Model;
use crate::node::{Link, Node};
use crate::tables::{Table, TableKind};

pub const DATABASE_FILE: &str = "database.gpkg";
pub const NODE_LAYER: &str = "Node";
pub const LINK_LAYER: &str = "Link";
/// Name of the link layer in databases written before links were renamed.
pub const LEGACY_LINK_LAYER: &str = "Edge";

/// Path of the database next to a root descriptor.
pub fn database_path(toml_path: &Path, config: &ModelConfig) -> PathBuf {
    within(&bundle_dir(toml_path), &config.input_dir).join(DATABASE_FILE)
}

/// Path of the results directory of a bundle.
pub fn results_path(toml_path: &Path, config: &ModelConfig) -> PathBuf {
    within(&bundle_dir(toml_path), &config.results_dir)
}

fn bundle_dir(toml_path: &Path) -> PathBuf {
    toml_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// `relative` below `dir`, with `.` components dropped so that the result
/// can be created with [`fs::create_dir_all`].
fn within(dir: &Path, relative: &Path) -> PathBuf {
    relative
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .fold(dir.to_path_buf(), |path, c| path.join(c))
}

/// Node and Link rows as stored, duplicates and dangling references included.
#[derive(Debug, Clone, Default)]
pub struct Frames {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl Frames {
    pub fn from_model(model: &Model) -> Self {
        Self {
            nodes: model.nodes().cloned().collect(),
            links: model.links().cloned().collect(),
        }
    }

    pub fn read(gpkg: &GeoPackage) -> ModelResult<Self> {
        let nodes = gpkg
            .read_layer(NODE_LAYER)?
            .features
            .iter()
            .map(Node::from_feature)
            .collect::<ModelResult<Vec<_>>>()?;
        let links = match link_layer_name(gpkg)? {
            Some(name) => gpkg
                .read_layer(name)?
                .features
                .iter()
                .map(Link::from_feature)
                .collect::<ModelResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Self { nodes, links })
    }
}

fn link_layer_name(gpkg: &GeoPackage) -> ModelResult<Option<&'static str>> {
    if gpkg.has_layer(LINK_LAYER)? {
        Ok(Some(LINK_LAYER))
    } else if gpkg.has_layer(LEGACY_LINK_LAYER)? {
        Ok(Some(LEGACY_LINK_LAYER))
    } else {
        Ok(None)
    }
}

impl Model {
    /// Write all tables into a GeoPackage.
    pub fn to_database(&self, gpkg: &mut GeoPackage) -> ModelResult<()> {
        let srs_id = self.config.srs_id()?;

        let mut nodes = Layer::new(NODE_LAYER)
            .with_geometry(GeometryType::Point, srs_id)
            .with_column("node_id", ColumnKind::Integer)
            .with_column("node_type", ColumnKind::Text)
            .with_column("name", ColumnKind::Text)
            .with_column("subnetwork_id", ColumnKind::Integer);
        for node in self.nodes() {
            let mut feature = node.to_feature()?;
            feature.fid = Some(i64::from(node.node_id.get()));
            nodes.push(feature);
        }
        nodes.infer_columns();
        gpkg.write_layer(&nodes)?;

        let mut links = Layer::new(LINK_LAYER)
            .with_geometry(GeometryType::LineString, srs_id)
            .with_column("link_id", ColumnKind::Integer)
            .with_column("from_node_id", ColumnKind::Integer)
            .with_column("to_node_id", ColumnKind::Integer)
            .with_column("link_type", ColumnKind::Text)
            .with_column("name", ColumnKind::Text);
        for link in self.links() {
            let mut feature = link.to_feature()?;
            feature.fid = Some(i64::from(link.link_id.get()));
            links.push(feature);
        }
        links.infer_columns();
        gpkg.write_layer(&links)?;

        for table in self.tables().filter(|t| !t.is_empty()) {
            let mut table = table.clone();
            table.sort();
            gpkg.write_layer(&table.to_layer(srs_id)?)?;
        }
        Ok(())
    }

    /// Read a model from a GeoPackage; tables absent from the file stay empty.
    pub fn from_database(gpkg: &GeoPackage, config: ModelConfig) -> ModelResult<Model> {
        let frames = Frames::read(gpkg)?;
        let mut model = Model::new(config);
        for node in frames.nodes {
            model.insert_node(node)?;
        }
        for link in frames.links {
            model.insert_link(link)?;
        }
        let known: BTreeSet<String> = [NODE_LAYER, LINK_LAYER, LEGACY_LINK_LAYER]
            .into_iter()
            .map(String::from)
            .collect();
        for name in gpkg.list_layers()? {
            if known.contains(&name) {
                continue;
            }
            match TableKind::parse(&name) {
                Ok(kind) => {
                    let layer = gpkg.read_layer(&name)?;
                    let table = Table::from_layer(kind, &layer)?;
                    debug!(table = %kind, rows = table.len(), "read table");
                    model.set_table(table);
                }
                Err(_) => warn!(layer = %name, "skipping unknown layer"),
            }
        }
        Ok(model)
    }

    /// Write the bundle rooted at `toml_path`, creating its directories.
    pub fn write(&mut self, toml_path: &Path) -> ModelResult<()> {
        let dir = bundle_dir(toml_path);
        let input_dir = within(&dir, &self.config.input_dir);
        for path in [&dir, &input_dir, &within(&dir, &self.config.results_dir)] {
            fs::create_dir_all(path)?;
        }
        fs::write(toml_path, self.config.to_toml()?)?;

        let db_path = input_dir.join(DATABASE_FILE);
        if db_path.exists() {
            fs::remove_file(&db_path)?;
        }
        let mut gpkg = GeoPackage::create(&db_path)?;
        self.to_database(&mut gpkg)?;
        self.set_filepath(toml_path);
        info!(
            path = %toml_path.display(),
            nodes = self.node_count(),
            links = self.link_count(),
            "wrote model"
        );
        Ok(())
    }

    /// Read the bundle rooted at `toml_path`.
    pub fn read(toml_path: &Path) -> ModelResult<Model> {
        let text = fs::read_to_string(toml_path)?;
        let config = ModelConfig::from_toml(&text)?;
        let db_path = database_path(toml_path, &config);
        if !db_path.exists() {
            return Err(ModelError::invalid(format!(
                "database {} not found",
                db_path.display()
            )));
        }
        let gpkg = GeoPackage::open(&db_path)?;
        let mut model = Model::from_database(&gpkg, config)?;
        model.set_filepath(toml_path);
        info!(
            path = %toml_path.display(),
            nodes = model.node_count(),
            links = model.link_count(),
            "read model"
        );
        Ok(model)
    }
}
