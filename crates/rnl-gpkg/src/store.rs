//! GeoPackage file access on top of SQLite.

use std::fs;
use std::path::{Path, PathBuf};

use geo::{BoundingRect, Rect};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::error::{GpkgError, GpkgResult};
use crate::layer::{Column, ColumnKind, Feature, GeometryColumn, GeometryType, Layer};
use crate::value::Value;
use crate::wkb::{decode_gpkg_blob, encode_gpkg_blob};
use crate::EPSG_RD_NEW;

/// `GPKG` in ASCII.
const APPLICATION_ID: i32 = 0x4750_4B47;
const USER_VERSION: i32 = 10300;

const RD_NEW_WKT: &str = "PROJCS[\"Amersfoort / RD New\",GEOGCS[\"Amersfoort\",DATUM[\"Amersfoort\",\
SPHEROID[\"Bessel 1841\",6377397.155,299.1528128]],PRIMEM[\"Greenwich\",0],\
UNIT[\"degree\",0.0174532925199433]],PROJECTION[\"Oblique_Stereographic\"],\
PARAMETER[\"latitude_of_origin\",52.1561605555556],PARAMETER[\"central_meridian\",5.38763888888889],\
PARAMETER[\"scale_factor\",0.9999079],PARAMETER[\"false_easting\",155000],\
PARAMETER[\"false_northing\",463000],UNIT[\"metre\",1],AUTHORITY[\"EPSG\",\"28992\"]]";

const CREATE_METADATA: &str = "
CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE IF NOT EXISTS gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE IF NOT EXISTS gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
";

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// An open GeoPackage.
pub struct GeoPackage {
    conn: Connection,
    path: Option<PathBuf>,
}

impl GeoPackage {
    /// Create a new, empty GeoPackage, replacing any existing file.
    pub fn create(path: &Path) -> GpkgResult<Self> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let gpkg = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        gpkg.init_metadata()?;
        debug!(path = %path.display(), "created GeoPackage");
        Ok(gpkg)
    }

    /// Open an existing GeoPackage.
    pub fn open(path: &Path) -> GpkgResult<Self> {
        if !path.exists() {
            return Err(GpkgError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("GeoPackage not found: {}", path.display()),
            )));
        }
        let conn = Connection::open(path)?;
        let gpkg = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        gpkg.init_metadata()?;
        Ok(gpkg)
    }

    /// In-memory GeoPackage, mostly for tests.
    pub fn in_memory() -> GpkgResult<Self> {
        let gpkg = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        gpkg.init_metadata()?;
        Ok(gpkg)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_metadata(&self) -> GpkgResult<()> {
        self.conn
            .pragma_update(None, "application_id", APPLICATION_ID)?;
        self.conn.pragma_update(None, "user_version", USER_VERSION)?;
        self.conn.execute_batch(CREATE_METADATA)?;
        let srs = [
            (
                "Undefined cartesian SRS",
                -1,
                "NONE",
                -1,
                "undefined",
                "undefined cartesian coordinate reference system",
            ),
            (
                "Undefined geographic SRS",
                0,
                "NONE",
                0,
                "undefined",
                "undefined geographic coordinate reference system",
            ),
            (
                "Amersfoort / RD New",
                EPSG_RD_NEW,
                "EPSG",
                EPSG_RD_NEW,
                RD_NEW_WKT,
                "Dutch national grid",
            ),
        ];
        for (name, id, org, org_id, definition, description) in srs {
            self.conn.execute(
                "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
                 (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![name, id, org, org_id, definition, description],
            )?;
        }
        Ok(())
    }

    /// Names of all registered layers, sorted.
    pub fn list_layers(&self) -> GpkgResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT table_name FROM gpkg_contents ORDER BY table_name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn has_layer(&self, name: &str) -> GpkgResult<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT table_name FROM gpkg_contents WHERE table_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn delete_layer(&mut self, name: &str) -> GpkgResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote(name)), [])?;
        tx.execute(
            "DELETE FROM gpkg_geometry_columns WHERE table_name = ?1",
            params![name],
        )?;
        tx.execute(
            "DELETE FROM gpkg_contents WHERE table_name = ?1",
            params![name],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Write a layer, replacing a layer with the same name.
    pub fn write_layer(&mut self, layer: &Layer) -> GpkgResult<()> {
        let geometry_column = layer.geometry_column.as_ref();
        let reserved: Vec<&str> = std::iter::once("fid")
            .chain(geometry_column.map(|g| g.name.as_str()))
            .collect();
        let columns: Vec<&Column> = layer
            .columns
            .iter()
            .filter(|c| !reserved.contains(&c.name.as_str()))
            .collect();

        let mut definitions = vec!["fid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL".to_string()];
        if let Some(g) = geometry_column {
            definitions.push(format!("{} {}", quote(&g.name), g.geometry_type.as_str()));
        }
        for column in &columns {
            definitions.push(format!("{} {}", quote(&column.name), column.kind.sql_type()));
        }

        let mut names = vec!["fid".to_string()];
        if let Some(g) = geometry_column {
            names.push(quote(&g.name));
        }
        names.extend(columns.iter().map(|c| quote(&c.name)));
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&layer.name),
            names.join(", "),
            placeholders.join(", ")
        );

        let mut extent: Option<Rect<f64>> = None;
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote(&layer.name)), [])?;
        tx.execute(
            "DELETE FROM gpkg_geometry_columns WHERE table_name = ?1",
            params![layer.name],
        )?;
        tx.execute(
            "DELETE FROM gpkg_contents WHERE table_name = ?1",
            params![layer.name],
        )?;
        tx.execute(
            &format!(
                "CREATE TABLE {} ({})",
                quote(&layer.name),
                definitions.join(", ")
            ),
            [],
        )?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for feature in &layer.features {
                let mut values: Vec<Value> = Vec::with_capacity(names.len());
                values.push(feature.fid.into());
                if let Some(g) = geometry_column {
                    match &feature.geometry {
                        Some(geometry) => {
                            let found = GeometryType::of(geometry);
                            if !g.geometry_type.accepts(found) {
                                return Err(GpkgError::Column {
                                    layer: layer.name.clone(),
                                    column: g.name.clone(),
                                    message: format!(
                                        "geometry type {} does not match {}",
                                        found.as_str(),
                                        g.geometry_type.as_str()
                                    ),
                                });
                            }
                            if let Some(rect) = geometry.bounding_rect() {
                                extent = Some(match extent {
                                    Some(e) => merge_rect(e, rect),
                                    None => rect,
                                });
                            }
                            values.push(Value::Blob(encode_gpkg_blob(geometry, g.srs_id)?));
                        }
                        None => values.push(Value::Null),
                    }
                }
                for column in &columns {
                    values.push(feature.get(&column.name).clone());
                }
                stmt.execute(params_from_iter(values.iter()))?;
            }
        }

        let data_type = if geometry_column.is_some() {
            "features"
        } else {
            "attributes"
        };
        let srs_id = geometry_column.map(|g| g.srs_id);
        tx.execute(
            "INSERT INTO gpkg_contents
             (table_name, data_type, identifier, min_x, min_y, max_x, max_y, srs_id)
             VALUES (?1, ?2, ?1, ?3, ?4, ?5, ?6, ?7)",
            params![
                layer.name,
                data_type,
                extent.map(|r| r.min().x),
                extent.map(|r| r.min().y),
                extent.map(|r| r.max().x),
                extent.map(|r| r.max().y),
                srs_id,
            ],
        )?;
        if let Some(g) = geometry_column {
            tx.execute(
                "INSERT INTO gpkg_geometry_columns
                 (table_name, column_name, geometry_type_name, srs_id, z, m)
                 VALUES (?1, ?2, ?3, ?4, 0, 0)",
                params![layer.name, g.name, g.geometry_type.as_str(), g.srs_id],
            )?;
        }
        tx.commit()?;
        debug!(layer = %layer.name, features = layer.features.len(), "wrote layer");
        Ok(())
    }

    fn geometry_column(&self, name: &str) -> GpkgResult<Option<GeometryColumn>> {
        let column = self
            .conn
            .query_row(
                "SELECT column_name, geometry_type_name, srs_id
                 FROM gpkg_geometry_columns WHERE table_name = ?1",
                params![name],
                |row| {
                    Ok(GeometryColumn {
                        name: row.get(0)?,
                        geometry_type: GeometryType::parse(&row.get::<_, String>(1)?),
                        srs_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(column)
    }

    /// Read a layer with all its features.
    pub fn read_layer(&self, name: &str) -> GpkgResult<Layer> {
        if !self.has_layer(name)? {
            return Err(GpkgError::LayerNotFound(name.to_string()));
        }
        let geometry_column = self.geometry_column(name)?;

        // (name, declared type, is primary key)
        let mut info = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote(name)))?;
        let table_columns = info
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(5)? == 1,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let pk = table_columns
            .iter()
            .find(|(_, declared, is_pk)| *is_pk && declared.eq_ignore_ascii_case("INTEGER"))
            .map(|(n, _, _)| n.clone());
        let geometry_name = geometry_column.as_ref().map(|g| g.name.clone());
        let columns: Vec<Column> = table_columns
            .iter()
            .filter(|(n, _, _)| Some(n) != pk.as_ref() && Some(n) != geometry_name.as_ref())
            .map(|(n, declared, _)| Column::new(n.clone(), ColumnKind::from_sql_type(declared)))
            .collect();

        let mut selected = vec![pk.as_deref().map_or_else(|| "rowid".to_string(), quote)];
        if let Some(g) = &geometry_name {
            selected.push(quote(g));
        }
        selected.extend(columns.iter().map(|c| quote(&c.name)));
        let sql = format!("SELECT {} FROM {}", selected.join(", "), quote(name));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut features = Vec::new();
        while let Some(row) = rows.next()? {
            let fid: Option<i64> = row.get(0)?;
            let mut offset = 1;
            let geometry = if geometry_name.is_some() {
                offset += 1;
                match row.get::<_, Option<Vec<u8>>>(1)? {
                    Some(blob) => Some(decode_gpkg_blob(&blob)?.0),
                    None => None,
                }
            } else {
                None
            };
            let mut feature = Feature::new(fid, geometry);
            for (i, column) in columns.iter().enumerate() {
                let value: Value = row.get(offset + i)?;
                feature.attributes.insert(column.name.clone(), value);
            }
            features.push(feature);
        }

        Ok(Layer {
            name: name.to_string(),
            columns,
            geometry_column,
            features,
        })
    }
}

fn merge_rect(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        geo::Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        geo::Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}
