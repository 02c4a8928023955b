//! rnl-gpkg: minimal GeoPackage container.
//!
//! Provides:
//! - the GeoPackage geometry blob header around a WKB body
//! - generic layers (`Layer`, `Column`, `Feature`, `Value`)
//! - reading and writing layers with `rusqlite`
//!
//! Only the parts of the GeoPackage standard needed to exchange Ribasim
//! databases and HyDAMO layers are covered: feature and attribute tables,
//! spatial reference metadata and geometry columns. Spatial indices are not
//! written.

pub mod error;
pub mod layer;
pub mod store;
pub mod value;
pub mod wkb;

pub use error::{GpkgError, GpkgResult};
pub use layer::{Column, ColumnKind, Feature, GeometryColumn, GeometryType, Layer};
pub use store::GeoPackage;
pub use value::Value;
pub use wkb::{decode_gpkg_blob, decode_wkb, encode_gpkg_blob, encode_wkb};

/// Spatial reference of Dutch national grid (RD New).
pub const EPSG_RD_NEW: i32 = 28992;
