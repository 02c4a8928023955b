//! rnl-hydamo: the HyDAMO exchange format and organization codes.
//!
//! Contains:
//! - layer schemas read from the HyDAMO JSON definition
//! - validated layers and the HyDAMO data model with GeoPackage I/O
//! - the organization code registry and model id generation

pub mod codes;
pub mod datamodel;
pub mod error;
pub mod layer;
pub mod schema;

pub use codes::{CodeRegistry, Organization, code_from_geometry, init, init_with, registry, teardown};
pub use datamodel::{DEFAULT_VERSION, HyDAMO, IGNORED_LAYERS};
pub use error::{HydamoError, HydamoResult};
pub use layer::{ExtendedLayer, SetDataOptions};
pub use schema::{Field, FieldType, LayerSchema, map_definition, read_schema};
