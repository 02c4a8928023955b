//! rnl-core: stable foundation for the Ribasim-NL model tooling.
//!
//! Contains:
//! - ids (node and link identifiers as they appear in Ribasim tables)
//! - numeric (tolerances + rounding helpers used by parameterization)
//! - units (uom SI types + hydrological conversions)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use units::*;
