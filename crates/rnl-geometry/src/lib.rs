//! rnl-geometry: planar geometry helpers for basins, links and cut-lines.
//!
//! Provides:
//! - `BasinGeometry`, the Polygon/MultiPolygon variant used for basin areas
//! - representative points and area sorting for basins
//! - polygon splitting by a cut-line (single polygons, multipolygons and
//!   whole basin collections)
//! - line utilities (projection, interpolation, splitting, subdivision)
//! - point and line buffers
//! - WKT conversion with z-dropping

pub mod basin;
pub mod buffer;
pub mod convert;
pub mod error;
pub mod line;
pub mod split;

pub use basin::{BasinGeometry, basin_to_point, basins_to_points, sort_basins};
pub use buffer::{buffer_line, buffer_point, buffer_polygon};
pub use convert::{drop_z, edge, from_wkt, snap_point_to_target, to_wkt};
pub use error::{GeometryError, GeometryResult};
pub use line::{
    interpolate, line_ends, line_length, project, reverse_line, split_line_at_distance,
    subdivide_line, substring,
};
pub use split::{split_basin, split_basin_multi_polygon, split_basins};

/// Re-export of the coordinate types used across the workspace.
pub use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
