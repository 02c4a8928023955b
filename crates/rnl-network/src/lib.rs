//! rnl-network: routing graph built from line geometries.
//!
//! A `Network` is constructed from a collection of lines (for example the
//! HyDAMO `hydroobject` layer). Endpoints are snapped within a tolerance,
//! lines are split where they intersect and links shorter than the tolerance
//! are collapsed. The result holds:
//! - a node frame (one point per unique vertex, typed by its degree)
//! - a link frame (one line per graph edge, with `node_from`/`node_to`)
//! - a directed graph and its undirected projection for routing queries

pub mod build;
pub mod error;
pub mod io;
pub mod network;
pub mod route;
mod spatial;
pub mod types;

pub use error::{NetworkError, NetworkResult};
pub use network::Network;
pub use types::{InputLine, NetworkLink, NetworkNode, NetworkNodeType, NetworkOptions};
