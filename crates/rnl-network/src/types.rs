//! Node and link records of the network frames.

use std::collections::BTreeMap;

use geo::{LineString, Point};
use rnl_geometry::line_length;
use rnl_gpkg::Value;

/// Role of a network node, derived from its directed degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NetworkNodeType {
    Connection,
    UpstreamBoundary,
    DownstreamBoundary,
    Intersection,
}

impl NetworkNodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::UpstreamBoundary => "upstream_boundary",
            Self::DownstreamBoundary => "downstream_boundary",
            Self::Intersection => "intersection",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "connection" => Some(Self::Connection),
            "upstream_boundary" => Some(Self::UpstreamBoundary),
            "downstream_boundary" => Some(Self::DownstreamBoundary),
            "intersection" => Some(Self::Intersection),
            _ => None,
        }
    }

    /// Classify a node from its in- and out-degree.
    pub fn from_degree(in_degree: usize, out_degree: usize) -> Self {
        if in_degree == 0 {
            Self::UpstreamBoundary
        } else if out_degree == 0 {
            Self::DownstreamBoundary
        } else if in_degree + out_degree > 2 {
            Self::Intersection
        } else {
            Self::Connection
        }
    }

    /// Node types `move_node` considers when none are given.
    pub const MOVABLE: [NetworkNodeType; 3] = [
        NetworkNodeType::Connection,
        NetworkNodeType::UpstreamBoundary,
        NetworkNodeType::DownstreamBoundary,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkNode {
    pub id: u32,
    pub point: Point<f64>,
    pub node_type: NetworkNodeType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkLink {
    pub id: u32,
    pub node_from: u32,
    pub node_to: u32,
    pub geometry: LineString<f64>,
    /// Attributes carried over from the input line.
    pub attributes: BTreeMap<String, Value>,
}

impl NetworkLink {
    pub fn length(&self) -> f64 {
        line_length(&self.geometry)
    }

    /// The node at the other end of the link.
    pub fn other(&self, node_id: u32) -> Option<u32> {
        if self.node_from == node_id {
            Some(self.node_to)
        } else if self.node_to == node_id {
            Some(self.node_from)
        } else {
            None
        }
    }
}

/// One line of the input collection.
#[derive(Debug, Clone, PartialEq)]
pub struct InputLine {
    pub geometry: LineString<f64>,
    pub attributes: BTreeMap<String, Value>,
}

impl InputLine {
    pub fn new(geometry: LineString<f64>) -> Self {
        Self {
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }
}

impl From<LineString<f64>> for InputLine {
    fn from(geometry: LineString<f64>) -> Self {
        Self::new(geometry)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkOptions {
    /// Endpoints closer than this are snapped together; links shorter than
    /// this are collapsed.
    pub tolerance: f64,
    /// Input attribute kept as link `id` column, when present.
    pub id_column: Option<String>,
    /// Input attribute kept as link `name` column, when present.
    pub name_column: Option<String>,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.0,
            id_column: None,
            name_column: None,
        }
    }
}

impl NetworkOptions {
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }
}
