//! Node, link and function vocabularies of the Ribasim tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    Basin,
    Pump,
    Outlet,
    ManningResistance,
    TabulatedRatingCurve,
    LevelBoundary,
    FlowBoundary,
    Terminal,
    LinearResistance,
    FractionalFlow,
    DiscreteControl,
    PidControl,
    ContinuousControl,
    FlowDemand,
    LevelDemand,
    UserDemand,
}

impl NodeType {
    pub const ALL: [NodeType; 16] = [
        NodeType::Basin,
        NodeType::Pump,
        NodeType::Outlet,
        NodeType::ManningResistance,
        NodeType::TabulatedRatingCurve,
        NodeType::LevelBoundary,
        NodeType::FlowBoundary,
        NodeType::Terminal,
        NodeType::LinearResistance,
        NodeType::FractionalFlow,
        NodeType::DiscreteControl,
        NodeType::PidControl,
        NodeType::ContinuousControl,
        NodeType::FlowDemand,
        NodeType::LevelDemand,
        NodeType::UserDemand,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Basin => "Basin",
            NodeType::Pump => "Pump",
            NodeType::Outlet => "Outlet",
            NodeType::ManningResistance => "ManningResistance",
            NodeType::TabulatedRatingCurve => "TabulatedRatingCurve",
            NodeType::LevelBoundary => "LevelBoundary",
            NodeType::FlowBoundary => "FlowBoundary",
            NodeType::Terminal => "Terminal",
            NodeType::LinearResistance => "LinearResistance",
            NodeType::FractionalFlow => "FractionalFlow",
            NodeType::DiscreteControl => "DiscreteControl",
            NodeType::PidControl => "PidControl",
            NodeType::ContinuousControl => "ContinuousControl",
            NodeType::FlowDemand => "FlowDemand",
            NodeType::LevelDemand => "LevelDemand",
            NodeType::UserDemand => "UserDemand",
        }
    }

    /// snake_case name, e.g. `level_boundary`.
    pub fn snake_case(self) -> String {
        let mut out = String::new();
        for (i, c) in self.as_str().chars().enumerate() {
            if c.is_ascii_uppercase() {
                if i > 0 {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Nodes that move water between two other nodes.
    pub fn is_connector(self) -> bool {
        matches!(
            self,
            NodeType::Pump
                | NodeType::Outlet
                | NodeType::ManningResistance
                | NodeType::TabulatedRatingCurve
                | NodeType::LinearResistance
                | NodeType::FractionalFlow
        )
    }

    /// Nodes that can be the target of a control link.
    pub fn is_controllable(self) -> bool {
        matches!(
            self,
            NodeType::Pump
                | NodeType::Outlet
                | NodeType::TabulatedRatingCurve
                | NodeType::ManningResistance
                | NodeType::LinearResistance
                | NodeType::FractionalFlow
        )
    }

    pub fn is_control(self) -> bool {
        matches!(
            self,
            NodeType::DiscreteControl
                | NodeType::PidControl
                | NodeType::ContinuousControl
                | NodeType::FlowDemand
                | NodeType::LevelDemand
        )
    }

    pub fn is_boundary(self) -> bool {
        matches!(
            self,
            NodeType::LevelBoundary | NodeType::FlowBoundary | NodeType::Terminal
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted || t.snake_case() == wanted)
            .ok_or_else(|| ModelError::UnknownNodeType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    #[default]
    Flow,
    Control,
}

impl LinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Flow => "flow",
            LinkType::Control => "control",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flow" => Ok(LinkType::Flow),
            "control" => Ok(LinkType::Control),
            other => Err(ModelError::invalid(format!("unknown link_type '{other}'"))),
        }
    }
}

/// Role of a connector node in supply (`inlet`) or drainage (`outlet`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeFunction {
    Inlet,
    Outlet,
}

impl NodeFunction {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeFunction::Inlet => "inlet",
            NodeFunction::Outlet => "outlet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inlet" => Some(NodeFunction::Inlet),
            "outlet" => Some(NodeFunction::Outlet),
            _ => None,
        }
    }
}

impl fmt::Display for NodeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
