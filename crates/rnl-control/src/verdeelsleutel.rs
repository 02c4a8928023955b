//! Verdeelsleutels: distributing an upstream discharge over branches.
//!
//! A verdeelsleutel is a table with one row per flow regime:
//!
//! | locatie_bovenstrooms | locatie_benedenstrooms_1 | fractie_1 | locatie_benedenstrooms_2 | fractie_2 | ondergrens_waarde | beschrijving |
//! |---|---|---|---|---|---|---|
//! | KST-01 | KDU-11 | 1.0 | KDU-12 | 0.0 | 0.0 | laag |
//! | KST-01 | KDU-11 | 0.6 | KDU-12 | 0.4 | 2.5 | hoog |
//!
//! Every downstream location becomes a FractionalFlow node with one row per
//! regime, and one DiscreteControl node switches regimes on the flow rate
//! through the upstream location.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use geo::Point;
use rnl_core::{NodeId, round_decimals};
use rnl_geometry::{interpolate, line_length};
use rnl_model::{FractionalFlowStatic, LinkAttrs, Model, NodeAttrs, NodeType, Table};
use tracing::{debug, info, warn};

use crate::discrete::{DiscreteControlTables, FLOW_RATE};
use crate::error::{ControlError, ControlResult};
use crate::placement::{Placement, add_discrete_control};

const UPSTREAM: &str = "locatie_bovenstrooms";
const DOWNSTREAM: &str = "locatie_benedenstrooms_";
const FRACTION: &str = "fractie_";
const LOWER_BOUND: &str = "ondergrens_waarde";
const DESCRIPTION: &str = "beschrijving";

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub location: String,
    pub fraction: f64,
}

/// One flow regime.
#[derive(Debug, Clone, PartialEq)]
pub struct Regime {
    pub upstream: String,
    pub branches: Vec<Branch>,
    /// Flow rate above which this regime applies.
    pub lower_bound: f64,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdeelsleutel {
    pub regimes: Vec<Regime>,
}

fn column<'a>(row: &'a BTreeMap<String, String>, name: &str) -> ControlResult<&'a str> {
    row.get(name)
        .map(|v| v.trim())
        .ok_or_else(|| ControlError::MissingColumn {
            column: name.to_string(),
        })
}

fn number(row: &BTreeMap<String, String>, name: &str) -> ControlResult<f64> {
    let text = column(row, name)?;
    text.parse()
        .map_err(|_| ControlError::invalid(format!("'{text}' in column '{name}' is not a number")))
}

impl Verdeelsleutel {
    /// Parse CSV with `locatie_benedenstrooms_{i}`/`fractie_{i}` column
    /// pairs; rows with an empty location skip that branch.
    pub fn from_reader<R: Read>(reader: R) -> ControlResult<Self> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let branch_count = reader
            .headers()?
            .iter()
            .filter(|h| h.starts_with(DOWNSTREAM))
            .count();
        let mut regimes = Vec::new();
        for row in reader.deserialize::<BTreeMap<String, String>>() {
            let row = row?;
            let mut branches = Vec::new();
            for i in 1..=branch_count {
                let location = column(&row, &format!("{DOWNSTREAM}{i}"))?;
                if location.is_empty() {
                    continue;
                }
                branches.push(Branch {
                    location: location.to_string(),
                    fraction: number(&row, &format!("{FRACTION}{i}"))?,
                });
            }
            regimes.push(Regime {
                upstream: column(&row, UPSTREAM)?.to_string(),
                branches,
                lower_bound: number(&row, LOWER_BOUND)?,
                description: column(&row, DESCRIPTION)?.to_string(),
            });
        }
        Ok(Self { regimes })
    }

    pub fn extend(&mut self, other: Verdeelsleutel) {
        self.regimes.extend(other.regimes);
    }

    /// Upstream locations in order of appearance.
    pub fn upstream_locations(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for regime in &self.regimes {
            if !keys.contains(&regime.upstream.as_str()) {
                keys.push(&regime.upstream);
            }
        }
        keys
    }

    /// Downstream locations in order of appearance.
    pub fn downstream_locations(&self) -> Vec<&str> {
        let mut locations: Vec<&str> = Vec::new();
        for branch in self.regimes.iter().flat_map(|r| &r.branches) {
            if !locations
                .iter()
                .any(|l| l.eq_ignore_ascii_case(&branch.location))
            {
                locations.push(&branch.location);
            }
        }
        locations
    }

    /// FractionalFlow rows, one per node and regime. `nodes` maps
    /// downstream locations (case-insensitive) on FractionalFlow nodes.
    pub fn to_fractions(&self, nodes: &[(String, NodeId)]) -> ControlResult<Vec<FractionalFlowStatic>> {
        let mut rows = Vec::new();
        for regime in &self.regimes {
            for branch in &regime.branches {
                let node_id = nodes
                    .iter()
                    .find(|(code, _)| code.eq_ignore_ascii_case(&branch.location))
                    .map(|(_, id)| *id)
                    .ok_or_else(|| ControlError::UnknownLocation {
                        code: branch.location.clone(),
                    })?;
                rows.push(FractionalFlowStatic {
                    node_id,
                    fraction: round_decimals(branch.fraction, 3),
                    control_state: Some(regime.description.clone()),
                });
            }
        }
        Ok(rows)
    }
}

pub fn read_verdeelsleutel(path: &Path) -> ControlResult<Verdeelsleutel> {
    Verdeelsleutel::from_reader(File::open(path)?)
}

fn node_with_code(model: &Model, code: &str, fractional: bool) -> Option<NodeId> {
    model
        .nodes()
        .filter(|n| (n.node_type == NodeType::FractionalFlow) == fractional)
        .find(|n| {
            n.meta_code_waterbeheerder
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(code))
        })
        .map(|n| n.node_id)
}

/// FractionalFlow node for `location`, inserted between `upstream` and the
/// node carrying that code when it doesn't exist yet.
fn fractional_flow_node(model: &mut Model, upstream: NodeId, location: &str) -> ControlResult<NodeId> {
    if let Some(node_id) = node_with_code(model, location, true) {
        return Ok(node_id);
    }
    let target = node_with_code(model, location, false).ok_or_else(|| ControlError::UnknownLocation {
        code: location.to_string(),
    })?;
    let from = model.node(upstream)?.geometry;
    let to = model.node(target)?.geometry;
    let direct = model
        .find_link(upstream, target)
        .filter(|l| l.is_flow())
        .map(|l| (l.link_id, l.geometry.clone()));
    let point = match &direct {
        Some((_, line)) => interpolate(line, line_length(line) / 2.0),
        None => None,
    }
    .unwrap_or_else(|| Point::new((from.x() + to.x()) / 2.0, (from.y() + to.y()) / 2.0));

    let node_id = model.add_node(
        NodeType::FractionalFlow,
        point,
        NodeAttrs {
            meta_code_waterbeheerder: Some(location.to_string()),
            ..NodeAttrs::default()
        },
    )?;
    if let Some((link_id, _)) = direct {
        model.remove_link(link_id)?;
    }
    model.add_link(upstream, node_id, LinkAttrs::default())?;
    model.add_link(node_id, target, LinkAttrs::default())?;
    debug!(%node_id, %upstream, %target, location, "added fractional flow");
    Ok(node_id)
}

/// Nodes created or reused for one verdeelsleutel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdeelsleutelControl {
    pub control_node_id: NodeId,
    pub listen_node_id: NodeId,
    pub fractional_flow_node_ids: Vec<NodeId>,
}

/// Build the FractionalFlow nodes and the DiscreteControl node of a
/// verdeelsleutel with a single upstream location.
///
/// The upstream location is the node whose `meta_code_waterbeheerder`
/// matches it; regimes are ordered on their lower bound.
pub fn verdeelsleutel_to_control(
    model: &mut Model,
    verdeelsleutel: &Verdeelsleutel,
    attrs: NodeAttrs,
) -> ControlResult<VerdeelsleutelControl> {
    let keys = verdeelsleutel.upstream_locations();
    let [key] = keys.as_slice() else {
        return Err(ControlError::UpstreamKeys {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        });
    };
    let listen_node_id = node_with_code(model, key, false).ok_or_else(|| ControlError::UnknownLocation {
        code: key.to_string(),
    })?;

    let mut regimes = verdeelsleutel.regimes.clone();
    regimes.sort_by(|a, b| a.lower_bound.total_cmp(&b.lower_bound));
    for regime in &regimes {
        let total: f64 = regime.branches.iter().map(|b| b.fraction).sum();
        if (total - 1.0).abs() > 1e-3 {
            warn!(regime = %regime.description, total, "fractions don't add up to 1");
        }
    }
    for (i, regime) in regimes.iter().enumerate() {
        if regimes[..i].iter().any(|r| r.description == regime.description) {
            return Err(ControlError::invalid(format!(
                "regime '{}' occurs more than once",
                regime.description
            )));
        }
    }
    let sorted = Verdeelsleutel { regimes };

    let mut nodes = Vec::new();
    for location in sorted.downstream_locations() {
        let node_id = fractional_flow_node(model, listen_node_id, location)?;
        nodes.push((location.to_string(), node_id));
    }
    let fractions = sorted.to_fractions(&nodes)?;
    model.update_table(Table::FractionalFlowStatic(fractions))?;

    let bounds: Vec<f64> = sorted.regimes.iter().map(|r| r.lower_bound).collect();
    let states: Vec<String> = sorted.regimes.iter().map(|r| r.description.clone()).collect();
    let tables = DiscreteControlTables::from_thresholds(NodeId::MIN, listen_node_id, FLOW_RATE, &bounds, &states)?;

    let fractional_flow_node_ids: Vec<NodeId> = nodes.iter().map(|(_, id)| *id).collect();
    let control_node_id = add_discrete_control(
        model,
        &fractional_flow_node_ids,
        &[listen_node_id],
        Placement::Centroid,
        tables,
        attrs,
    )?;

    info!(
        %control_node_id,
        %listen_node_id,
        regimes = states.len(),
        branches = fractional_flow_node_ids.len(),
        "added verdeelsleutel"
    );
    Ok(VerdeelsleutelControl {
        control_node_id,
        listen_node_id,
        fractional_flow_node_ids,
    })
}
