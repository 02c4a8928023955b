//! ManningResistance static table.

use std::collections::BTreeMap;
use std::path::Path;

use rnl_core::{NodeId, round_to_precision};
use rnl_geometry::line_length;
use rnl_gpkg::GeoPackage;
use rnl_model::{ManningResistanceStatic, Model, NodeType, Table};
use tracing::{info, warn};

use crate::error::{ParamError, ParamResult};

/// Link attribute naming the cross-section of the water course.
pub const PROFILE_ID_COLUMN: &str = "meta_profielid_waterbeheerder";

/// Lengths are rounded to this many metres.
const LENGTH_PRECISION: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManningDefaults {
    pub manning_n: f64,
    pub profile_width: f64,
    pub profile_slope: f64,
}

impl Default for ManningDefaults {
    fn default() -> Self {
        Self {
            manning_n: 0.04,
            profile_width: 25.0,
            profile_slope: 1.0,
        }
    }
}

/// Trapezoidal cross-section of one profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManningProfile {
    pub profile_width: f64,
    pub profile_slope: f64,
}

/// Profiles keyed on `profiel_id`, read from a GeoPackage layer with columns
/// `profiel_id`, `profile_width` and `profile_slope`.
pub fn read_profiles(path: &Path, layer: &str) -> ParamResult<BTreeMap<String, ManningProfile>> {
    let gpkg = GeoPackage::open(path)?;
    let layer = gpkg.read_layer(layer)?;
    let mut profiles = BTreeMap::new();
    for feature in &layer.features {
        let profiel_id = match feature.get("profiel_id") {
            value if value.is_null() => continue,
            value => value
                .as_str()
                .map(str::to_string)
                .or_else(|| value.as_i64().map(|i| i.to_string())),
        };
        let (Some(profiel_id), Some(profile_width), Some(profile_slope)) = (
            profiel_id,
            feature.get_f64("profile_width"),
            feature.get_f64("profile_slope"),
        ) else {
            return Err(ParamError::invalid(format!(
                "profile row {:?} in {} lacks profiel_id, profile_width or profile_slope",
                feature.fid, layer.name
            )));
        };
        profiles.insert(
            profiel_id,
            ManningProfile {
                profile_width,
                profile_slope,
            },
        );
    }
    Ok(profiles)
}

/// Sum of the lengths of a node's flow links, rounded to 10 m. A node with
/// short links still gets 10 m so the length stays positive.
pub fn manning_length(model: &Model, node_id: NodeId) -> f64 {
    let length: f64 = model
        .incident_links(node_id)
        .into_iter()
        .filter(|link| link.is_flow())
        .map(|link| line_length(&link.geometry))
        .sum();
    round_to_precision(length, LENGTH_PRECISION).max(LENGTH_PRECISION)
}

fn profile_of<'a>(
    model: &Model,
    node_id: NodeId,
    profiles: &'a BTreeMap<String, ManningProfile>,
) -> Option<&'a ManningProfile> {
    let link = model
        .incoming_links(node_id)
        .into_iter()
        .find(|link| link.is_flow())?;
    let value = link.meta.get(PROFILE_ID_COLUMN)?;
    let key = value
        .as_str()
        .map(str::to_string)
        .or_else(|| value.as_i64().map(|i| i.to_string()))?;
    profiles.get(&key)
}

/// Static rows for every ManningResistance node.
///
/// With `profiles`, width and slope come from the profile named on the
/// node's incoming link; nodes without a matching profile keep the defaults.
pub fn manning_static(
    model: &Model,
    defaults: ManningDefaults,
    profiles: Option<&BTreeMap<String, ManningProfile>>,
) -> Vec<ManningResistanceStatic> {
    model
        .nodes_of_type(NodeType::ManningResistance)
        .map(|node| {
            let node_id = node.node_id;
            let (width, slope) = match profiles.map(|p| profile_of(model, node_id, p)) {
                Some(Some(profile)) => (profile.profile_width, profile.profile_slope),
                Some(None) => {
                    warn!(%node_id, "no profile for ManningResistance, using defaults");
                    (defaults.profile_width, defaults.profile_slope)
                }
                None => (defaults.profile_width, defaults.profile_slope),
            };
            ManningResistanceStatic::new(
                node_id,
                manning_length(model, node_id),
                defaults.manning_n,
                width,
                slope,
            )
        })
        .collect()
}

pub fn update_manning_static(
    model: &mut Model,
    defaults: ManningDefaults,
    profiles: Option<&BTreeMap<String, ManningProfile>>,
) {
    let rows = manning_static(model, defaults, profiles);
    info!(count = rows.len(), "updated ManningResistance static table");
    model.set_table(Table::ManningResistanceStatic(rows));
}
