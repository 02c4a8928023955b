//! Organization codes and model ids.
//!
//! The registry is read once from a CSV with the columns `name`,
//! `bgt_code`, `wbh_code` and `administration_category` and shared by the
//! whole process. [`init`] loads it, [`registry`] hands out the loaded copy
//! and [`teardown`] drops it again.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, RwLock};

use geo::{Centroid, Geometry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HydamoError, HydamoResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub bgt_code: Option<String>,
    /// Two-digit water authority code.
    pub wbh_code: Option<String>,
    pub administration_category: String,
}

/// `69` and `69.0` become `"69"`, `7` becomes `"07"`.
fn normalize_wbh_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    match code.parse::<f64>() {
        Ok(n) if n.fract() == 0.0 && n >= 0.0 => Some(format!("{:02}", n as u64)),
        _ => Some(code.to_string()),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeRegistry {
    organizations: Vec<Organization>,
}

impl CodeRegistry {
    pub fn from_reader<R: Read>(reader: R) -> HydamoResult<Self> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut organizations = Vec::new();
        for row in reader.deserialize::<Organization>() {
            let mut organization = row?;
            organization.wbh_code = organization.wbh_code.as_deref().and_then(normalize_wbh_code);
            organization.bgt_code = organization.bgt_code.filter(|c| !c.trim().is_empty());
            organization.administration_category = organization.administration_category.to_lowercase();
            organizations.push(organization);
        }
        Ok(Self { organizations })
    }

    pub fn read(path: &Path) -> HydamoResult<Self> {
        Self::from_reader(File::open(path)?)
    }

    pub fn organizations(&self) -> &[Organization] {
        &self.organizations
    }

    pub fn bgt_code_exists(&self, bgt_code: &str) -> bool {
        self.organizations
            .iter()
            .any(|o| o.bgt_code.as_deref() == Some(bgt_code))
    }

    pub fn wbh_code_exists(&self, wbh_code: &str) -> bool {
        let wanted = normalize_wbh_code(wbh_code);
        self.organizations.iter().any(|o| o.wbh_code.is_some() && o.wbh_code == wanted)
    }

    pub fn bgt_to_wbh_code(&self, bgt_code: &str) -> Option<&str> {
        self.organizations
            .iter()
            .find(|o| o.bgt_code.as_deref() == Some(bgt_code))
            .and_then(|o| o.wbh_code.as_deref())
    }

    /// Organizations matching `organization`: the one whose name equals it
    /// (ignoring case), else all whose name contains it.
    pub fn find_codes(
        &self,
        organization: &str,
        administration_category: Option<&str>,
    ) -> HydamoResult<Vec<&Organization>> {
        let mut candidates: Vec<&Organization> = self.organizations.iter().collect();
        if let Some(category) = administration_category {
            let category = category.to_lowercase();
            if !self.organizations.iter().any(|o| o.administration_category == category) {
                return Err(HydamoError::InvalidCategory {
                    category,
                    known: self.category_counts().into_keys().collect(),
                });
            }
            candidates.retain(|o| o.administration_category == category);
        }
        let wanted = organization.to_lowercase();
        if let Some(exact) = candidates.iter().find(|o| o.name.to_lowercase() == wanted) {
            return Ok(vec![*exact]);
        }
        Ok(candidates
            .into_iter()
            .filter(|o| o.name.to_lowercase().contains(&wanted))
            .collect())
    }

    /// Number of organizations per administration category.
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for organization in &self.organizations {
            *counts
                .entry(organization.administration_category.clone())
                .or_insert(0) += 1;
        }
        counts
    }

    /// `NL.WBHCODE.{wbh_code}.{layer}.{code}`, falling back to
    /// `NL.BGTCODE.{bgt_code}.{layer}.{code}` for organizations without a
    /// water authority code.
    ///
    /// Without `code` one is derived from `geometry`, see
    /// [`code_from_geometry`]. Unknown codes are an error.
    pub fn generate_model_id(
        &self,
        code: Option<&str>,
        layer: &str,
        wbh_code: Option<&str>,
        bgt_code: Option<&str>,
        geometry: Option<&Geometry<f64>>,
    ) -> HydamoResult<String> {
        let code = match (code, geometry) {
            (Some(code), _) => code.to_string(),
            (None, Some(geometry)) => code_from_geometry(geometry).ok_or_else(|| HydamoError::ModelId {
                what: "geometry without centroid".to_string(),
            })?,
            (None, None) => {
                return Err(HydamoError::ModelId {
                    what: "specify a code or a geometry".to_string(),
                });
            }
        };
        if layer.is_empty() {
            return Err(HydamoError::ModelId {
                what: "specify a layer".to_string(),
            });
        }
        if let Some(wbh_code) = wbh_code {
            if self.wbh_code_exists(wbh_code) {
                let wbh_code = normalize_wbh_code(wbh_code).unwrap_or_default();
                return Ok(format!("NL.WBHCODE.{wbh_code}.{layer}.{code}"));
            }
        } else if let Some(bgt_code) = bgt_code
            && self.bgt_code_exists(bgt_code)
        {
            return Ok(match self.bgt_to_wbh_code(bgt_code) {
                Some(wbh_code) => format!("NL.WBHCODE.{wbh_code}.{layer}.{code}"),
                None => format!("NL.BGTCODE.{bgt_code}.{layer}.{code}"),
            });
        }
        Err(HydamoError::ModelId {
            what: format!("no valid wbh_code ({wbh_code:?}) or bgt_code ({bgt_code:?})"),
        })
    }
}

/// `loc={x},{y}` of the centroid, coordinates rounded half up.
pub fn code_from_geometry(geometry: &Geometry<f64>) -> Option<String> {
    let point = geometry.centroid()?;
    Some(format!(
        "loc={},{}",
        (point.x() + 0.5).trunc() as i64,
        (point.y() + 0.5).trunc() as i64
    ))
}

static REGISTRY: RwLock<Option<Arc<CodeRegistry>>> = RwLock::new(None);

/// Load the registry from `path` unless one is loaded already.
pub fn init(path: &Path) -> HydamoResult<Arc<CodeRegistry>> {
    if let Some(existing) = REGISTRY.read().map_err(|_| HydamoError::RegistryPoisoned)?.as_ref() {
        return Ok(Arc::clone(existing));
    }
    let mut slot = REGISTRY.write().map_err(|_| HydamoError::RegistryPoisoned)?;
    // another thread may have loaded it between both locks
    if let Some(existing) = slot.as_ref() {
        return Ok(Arc::clone(existing));
    }
    let registry = Arc::new(CodeRegistry::read(path)?);
    debug!(path = %path.display(), organizations = registry.organizations.len(), "loaded code registry");
    *slot = Some(Arc::clone(&registry));
    Ok(registry)
}

/// Install an already built registry, replacing any loaded one.
pub fn init_with(registry: CodeRegistry) -> HydamoResult<Arc<CodeRegistry>> {
    let registry = Arc::new(registry);
    *REGISTRY.write().map_err(|_| HydamoError::RegistryPoisoned)? = Some(Arc::clone(&registry));
    Ok(registry)
}

pub fn registry() -> HydamoResult<Arc<CodeRegistry>> {
    REGISTRY
        .read()
        .map_err(|_| HydamoError::RegistryPoisoned)?
        .as_ref()
        .map(Arc::clone)
        .ok_or(HydamoError::RegistryNotInitialized)
}

pub fn teardown() {
    if let Ok(mut slot) = REGISTRY.write() {
        *slot = None;
    }
}
