//! File layout of one water authority under the data directory.
//!
//! ```text
//! <authority>/verwerkt/parameters/static_data.xlsx
//! <authority>/verwerkt/parameters/profiles.gpkg
//! <authority>/verwerkt/model_edits.gpkg
//! <authority>/verwerkt/model_edits_aanvoer.gpkg
//! <authority>/modellen/<authority>_<stage>/<short>.toml
//! <authority>/modellen/<authority>_<stage>/database.gpkg
//! <authority>/modellen/<authority>_<stage>/results/basin.arrow
//! ```

use std::path::{Path, PathBuf};

use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityPaths {
    root: PathBuf,
    authority: String,
}

impl AuthorityPaths {
    pub fn new(data_dir: &Path, authority: &str) -> Self {
        Self {
            root: data_dir.join(authority),
            authority: authority.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings, authority: &str) -> Self {
        Self::new(&settings.ribasim_nl_data_dir, authority)
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn verwerkt(&self) -> PathBuf {
        self.root.join("verwerkt")
    }

    pub fn parameters(&self) -> PathBuf {
        self.verwerkt().join("parameters")
    }

    pub fn static_data(&self) -> PathBuf {
        self.parameters().join("static_data.xlsx")
    }

    pub fn profiles(&self) -> PathBuf {
        self.parameters().join("profiles.gpkg")
    }

    pub fn model_edits(&self) -> PathBuf {
        self.verwerkt().join("model_edits.gpkg")
    }

    pub fn model_edits_aanvoer(&self) -> PathBuf {
        self.verwerkt().join("model_edits_aanvoer.gpkg")
    }

    pub fn models(&self) -> PathBuf {
        self.root.join("modellen")
    }

    /// `modellen/<authority>_<stage>`.
    pub fn model_dir(&self, stage: &str) -> PathBuf {
        self.models().join(format!("{}_{stage}", self.authority))
    }

    /// Root descriptor of a stage; `short` defaults to the authority name.
    pub fn model_toml(&self, stage: &str, short: Option<&str>) -> PathBuf {
        let short = short.unwrap_or(&self.authority);
        self.model_dir(stage).join(format!("{short}.toml"))
    }

    pub fn results(&self, stage: &str) -> PathBuf {
        self.model_dir(stage).join("results")
    }

    /// Diagnostics written by the validator.
    pub fn validation_result(&self, stage: &str) -> PathBuf {
        self.model_dir(stage).join("validation_result.gpkg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let paths = AuthorityPaths::new(Path::new("data"), "AaenMaas");
        assert_eq!(
            paths.static_data(),
            Path::new("data/AaenMaas/verwerkt/parameters/static_data.xlsx")
        );
        assert_eq!(
            paths.model_toml("parameterized", None),
            Path::new("data/AaenMaas/modellen/AaenMaas_parameterized/AaenMaas.toml")
        );
        assert_eq!(
            paths.model_toml("fix_model_network", Some("aam")),
            Path::new("data/AaenMaas/modellen/AaenMaas_fix_model_network/aam.toml")
        );
        assert_eq!(
            paths.model_edits_aanvoer(),
            Path::new("data/AaenMaas/verwerkt/model_edits_aanvoer.gpkg")
        );
    }
}
