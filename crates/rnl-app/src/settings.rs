//! Process settings: solver executable, data directory and cloud password.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AppError, AppResult};

pub const RIBASIM_EXE: &str = "RIBASIM_EXE";
pub const RIBASIM_NL_DATA_DIR: &str = "RIBASIM_NL_DATA_DIR";
pub const RIBASIM_NL_CLOUD_PASS: &str = "RIBASIM_NL_CLOUD_PASS";

pub const ENV_FILE: &str = ".env";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ribasim_exe: PathBuf,
    pub ribasim_nl_data_dir: PathBuf,
    pub ribasim_nl_cloud_pass: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ribasim_exe: PathBuf::from("ribasim"),
            ribasim_nl_data_dir: PathBuf::from("data"),
            ribasim_nl_cloud_pass: String::new(),
        }
    }
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsOverrides {
    pub ribasim_exe: Option<PathBuf>,
    pub ribasim_nl_data_dir: Option<PathBuf>,
}

/// Variables of a `.env` file, keys upper-cased. Parsing (comments, quotes,
/// `export` prefixes, substitution) follows dotenvy.
pub fn read_env_file(path: &Path) -> AppResult<BTreeMap<String, String>> {
    let invalid = |e: dotenvy::Error| AppError::Settings(format!("{}: {e}", path.display()));
    let mut values = BTreeMap::new();
    for item in dotenvy::from_path_iter(path).map_err(invalid)? {
        let (key, value) = item.map_err(invalid)?;
        values.insert(key.to_ascii_uppercase(), value);
    }
    Ok(values)
}

impl Settings {
    /// Settings from `overrides`, then `.env` in `dir`, then the process
    /// environment.
    pub fn load(dir: &Path, overrides: &SettingsOverrides) -> AppResult<Self> {
        let env_file = dir.join(ENV_FILE);
        let dotenv = if env_file.exists() {
            debug!(path = %env_file.display(), "reading settings");
            read_env_file(&env_file)?
        } else {
            BTreeMap::new()
        };
        Ok(Self::resolve(overrides, &dotenv, |key| std::env::var(key).ok()))
    }

    pub fn resolve(
        overrides: &SettingsOverrides,
        dotenv: &BTreeMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let lookup = |key: &str| {
            dotenv
                .get(key)
                .cloned()
                .filter(|v| !v.is_empty())
                .or_else(|| env(key).filter(|v| !v.is_empty()))
        };
        let defaults = Self::default();
        Self {
            ribasim_exe: overrides
                .ribasim_exe
                .clone()
                .or_else(|| lookup(RIBASIM_EXE).map(PathBuf::from))
                .unwrap_or(defaults.ribasim_exe),
            ribasim_nl_data_dir: overrides
                .ribasim_nl_data_dir
                .clone()
                .or_else(|| lookup(RIBASIM_NL_DATA_DIR).map(PathBuf::from))
                .unwrap_or(defaults.ribasim_nl_data_dir),
            ribasim_nl_cloud_pass: lookup(RIBASIM_NL_CLOUD_PASS).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn env_file_syntax() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ENV_FILE);
        fs::write(
            &path,
            "# local settings\n\
             RIBASIM_EXE=\"/opt/ribasim/ribasim\"\n\
             export ribasim_nl_data_dir='d:/data'\n\n",
        )
        .unwrap();
        let values = read_env_file(&path).unwrap();
        assert_eq!(values[RIBASIM_EXE], "/opt/ribasim/ribasim");
        assert_eq!(values[RIBASIM_NL_DATA_DIR], "d:/data");

        fs::write(&path, "no equals sign\n").unwrap();
        assert!(matches!(read_env_file(&path), Err(AppError::Settings(_))));
    }

    #[test]
    fn precedence() {
        let env = |key: &str| match key {
            RIBASIM_EXE => Some("from-env".to_string()),
            RIBASIM_NL_DATA_DIR => Some("env-data".to_string()),
            RIBASIM_NL_CLOUD_PASS => Some("secret".to_string()),
            _ => None,
        };
        let dotenv = BTreeMap::from([(RIBASIM_EXE.to_string(), "from-dotenv".to_string())]);

        let settings = Settings::resolve(&SettingsOverrides::default(), &dotenv, env);
        assert_eq!(settings.ribasim_exe, PathBuf::from("from-dotenv"));
        assert_eq!(settings.ribasim_nl_data_dir, PathBuf::from("env-data"));
        assert_eq!(settings.ribasim_nl_cloud_pass, "secret");

        let overrides = SettingsOverrides {
            ribasim_exe: Some(PathBuf::from("explicit")),
            ..SettingsOverrides::default()
        };
        let settings = Settings::resolve(&overrides, &dotenv, env);
        assert_eq!(settings.ribasim_exe, PathBuf::from("explicit"));

        let settings = Settings::resolve(&SettingsOverrides::default(), &BTreeMap::new(), |_| None);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn load_reads_the_env_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(ENV_FILE), "RIBASIM_NL_DATA_DIR=modeldata\n").unwrap();
        let settings = Settings::load(dir.path(), &SettingsOverrides::default()).unwrap();
        assert_eq!(settings.ribasim_nl_data_dir, PathBuf::from("modeldata"));
    }
}
