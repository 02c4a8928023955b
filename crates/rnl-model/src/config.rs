//! Root descriptor of a model bundle (`<name>.toml`).

use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use toml::value::Datetime;

use crate::error::{ModelError, ModelResult};

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const DEFAULT_CRS: &str = "EPSG:28992";

fn default_crs() -> String {
    DEFAULT_CRS.to_string()
}

fn default_input_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub starttime: Datetime,
    pub endtime: Datetime,
    #[serde(default = "default_crs")]
    pub crs: String,
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ribasim_version: Option<String>,
    /// Passed through to the solver unchanged.
    #[serde(default)]
    pub solver: toml::Table,
    #[serde(default)]
    pub logging: toml::Table,
    #[serde(default)]
    pub results: toml::Table,
}

pub fn to_datetime(value: NaiveDateTime) -> ModelResult<Datetime> {
    Datetime::from_str(&value.format(TIME_FORMAT).to_string())
        .map_err(|e| ModelError::invalid(format!("invalid datetime {value}: {e}")))
}

pub fn from_datetime(value: &Datetime) -> ModelResult<NaiveDateTime> {
    let text = value.to_string();
    NaiveDateTime::parse_from_str(&text, TIME_FORMAT)
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|e| ModelError::invalid(format!("unsupported datetime '{text}': {e}")))
}

impl ModelConfig {
    pub fn new(starttime: NaiveDateTime, endtime: NaiveDateTime) -> ModelResult<Self> {
        if endtime <= starttime {
            return Err(ModelError::invalid(format!(
                "endtime {endtime} is not after starttime {starttime}"
            )));
        }
        Ok(Self {
            starttime: to_datetime(starttime)?,
            endtime: to_datetime(endtime)?,
            crs: default_crs(),
            input_dir: default_input_dir(),
            results_dir: default_results_dir(),
            ribasim_version: None,
            solver: toml::Table::new(),
            logging: toml::Table::new(),
            results: toml::Table::new(),
        })
    }

    pub fn start(&self) -> ModelResult<NaiveDateTime> {
        from_datetime(&self.starttime)
    }

    pub fn end(&self) -> ModelResult<NaiveDateTime> {
        from_datetime(&self.endtime)
    }

    /// EPSG code of `crs` (`EPSG:28992` -> 28992).
    pub fn srs_id(&self) -> ModelResult<i32> {
        self.crs
            .rsplit(':')
            .next()
            .and_then(|code| code.trim().parse().ok())
            .ok_or_else(|| ModelError::invalid(format!("unsupported crs '{}'", self.crs)))
    }

    pub fn from_toml(text: &str) -> ModelResult<Self> {
        let config: ModelConfig = toml::from_str(text)?;
        config.start()?;
        config.end()?;
        config.srs_id()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ModelResult<String> {
        Ok(toml::to_string(self)?)
    }
}

fn new_year(year: u16) -> Datetime {
    Datetime {
        date: Some(toml::value::Date {
            year,
            month: 1,
            day: 1,
        }),
        time: Some(toml::value::Time {
            hour: 0,
            minute: 0,
            second: 0,
            nanosecond: 0,
        }),
        offset: None,
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            starttime: new_year(2020),
            endtime: new_year(2021),
            crs: default_crs(),
            input_dir: default_input_dir(),
            results_dir: default_results_dir(),
            ribasim_version: None,
            solver: toml::Table::new(),
            logging: toml::Table::new(),
            results: toml::Table::new(),
        }
    }
}
