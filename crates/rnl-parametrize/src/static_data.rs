//! Parameterization defaults per structure category plus per-node overrides.
//!
//! The workbook `static_data.xlsx` has one sheet per table, each with a
//! header row:
//!
//! ```text
//! defaults       categorie | upstream_level_offset | downstream_level_offset | flow_rate | flow_rate_mm_per_day | function
//! Pump, Outlet   code | node_id | name | flow_rate | min_upstream_level | max_downstream_level | categorie | opmerking_waterbeheerder
//! LevelBoundary  node_id | code | level | opmerking_waterbeheerder
//! ```
//!
//! Sheets may be missing and columns may come in any order. Built-in
//! categories are always present; rows in `defaults` replace or extend them.

use std::collections::BTreeMap;
use std::path::Path;

use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use rnl_core::NodeId;
use rnl_model::{Model, Node, NodeFunction, NodeType};
use rust_xlsxwriter::Workbook;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ParamError, ParamResult};

pub const AFVOERGEMAAL: &str = "Afvoergemaal";
pub const AANVOERGEMAAL: &str = "Aanvoergemaal";
pub const UITLAAT: &str = "Uitlaat";
pub const INLAAT: &str = "Inlaat";

/// Effects of one structure category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefaults {
    #[serde(default)]
    pub upstream_level_offset: f64,
    #[serde(default)]
    pub downstream_level_offset: f64,
    /// Fixed flow rate in m³/s, used when no specific discharge is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_rate_mm_per_day: Option<f64>,
    pub function: NodeFunction,
}

impl CategoryDefaults {
    fn new(upstream: f64, downstream: f64, mm_per_day: f64, function: NodeFunction) -> Self {
        Self {
            upstream_level_offset: upstream,
            downstream_level_offset: downstream,
            flow_rate: None,
            flow_rate_mm_per_day: Some(mm_per_day),
            function,
        }
    }
}

pub fn builtin_categories() -> BTreeMap<String, CategoryDefaults> {
    BTreeMap::from([
        (
            AFVOERGEMAAL.to_string(),
            CategoryDefaults::new(0.0, 0.2, 15.0, NodeFunction::Outlet),
        ),
        (
            AANVOERGEMAAL.to_string(),
            CategoryDefaults::new(0.2, 0.0, 4.0, NodeFunction::Inlet),
        ),
        (
            UITLAAT.to_string(),
            CategoryDefaults::new(0.0, 0.3, 50.0, NodeFunction::Outlet),
        ),
        (
            INLAAT.to_string(),
            CategoryDefaults::new(0.2, 0.0, 4.0, NodeFunction::Inlet),
        ),
    ])
}

/// One row of the `Pump` or `Outlet` sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_upstream_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_downstream_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opmerking_waterbeheerder: Option<String>,
}

/// One row of the `LevelBoundary` sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelBoundaryOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opmerking_waterbeheerder: Option<String>,
}

trait Keyed {
    fn node_id(&self) -> Option<NodeId>;
    fn code(&self) -> Option<&str>;

    /// Rows match on node_id first, then on the waterboard code.
    fn matches(&self, node: &Node) -> bool {
        match self.node_id() {
            Some(id) => id == node.node_id,
            None => self
                .code()
                .is_some_and(|code| node.meta_code_waterbeheerder.as_deref() == Some(code)),
        }
    }
}

impl Keyed for StructureOverride {
    fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl Keyed for LevelBoundaryOverride {
    fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticData {
    #[serde(default = "builtin_categories")]
    pub defaults: BTreeMap<String, CategoryDefaults>,
    #[serde(default, rename = "Pump")]
    pub pump: Vec<StructureOverride>,
    #[serde(default, rename = "Outlet")]
    pub outlet: Vec<StructureOverride>,
    #[serde(default, rename = "LevelBoundary")]
    pub level_boundary: Vec<LevelBoundaryOverride>,
}

impl Default for StaticData {
    fn default() -> Self {
        Self {
            defaults: builtin_categories(),
            pump: Vec::new(),
            outlet: Vec::new(),
            level_boundary: Vec::new(),
        }
    }
}

const DEFAULTS_SHEET: &str = "defaults";
const CATEGORIE: &str = "categorie";
const DEFAULTS_COLUMNS: [&str; 6] = [
    CATEGORIE,
    "upstream_level_offset",
    "downstream_level_offset",
    "flow_rate",
    "flow_rate_mm_per_day",
    "function",
];
const STRUCTURE_COLUMNS: [&str; 8] = [
    "code",
    "node_id",
    "name",
    "flow_rate",
    "min_upstream_level",
    "max_downstream_level",
    CATEGORIE,
    "opmerking_waterbeheerder",
];
const LEVEL_BOUNDARY_COLUMNS: [&str; 4] = ["node_id", "code", "level", "opmerking_waterbeheerder"];
/// Columns read as text even when the cell holds a number.
const TEXT_COLUMNS: [&str; 4] = ["code", "name", CATEGORIE, "opmerking_waterbeheerder"];

/// One row of the `defaults` sheet.
#[derive(Serialize, Deserialize)]
struct CategoryRow {
    categorie: String,
    #[serde(flatten)]
    defaults: CategoryDefaults,
}

/// A cell as a JSON value; empty cells give `None`. Whole floats become
/// integers so they can fill id columns.
fn cell_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Int(v) => Some(Value::from(*v)),
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 2f64.powi(53) => Some(Value::from(*v as i64)),
        Data::Float(v) => Some(Value::from(*v)),
        Data::Bool(v) => Some(Value::from(*v)),
        Data::String(v) | Data::DateTimeIso(v) | Data::DurationIso(v) => {
            let v = v.trim();
            (!v.is_empty()).then(|| Value::from(v))
        }
        Data::DateTime(v) => Some(Value::from(v.as_f64())),
        Data::Error(_) | Data::Empty => None,
    }
}

/// Rows of a sheet keyed on the header row.
fn sheet_records(range: &Range<Data>) -> Vec<Map<String, Value>> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let header: Vec<Option<String>> = header
        .iter()
        .map(|cell| match cell {
            Data::String(name) => Some(name.trim().to_string()),
            _ => None,
        })
        .collect();
    rows.map(|row| {
        header
            .iter()
            .zip(row)
            .filter_map(|(name, cell)| Some((name.clone()?, cell_value(cell)?)))
            .collect::<Map<String, Value>>()
    })
    .filter(|record| !record.is_empty())
    .collect()
}

fn parse_records<T: DeserializeOwned>(sheet: &str, records: Vec<Map<String, Value>>) -> ParamResult<Vec<T>> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, mut record)| {
            for column in TEXT_COLUMNS {
                if let Some(value) = record.get_mut(column)
                    && value.is_number()
                {
                    *value = Value::String(value.to_string());
                }
            }
            serde_json::from_value(Value::Object(record)).map_err(|e| {
                // header is row 1
                ParamError::invalid(format!("sheet '{sheet}' row {}: {e}", i + 2))
            })
        })
        .collect()
}

fn write_sheet<T: Serialize>(
    workbook: &mut Workbook,
    name: &str,
    columns: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> ParamResult<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;
    for (col, column) in (0u16..).zip(columns) {
        sheet.write_string(0, col, *column)?;
    }
    for (row, record) in (1u32..).zip(rows) {
        let Value::Object(record) = serde_json::to_value(record)? else {
            continue;
        };
        for (col, column) in (0u16..).zip(columns) {
            match record.get(*column) {
                Some(Value::Number(n)) => {
                    sheet.write_number(row, col, n.as_f64().unwrap_or(f64::NAN))?;
                }
                Some(Value::String(text)) => {
                    sheet.write_string(row, col, text)?;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

impl StaticData {
    /// Read `static_data.xlsx`.
    pub fn load_xlsx(path: &Path) -> ParamResult<Self> {
        let mut workbook: Xlsx<_> = open_workbook(path).map_err(calamine::Error::from)?;
        let mut records = |sheet: &str| -> ParamResult<Vec<Map<String, Value>>> {
            if !workbook.sheet_names().iter().any(|name| name == sheet) {
                return Ok(Vec::new());
            }
            let range = workbook
                .worksheet_range(sheet)
                .map_err(calamine::Error::from)?;
            Ok(sheet_records(&range))
        };

        let mut defaults = builtin_categories();
        let rows: Vec<CategoryRow> = parse_records(DEFAULTS_SHEET, records(DEFAULTS_SHEET)?)?;
        defaults.extend(rows.into_iter().map(|row| (row.categorie, row.defaults)));
        let data = Self {
            defaults,
            pump: parse_records("Pump", records("Pump")?)?,
            outlet: parse_records("Outlet", records("Outlet")?)?,
            level_boundary: parse_records("LevelBoundary", records("LevelBoundary")?)?,
        };
        data.validate()?;
        debug!(
            path = %path.display(),
            categories = data.defaults.len(),
            pumps = data.pump.len(),
            outlets = data.outlet.len(),
            level_boundaries = data.level_boundary.len(),
            "loaded static data"
        );
        Ok(data)
    }

    /// Write the workbook, one sheet per table.
    pub fn save_xlsx(&self, path: &Path) -> ParamResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            DEFAULTS_SHEET,
            &DEFAULTS_COLUMNS,
            self.defaults
                .iter()
                .map(|(categorie, defaults)| CategoryRow {
                    categorie: categorie.clone(),
                    defaults: defaults.clone(),
                }),
        )?;
        write_sheet(&mut workbook, "Pump", &STRUCTURE_COLUMNS, &self.pump)?;
        write_sheet(&mut workbook, "Outlet", &STRUCTURE_COLUMNS, &self.outlet)?;
        write_sheet(
            &mut workbook,
            "LevelBoundary",
            &LEVEL_BOUNDARY_COLUMNS,
            &self.level_boundary,
        )?;
        workbook.save(path)?;
        Ok(())
    }

    /// Every override categorie must be a known category.
    pub fn validate(&self) -> ParamResult<()> {
        for row in self.pump.iter().chain(&self.outlet) {
            if let Some(categorie) = &row.categorie
                && !self.defaults.contains_key(categorie)
            {
                return Err(ParamError::UnknownCategory {
                    categorie: categorie.clone(),
                    node_ids: row.node_id.into_iter().collect(),
                });
            }
        }
        Ok(())
    }

    pub fn category(&self, categorie: &str) -> Option<&CategoryDefaults> {
        self.defaults.get(categorie)
    }

    pub fn structure_overrides(&self, node_type: NodeType) -> &[StructureOverride] {
        match node_type {
            NodeType::Pump => &self.pump,
            NodeType::Outlet => &self.outlet,
            _ => &[],
        }
    }

    pub fn structure_override(&self, node: &Node) -> Option<&StructureOverride> {
        self.structure_overrides(node.node_type)
            .iter()
            .find(|row| row.matches(node))
    }

    pub fn level_boundary_override(&self, node: &Node) -> Option<&LevelBoundaryOverride> {
        self.level_boundary.iter().find(|row| row.matches(node))
    }

    /// Categorie of a structure: the override sheet wins over the node table.
    pub fn categorie_of<'a>(&'a self, node: &'a Node) -> Option<&'a str> {
        self.structure_override(node)
            .and_then(|row| row.categorie.as_deref())
            .or(node.meta_categorie.as_deref())
    }

    /// A document with one row per Pump, Outlet and LevelBoundary of the
    /// model, for operators to fill in.
    pub fn template(model: &Model) -> Self {
        let structure_rows = |node_type: NodeType, fallback: &str| -> Vec<StructureOverride> {
            model
                .nodes_of_type(node_type)
                .map(|node| {
                    let categorie = node
                        .meta_categorie
                        .as_deref()
                        .filter(|c| builtin_categories().contains_key(*c))
                        .unwrap_or(fallback);
                    StructureOverride {
                        code: node.meta_code_waterbeheerder.clone(),
                        node_id: Some(node.node_id),
                        name: node.name.clone(),
                        categorie: Some(categorie.to_string()),
                        ..StructureOverride::default()
                    }
                })
                .collect()
        };
        Self {
            defaults: builtin_categories(),
            pump: structure_rows(NodeType::Pump, AFVOERGEMAAL),
            outlet: structure_rows(NodeType::Outlet, UITLAAT),
            level_boundary: model
                .nodes_of_type(NodeType::LevelBoundary)
                .map(|node| LevelBoundaryOverride {
                    node_id: Some(node.node_id),
                    code: node.meta_code_waterbeheerder.clone(),
                    ..LevelBoundaryOverride::default()
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Write raw sheets the way an operator would fill them in.
    fn workbook(path: &Path, sheets: &[(&str, &[&str], &[&[Option<&str>]])]) {
        let mut workbook = Workbook::new();
        for (name, header, rows) in sheets {
            let sheet = workbook.add_worksheet();
            sheet.set_name(*name).unwrap();
            for (col, column) in (0u16..).zip(header.iter()) {
                sheet.write_string(0, col, *column).unwrap();
            }
            for (row, cells) in (1u32..).zip(rows.iter()) {
                for (col, cell) in (0u16..).zip(cells.iter()) {
                    match cell.map(|c| (c, c.parse::<f64>())) {
                        Some((_, Ok(number))) => {
                            sheet.write_number(row, col, number).unwrap();
                        }
                        Some((text, Err(_))) => {
                            sheet.write_string(row, col, text).unwrap();
                        }
                        None => {}
                    }
                }
            }
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn builtin_categories_are_always_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static_data.xlsx");
        workbook(
            &path,
            &[(
                "defaults",
                &["categorie", "downstream_level_offset", "flow_rate_mm_per_day", "flow_rate", "function"],
                &[
                    &[Some("Afvoergemaal"), Some("0.5"), Some("20"), None, Some("outlet")],
                    &[Some("Noodpomp"), None, None, Some("2"), Some("outlet")],
                ],
            )],
        );
        let data = StaticData::load_xlsx(&path).unwrap();
        assert_eq!(data.defaults.len(), 5);
        let afvoer = data.category(AFVOERGEMAAL).unwrap();
        assert_eq!(afvoer.downstream_level_offset, 0.5);
        assert_eq!(afvoer.upstream_level_offset, 0.0);
        assert_eq!(data.category("Noodpomp").unwrap().flow_rate, Some(2.0));
        assert_eq!(data.category(INLAAT).unwrap().function, NodeFunction::Inlet);
        assert!(data.pump.is_empty());
    }

    #[test]
    fn unknown_override_category_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static_data.xlsx");
        workbook(
            &path,
            &[("Pump", &["code", "categorie"], &[&[Some("KGM1"), Some("Vijzel")]])],
        );
        let err = StaticData::load_xlsx(&path).unwrap_err();
        assert!(matches!(err, ParamError::UnknownCategory { ref categorie, .. } if categorie == "Vijzel"));
    }

    #[test]
    fn bad_cells_name_their_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static_data.xlsx");
        workbook(
            &path,
            &[(
                "LevelBoundary",
                &["node_id", "level"],
                &[&[Some("3"), Some("0.4")], &[Some("4"), Some("hoog")]],
            )],
        );
        let err = StaticData::load_xlsx(&path).unwrap_err().to_string();
        assert!(err.contains("'LevelBoundary' row 3"), "{err}");
    }

    #[test]
    fn overrides_match_on_node_id_then_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static_data.xlsx");
        workbook(
            &path,
            &[(
                "Pump",
                &["code", "node_id", "flow_rate"],
                &[&[Some("KGM1"), None, Some("1.0")], &[None, Some("7"), Some("2.5")]],
            )],
        );
        let data = StaticData::load_xlsx(&path).unwrap();
        let mut node = Node::new(NodeId::new(7).unwrap(), NodeType::Pump, geo::Point::new(0.0, 0.0));
        assert_eq!(data.structure_override(&node).unwrap().flow_rate, Some(2.5));
        node.node_id = NodeId::new(8).unwrap();
        node.meta_code_waterbeheerder = Some("KGM1".to_string());
        assert_eq!(data.structure_override(&node).unwrap().flow_rate, Some(1.0));
        node.node_type = NodeType::Outlet;
        assert!(data.structure_override(&node).is_none());
    }

    #[test]
    fn workbook_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parameters").join("static_data.xlsx");
        let mut data = StaticData::default();
        data.pump.push(StructureOverride {
            code: Some("KGM001".to_string()),
            flow_rate: Some(1.5),
            categorie: Some(AANVOERGEMAAL.to_string()),
            ..StructureOverride::default()
        });
        data.level_boundary.push(LevelBoundaryOverride {
            node_id: NodeId::new(3),
            level: Some(0.4),
            ..LevelBoundaryOverride::default()
        });
        data.save_xlsx(&path).unwrap();
        assert_eq!(StaticData::load_xlsx(&path).unwrap(), data);
    }
}
