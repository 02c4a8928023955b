//! Typed node sub-tables.
//!
//! Every `(node type, table)` pair of the database is a record type
//! implementing [`NodeRow`]. The model stores them as [`Table`] values
//! keyed on [`TableKind`].

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use geo::{Geometry, MultiPolygon};
use rnl_core::NodeId;
use rnl_gpkg::{ColumnKind, Feature, GeometryType, Layer, Value};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::node_type::NodeType;
use crate::row::{NodeRow, flag, from_attributes, to_attributes};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasinProfile {
    pub node_id: NodeId,
    pub level: f64,
    pub area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasinState {
    pub node_id: NodeId,
    pub level: f64,
}

/// Basin forcing in m/s. Absent values are treated as zero by the solver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BasinForcing {
    pub precipitation: Option<f64>,
    pub potential_evaporation: Option<f64>,
    pub drainage: Option<f64>,
    pub infiltration: Option<f64>,
    pub surface_runoff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasinStatic {
    pub node_id: NodeId,
    #[serde(flatten)]
    pub forcing: BasinForcing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasinTime {
    pub node_id: NodeId,
    pub time: NaiveDateTime,
    #[serde(flatten)]
    pub forcing: BasinForcing,
}

fn empty_area() -> MultiPolygon<f64> {
    MultiPolygon::new(Vec::new())
}

/// Area of a Basin. The geometry is stored in the layer's geometry column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasinArea {
    pub node_id: NodeId,
    #[serde(skip, default = "empty_area")]
    pub geometry: MultiPolygon<f64>,
    pub meta_streefpeil: Option<f64>,
    pub meta_code_waterbeheerder: Option<String>,
    #[serde(flatten)]
    pub meta: BTreeMap<String, Value>,
}

impl BasinArea {
    pub fn new(node_id: NodeId, geometry: MultiPolygon<f64>) -> Self {
        Self {
            node_id,
            geometry,
            meta_streefpeil: None,
            meta_code_waterbeheerder: None,
            meta: BTreeMap::new(),
        }
    }
}

/// Pump and Outlet share their static columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureStatic {
    pub node_id: NodeId,
    #[serde(default, with = "flag")]
    pub active: Option<bool>,
    pub flow_rate: f64,
    pub min_flow_rate: Option<f64>,
    pub max_flow_rate: Option<f64>,
    pub min_upstream_level: Option<f64>,
    pub max_downstream_level: Option<f64>,
    pub control_state: Option<String>,
    #[serde(flatten)]
    pub meta: BTreeMap<String, Value>,
}

impl StructureStatic {
    pub fn new(node_id: NodeId, flow_rate: f64) -> Self {
        Self {
            node_id,
            active: None,
            flow_rate,
            min_flow_rate: None,
            max_flow_rate: None,
            min_upstream_level: None,
            max_downstream_level: None,
            control_state: None,
            meta: BTreeMap::new(),
        }
    }
}

pub type PumpStatic = StructureStatic;

/// Newtype so Outlet rows are a distinct table from Pump rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutletStatic(pub StructureStatic);

impl std::ops::Deref for OutletStatic {
    type Target = StructureStatic;

    fn deref(&self) -> &StructureStatic {
        &self.0
    }
}

impl std::ops::DerefMut for OutletStatic {
    fn deref_mut(&mut self) -> &mut StructureStatic {
        &mut self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabulatedRatingCurveStatic {
    pub node_id: NodeId,
    #[serde(default, with = "flag")]
    pub active: Option<bool>,
    pub level: f64,
    pub flow_rate: f64,
    pub max_downstream_level: Option<f64>,
    pub control_state: Option<String>,
    #[serde(flatten)]
    pub meta: BTreeMap<String, Value>,
}

impl TabulatedRatingCurveStatic {
    pub fn new(node_id: NodeId, level: f64, flow_rate: f64) -> Self {
        Self {
            node_id,
            active: None,
            level,
            flow_rate,
            max_downstream_level: None,
            control_state: None,
            meta: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabulatedRatingCurveTime {
    pub node_id: NodeId,
    pub time: NaiveDateTime,
    pub level: f64,
    pub flow_rate: f64,
    pub max_downstream_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManningResistanceStatic {
    pub node_id: NodeId,
    #[serde(default, with = "flag")]
    pub active: Option<bool>,
    pub length: f64,
    pub manning_n: f64,
    pub profile_width: f64,
    pub profile_slope: f64,
    pub control_state: Option<String>,
    #[serde(flatten)]
    pub meta: BTreeMap<String, Value>,
}

impl ManningResistanceStatic {
    pub fn new(
        node_id: NodeId,
        length: f64,
        manning_n: f64,
        profile_width: f64,
        profile_slope: f64,
    ) -> Self {
        Self {
            node_id,
            active: None,
            length,
            manning_n,
            profile_width,
            profile_slope,
            control_state: None,
            meta: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearResistanceStatic {
    pub node_id: NodeId,
    #[serde(default, with = "flag")]
    pub active: Option<bool>,
    pub resistance: f64,
    pub max_flow_rate: Option<f64>,
    pub control_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelBoundaryStatic {
    pub node_id: NodeId,
    #[serde(default, with = "flag")]
    pub active: Option<bool>,
    pub level: f64,
    #[serde(flatten)]
    pub meta: BTreeMap<String, Value>,
}

impl LevelBoundaryStatic {
    pub fn new(node_id: NodeId, level: f64) -> Self {
        Self {
            node_id,
            active: None,
            level,
            meta: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelBoundaryTime {
    pub node_id: NodeId,
    pub time: NaiveDateTime,
    pub level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowBoundaryStatic {
    pub node_id: NodeId,
    #[serde(default, with = "flag")]
    pub active: Option<bool>,
    pub flow_rate: f64,
    #[serde(flatten)]
    pub meta: BTreeMap<String, Value>,
}

impl FlowBoundaryStatic {
    pub fn new(node_id: NodeId, flow_rate: f64) -> Self {
        Self {
            node_id,
            active: None,
            flow_rate,
            meta: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowBoundaryTime {
    pub node_id: NodeId,
    pub time: NaiveDateTime,
    pub flow_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractionalFlowStatic {
    pub node_id: NodeId,
    pub fraction: f64,
    pub control_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteControlCondition {
    pub node_id: NodeId,
    pub listen_node_id: NodeId,
    pub variable: String,
    pub greater_than: f64,
    #[serde(flatten)]
    pub meta: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteControlLogic {
    pub node_id: NodeId,
    pub truth_state: String,
    pub control_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidControlStatic {
    pub node_id: NodeId,
    #[serde(default, with = "flag")]
    pub active: Option<bool>,
    pub listen_node_id: NodeId,
    pub target: f64,
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
    pub control_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousControlVariable {
    pub node_id: NodeId,
    pub listen_node_id: NodeId,
    pub variable: String,
    pub weight: Option<f64>,
    pub look_ahead: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousControlFunction {
    pub node_id: NodeId,
    pub input: f64,
    pub output: f64,
    pub controlled_variable: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDemandStatic {
    pub node_id: NodeId,
    pub demand: f64,
    pub demand_priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDemandStatic {
    pub node_id: NodeId,
    pub min_level: Option<f64>,
    pub max_level: Option<f64>,
    pub demand_priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDemandStatic {
    pub node_id: NodeId,
    #[serde(default, with = "flag")]
    pub active: Option<bool>,
    pub demand: f64,
    pub return_factor: f64,
    pub min_level: f64,
    pub demand_priority: i32,
}

macro_rules! node_tables {
    ($( $variant:ident => ($node_type:ident, $table:literal, $row:ty $(, $listen:ident)?) ),* $(,)?) => {
        /// A `(node type, table)` pair.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum TableKind {
            $($variant),*
        }

        impl TableKind {
            pub const ALL: &'static [TableKind] = &[$(TableKind::$variant),*];

            pub fn node_type(self) -> NodeType {
                match self {
                    $(TableKind::$variant => NodeType::$node_type),*
                }
            }

            /// Table name without the node type, e.g. `profile`.
            pub fn table_name(self) -> &'static str {
                match self {
                    $(TableKind::$variant => $table),*
                }
            }
        }

        /// Rows of one sub-table.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Table {
            $($variant(Vec<$row>)),*
        }

        impl Table {
            pub fn empty(kind: TableKind) -> Table {
                match kind {
                    $(TableKind::$variant => Table::$variant(Vec::new())),*
                }
            }

            pub fn kind(&self) -> TableKind {
                match self {
                    $(Table::$variant(_) => TableKind::$variant),*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(Table::$variant(rows) => rows.len()),*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// node_id of every row, in row order.
            pub fn node_ids(&self) -> Vec<NodeId> {
                match self {
                    $(Table::$variant(rows) => rows.iter().map(NodeRow::node_id).collect()),*
                }
            }

            /// Nodes referenced by rows besides their own node_id.
            pub fn referenced_nodes(&self) -> Vec<NodeId> {
                match self {
                    $(Table::$variant(rows) => rows.iter().flat_map(NodeRow::referenced_nodes).collect()),*
                }
            }

            pub fn retain_nodes(&mut self, mut keep: impl FnMut(NodeId) -> bool) {
                match self {
                    $(Table::$variant(rows) => rows.retain(|row| keep(row.node_id()))),*
                }
            }

            /// Apply a node_id mapping to node_id and every reference.
            pub fn remap_nodes(&mut self, remap: &dyn Fn(NodeId) -> NodeId) {
                match self {
                    $(Table::$variant(rows) => {
                        for row in rows.iter_mut() {
                            row.set_node_id(remap(row.node_id()));
                            row.remap_references(remap);
                        }
                    }),*
                }
            }

            /// Re-key every row on `node_id`, leaving references alone.
            pub fn set_node_ids(&mut self, node_id: NodeId) {
                match self {
                    $(Table::$variant(rows) => {
                        for row in rows.iter_mut() {
                            row.set_node_id(node_id);
                        }
                    }),*
                }
            }

            /// Stable sort on node_id.
            pub fn sort(&mut self) {
                match self {
                    $(Table::$variant(rows) => rows.sort_by_key(NodeRow::node_id)),*
                }
            }

            /// Move the rows of `other` to the end of this table.
            pub fn append(&mut self, other: Table) -> ModelResult<()> {
                match (self, other) {
                    $((Table::$variant(rows), Table::$variant(more)) => {
                        rows.extend(more);
                        Ok(())
                    })*
                    (this, other) => Err(ModelError::invalid(format!(
                        "cannot append '{}' rows to '{}'",
                        other.kind(),
                        this.kind()
                    ))),
                }
            }

            /// Rows of `node_id` only.
            pub fn filter_node(&self, node_id: NodeId) -> Table {
                let mut table = self.clone();
                table.retain_nodes(|id| id == node_id);
                table
            }

            pub(crate) fn attribute_rows(&self) -> ModelResult<Vec<BTreeMap<String, Value>>> {
                let name = self.kind().to_string();
                match self {
                    $(Table::$variant(rows) => rows.iter().map(|row| to_attributes(row, &name)).collect()),*
                }
            }

            pub(crate) fn from_attribute_rows(
                kind: TableKind,
                rows: &[BTreeMap<String, Value>],
            ) -> ModelResult<Table> {
                let name = kind.to_string();
                match kind {
                    $(TableKind::$variant => Ok(Table::$variant(
                        rows.iter()
                            .map(|attrs| from_attributes::<$row>(attrs, &name))
                            .collect::<ModelResult<Vec<_>>>()?,
                    ))),*
                }
            }
        }

        $(
            impl NodeRow for $row {
                const KIND: TableKind = TableKind::$variant;

                fn node_id(&self) -> NodeId {
                    self.node_id
                }

                fn set_node_id(&mut self, node_id: NodeId) {
                    self.node_id = node_id;
                }

                fn referenced_nodes(&self) -> Vec<NodeId> {
                    let references: Vec<NodeId> = vec![$(self.$listen)?];
                    references
                }

                #[allow(unused_variables)]
                fn remap_references(&mut self, remap: &dyn Fn(NodeId) -> NodeId) {
                    $(self.$listen = remap(self.$listen);)?
                }

                fn rows(table: &Table) -> Option<&Vec<Self>> {
                    match table {
                        Table::$variant(rows) => Some(rows),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn rows_mut(table: &mut Table) -> Option<&mut Vec<Self>> {
                    match table {
                        Table::$variant(rows) => Some(rows),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn into_table(rows: Vec<Self>) -> Table {
                    Table::$variant(rows)
                }
            }
        )*
    };
}

node_tables! {
    BasinProfile => (Basin, "profile", BasinProfile),
    BasinState => (Basin, "state", BasinState),
    BasinStatic => (Basin, "static", BasinStatic),
    BasinTime => (Basin, "time", BasinTime),
    BasinArea => (Basin, "area", BasinArea),
    PumpStatic => (Pump, "static", PumpStatic),
    OutletStatic => (Outlet, "static", OutletStatic),
    TabulatedRatingCurveStatic => (TabulatedRatingCurve, "static", TabulatedRatingCurveStatic),
    TabulatedRatingCurveTime => (TabulatedRatingCurve, "time", TabulatedRatingCurveTime),
    ManningResistanceStatic => (ManningResistance, "static", ManningResistanceStatic),
    LinearResistanceStatic => (LinearResistance, "static", LinearResistanceStatic),
    LevelBoundaryStatic => (LevelBoundary, "static", LevelBoundaryStatic),
    LevelBoundaryTime => (LevelBoundary, "time", LevelBoundaryTime),
    FlowBoundaryStatic => (FlowBoundary, "static", FlowBoundaryStatic),
    FlowBoundaryTime => (FlowBoundary, "time", FlowBoundaryTime),
    FractionalFlowStatic => (FractionalFlow, "static", FractionalFlowStatic),
    DiscreteControlCondition => (DiscreteControl, "condition", DiscreteControlCondition, listen_node_id),
    DiscreteControlLogic => (DiscreteControl, "logic", DiscreteControlLogic),
    PidControlStatic => (PidControl, "static", PidControlStatic, listen_node_id),
    ContinuousControlVariable => (ContinuousControl, "variable", ContinuousControlVariable, listen_node_id),
    ContinuousControlFunction => (ContinuousControl, "function", ContinuousControlFunction),
    FlowDemandStatic => (FlowDemand, "static", FlowDemandStatic),
    LevelDemandStatic => (LevelDemand, "static", LevelDemandStatic),
    UserDemandStatic => (UserDemand, "static", UserDemandStatic),
}

impl TableKind {
    /// Tables holding timestamped rows, also written as CSV.
    pub fn is_time(self) -> bool {
        matches!(
            self,
            TableKind::BasinTime
                | TableKind::TabulatedRatingCurveTime
                | TableKind::LevelBoundaryTime
                | TableKind::FlowBoundaryTime
        )
    }

    /// Database table name, e.g. `Basin / profile`.
    pub fn layer_name(self) -> String {
        format!("{} / {}", self.node_type(), self.table_name())
    }

    pub fn for_node_type(node_type: NodeType) -> impl Iterator<Item = TableKind> {
        TableKind::ALL
            .iter()
            .copied()
            .filter(move |kind| kind.node_type() == node_type)
    }

    /// Parse `Basin / profile` (or `basin.profile`).
    pub fn parse(name: &str) -> ModelResult<TableKind> {
        let (node_type, table) = name
            .split_once(" / ")
            .or_else(|| name.split_once('.'))
            .ok_or_else(|| ModelError::UnknownTable(name.to_string()))?;
        let node_type: NodeType = node_type.trim().parse()?;
        TableKind::for_node_type(node_type)
            .find(|kind| kind.table_name() == table.trim())
            .ok_or_else(|| ModelError::UnknownTable(name.to_string()))
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.node_type(), self.table_name())
    }
}

impl Table {
    /// The table as a GeoPackage layer. `Basin / area` carries MultiPolygon
    /// geometries, all other tables are plain attribute tables.
    pub fn to_layer(&self, srs_id: i32) -> ModelResult<Layer> {
        let kind = self.kind();
        let mut layer = Layer::new(kind.layer_name()).with_column("node_id", ColumnKind::Integer);
        if let Table::BasinArea(rows) = self {
            layer = layer.with_geometry(GeometryType::MultiPolygon, srs_id);
            for (row, attributes) in rows.iter().zip(self.attribute_rows()?) {
                layer.push(Feature {
                    fid: None,
                    geometry: Some(Geometry::MultiPolygon(row.geometry.clone())),
                    attributes,
                });
            }
        } else {
            if kind.is_time() {
                layer.add_column("time", ColumnKind::DateTime);
            }
            for attributes in self.attribute_rows()? {
                layer.push(Feature {
                    fid: None,
                    geometry: None,
                    attributes,
                });
            }
        }
        layer.infer_columns();
        Ok(layer)
    }

    pub fn from_layer(kind: TableKind, layer: &Layer) -> ModelResult<Table> {
        let rows: Vec<BTreeMap<String, Value>> = layer
            .features
            .iter()
            .map(|feature| feature.attributes.clone())
            .collect();
        let mut table = Table::from_attribute_rows(kind, &rows)?;
        if let Table::BasinArea(areas) = &mut table {
            for (area, feature) in areas.iter_mut().zip(&layer.features) {
                area.geometry = match &feature.geometry {
                    Some(Geometry::MultiPolygon(mp)) => mp.clone(),
                    Some(Geometry::Polygon(p)) => MultiPolygon::new(vec![p.clone()]),
                    Some(_) => {
                        return Err(ModelError::InvalidRow {
                            table: kind.to_string(),
                            message: format!("node {} area is not a polygon", area.node_id),
                        });
                    }
                    None => empty_area(),
                };
            }
        }
        Ok(table)
    }
}
