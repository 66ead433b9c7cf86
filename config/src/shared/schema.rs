use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declarative document tree: a flat list of type nodes linked by dotted names.
///
/// The root node has a single-segment name (`orders`), children append one segment per level
/// (`orders.lines`, `orders.lines.taxes`). The last segment doubles as the field under which a
/// child is embedded in its parent document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchemaConfig {
    pub types: Vec<TypeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TypeConfig {
    pub name: String,
    /// How this node is embedded in its parent. Ignored on the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<Relation>,
    pub id_field: String,
    /// Monotonic field used as the incremental watermark. Only read on the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_field: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort_fields: Vec<SortFieldConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub where_filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableConfig>,
    pub fields: Vec<FieldConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<UpdateConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Embedded as a single object, first row wins.
    One,
    /// Embedded as a list of objects, unique by id.
    Many,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SortFieldConfig {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableConfig {
    pub name: String,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key_fields: Vec<String>,
    /// Present for every table joined onto an earlier one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JoinConfig {
    #[serde(default)]
    pub kind: JoinKind,
    pub parent_columns: Vec<String>,
    pub child_columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    #[default]
    LeftOuter,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FieldConfig {
    /// Document key of the field inside its node.
    pub name: String,
    /// Column or expression selected from the source.
    #[serde(alias = "sql")]
    pub sql_expression: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Index mapping directives for this field, e.g. `{"type": "keyword"}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Float,
    Double,
    Int,
    Long,
    Short,
    Bool,
    String,
    Date,
    #[serde(rename = "datetime", alias = "date_time")]
    DateTime,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Short => "short",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
        }
    }

    /// Whether the index stores values of this type as epoch milliseconds.
    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::DateTime)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An update-detection rule: a per-node field whose max value in the index is compared
/// against the source to find already-synced documents that changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UpdateConfig {
    pub name: String,
    pub ref_field: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub where_filters: Vec<String>,
}
