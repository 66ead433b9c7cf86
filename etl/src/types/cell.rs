use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Format used when a naive timestamp has to be rendered as text.
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Format of a calendar date in the index.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single typed scalar, either read from a source column or headed for a document field.
///
/// [`Cell::Timestamp`] only lives on the source side: the conversion layer turns it into
/// [`Cell::TimestampTz`] before it reaches a document, and back before it is bound as a
/// query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Renders the cell as a document key, `None` for null.
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Bool(value) => Some(value.to_string()),
            Cell::I16(value) => Some(value.to_string()),
            Cell::I32(value) => Some(value.to_string()),
            Cell::I64(value) => Some(value.to_string()),
            Cell::F32(value) => Some(value.to_string()),
            Cell::F64(value) => Some(value.to_string()),
            Cell::String(value) => Some(value.clone()),
            Cell::Date(value) => Some(value.format(DATE_FORMAT).to_string()),
            Cell::Timestamp(value) => Some(value.format(NAIVE_TIMESTAMP_FORMAT).to_string()),
            Cell::TimestampTz(value) => Some(value.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    /// Whether this value marks an absent child row.
    ///
    /// Outer joins produce null ids for missing children and some schemas use a zero id for
    /// the same purpose.
    pub fn is_absent_id(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::I16(value) => *value == 0,
            Cell::I32(value) => *value == 0,
            Cell::I64(value) => *value == 0,
            Cell::String(value) => value == "0",
            _ => false,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::I16(value) => Some(f64::from(*value)),
            Cell::I32(value) => Some(f64::from(*value)),
            Cell::I64(value) => Some(*value as f64),
            Cell::F32(value) => Some(f64::from(*value)),
            Cell::F64(value) => Some(*value),
            _ => None,
        }
    }
}

impl PartialOrd for Cell {
    /// Orders values of the same kind. Numeric kinds compare across widths; anything else,
    /// including null, is unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Cell::Bool(a), Cell::Bool(b)) => a.partial_cmp(b),
            (Cell::I16(a), Cell::I16(b)) => a.partial_cmp(b),
            (Cell::I32(a), Cell::I32(b)) => a.partial_cmp(b),
            (Cell::I64(a), Cell::I64(b)) => a.partial_cmp(b),
            (Cell::String(a), Cell::String(b)) => a.partial_cmp(b),
            (Cell::Date(a), Cell::Date(b)) => a.partial_cmp(b),
            (Cell::Timestamp(a), Cell::Timestamp(b)) => a.partial_cmp(b),
            (Cell::TimestampTz(a), Cell::TimestampTz(b)) => a.partial_cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::Bool(value) => serializer.serialize_bool(*value),
            Cell::I16(value) => serializer.serialize_i16(*value),
            Cell::I32(value) => serializer.serialize_i32(*value),
            Cell::I64(value) => serializer.serialize_i64(*value),
            Cell::F32(value) if value.is_finite() => serializer.serialize_f32(*value),
            Cell::F64(value) if value.is_finite() => serializer.serialize_f64(*value),
            Cell::F32(_) | Cell::F64(_) => serializer.serialize_none(),
            Cell::String(value) => serializer.serialize_str(value),
            Cell::Date(_) | Cell::Timestamp(_) | Cell::TimestampTz(_) => {
                match self.to_key_string() {
                    Some(rendered) => serializer.serialize_str(&rendered),
                    None => serializer.serialize_none(),
                }
            }
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_key_string() {
            Some(rendered) => f.write_str(&rendered),
            None => f.write_str("null"),
        }
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::I64(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::I32(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::String(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::F64(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(value: NaiveDateTime) -> Self {
        Cell::Timestamp(value)
    }
}

impl From<DateTime<Utc>> for Cell {
    fn from(value: DateTime<Utc>) -> Self {
        Cell::TimestampTz(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Null, Into::into)
    }
}
