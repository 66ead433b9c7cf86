use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde_json::Value;

use crate::bail;
use crate::conversions::time::{from_epoch_millis, localize, to_source_local};
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, DATE_FORMAT, FieldType};

/// Coerces a decoded source value into the declared field type of its document field.
///
/// Integer widths are narrowed with range checks, naive timestamps are localized with
/// `time_zone`, and any scalar can be rendered into a string field.
pub fn to_index_cell(
    cell: Cell,
    field_type: FieldType,
    time_zone: Option<FixedOffset>,
) -> EtlResult<Cell> {
    let converted = match (field_type, cell) {
        (_, Cell::Null) => Cell::Null,

        (FieldType::Float, Cell::F32(v)) => Cell::F32(v),
        (FieldType::Float, Cell::F64(v)) => Cell::F32(v as f32),
        (FieldType::Float, Cell::I16(v)) => Cell::F32(f32::from(v)),
        (FieldType::Float, Cell::I32(v)) => Cell::F32(v as f32),
        (FieldType::Float, Cell::I64(v)) => Cell::F32(v as f32),

        (FieldType::Double, Cell::F64(v)) => Cell::F64(v),
        (FieldType::Double, Cell::F32(v)) => Cell::F64(f64::from(v)),
        (FieldType::Double, Cell::I16(v)) => Cell::F64(f64::from(v)),
        (FieldType::Double, Cell::I32(v)) => Cell::F64(f64::from(v)),
        (FieldType::Double, Cell::I64(v)) => Cell::F64(v as f64),

        (FieldType::Short, Cell::I16(v)) => Cell::I16(v),
        (FieldType::Short, Cell::I32(v)) => Cell::I16(i16::try_from(v)?),
        (FieldType::Short, Cell::I64(v)) => Cell::I16(i16::try_from(v)?),

        (FieldType::Int, Cell::I32(v)) => Cell::I32(v),
        (FieldType::Int, Cell::I16(v)) => Cell::I32(i32::from(v)),
        (FieldType::Int, Cell::I64(v)) => Cell::I32(i32::try_from(v)?),

        (FieldType::Long, Cell::I64(v)) => Cell::I64(v),
        (FieldType::Long, Cell::I16(v)) => Cell::I64(i64::from(v)),
        (FieldType::Long, Cell::I32(v)) => Cell::I64(i64::from(v)),

        (FieldType::Bool, Cell::Bool(v)) => Cell::Bool(v),
        (FieldType::Bool, Cell::I16(v)) => Cell::Bool(v != 0),
        (FieldType::Bool, Cell::I32(v)) => Cell::Bool(v != 0),
        (FieldType::Bool, Cell::I64(v)) => Cell::Bool(v != 0),

        (FieldType::String, Cell::String(v)) => Cell::String(v),
        (FieldType::String, other) => Cell::from(other.to_key_string()),

        (FieldType::Date, Cell::Date(v)) => Cell::Date(v),
        (FieldType::Date, Cell::Timestamp(v)) => Cell::Date(v.date()),
        (FieldType::Date, Cell::TimestampTz(v)) => Cell::Date(v.date_naive()),

        (FieldType::DateTime, Cell::TimestampTz(v)) => Cell::TimestampTz(v),
        (FieldType::DateTime, Cell::Timestamp(v)) => Cell::TimestampTz(localize(v, time_zone)),
        (FieldType::DateTime, Cell::Date(v)) => match v.and_hms_opt(0, 0, 0) {
            Some(midnight) => Cell::TimestampTz(localize(midnight, time_zone)),
            None => bail!(ErrorKind::ConversionError, "Date has no midnight", v),
        },

        (field_type, other) => bail!(
            ErrorKind::ConversionError,
            "Source value does not match the declared field type",
            format!("expected {field_type}, got {other:?}")
        ),
    };

    Ok(converted)
}

/// Prepares a watermark value to be bound as a parameter of a source query.
///
/// Instants go back to the naive wall-clock form the source stores.
pub fn to_source_param(
    cell: &Cell,
    field_type: FieldType,
    time_zone: Option<FixedOffset>,
) -> Cell {
    match (field_type, cell) {
        (FieldType::DateTime, Cell::TimestampTz(instant)) => {
            Cell::Timestamp(to_source_local(*instant, time_zone))
        }
        (_, other) => other.clone(),
    }
}

/// Recovers a typed value from its JSON form, as stored in checkpoints and index documents.
///
/// Temporal fields accept both their string rendering and epoch milliseconds.
pub fn cell_from_json(value: &Value, field_type: FieldType) -> EtlResult<Cell> {
    let cell = match (field_type, value) {
        (_, Value::Null) => Cell::Null,

        (FieldType::Float, Value::Number(n)) => Cell::F32(number_as_f64(n)? as f32),
        (FieldType::Double, Value::Number(n)) => Cell::F64(number_as_f64(n)?),
        (FieldType::Short, Value::Number(n)) => Cell::I16(i16::try_from(number_as_i64(n)?)?),
        (FieldType::Int, Value::Number(n)) => Cell::I32(i32::try_from(number_as_i64(n)?)?),
        (FieldType::Long, Value::Number(n)) => Cell::I64(number_as_i64(n)?),
        (FieldType::Bool, Value::Bool(b)) => Cell::Bool(*b),
        (FieldType::String, Value::String(s)) => Cell::String(s.clone()),

        (FieldType::Date, Value::String(s)) => Cell::Date(NaiveDate::parse_from_str(s, DATE_FORMAT)?),
        (FieldType::Date, Value::Number(n)) => {
            Cell::Date(from_epoch_millis(number_as_f64(n)?)?.date_naive())
        }
        (FieldType::DateTime, Value::String(s)) => {
            Cell::TimestampTz(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
        }
        (FieldType::DateTime, Value::Number(n)) => {
            Cell::TimestampTz(from_epoch_millis(number_as_f64(n)?)?)
        }

        (field_type, other) => bail!(
            ErrorKind::ConversionError,
            "Stored value does not match the declared field type",
            format!("expected {field_type}, got {other}")
        ),
    };

    Ok(cell)
}

fn number_as_f64(n: &serde_json::Number) -> EtlResult<f64> {
    match n.as_f64() {
        Some(v) => Ok(v),
        None => bail!(ErrorKind::ConversionError, "Number is not representable", n),
    }
}

fn number_as_i64(n: &serde_json::Number) -> EtlResult<i64> {
    if let Some(v) = n.as_i64() {
        return Ok(v);
    }

    match n.as_f64() {
        Some(v) if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 => {
            Ok(v as i64)
        }
        _ => bail!(ErrorKind::ConversionError, "Number is not an integer", n),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDateTime, TimeZone};
    use serde_json::json;

    use super::*;

    fn plus_two() -> Option<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
    }

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn naive_timestamps_are_localized() {
        let cell = to_index_cell(
            Cell::Timestamp(naive("2024-01-15 09:00:00")),
            FieldType::DateTime,
            plus_two(),
        )
        .unwrap();

        assert_eq!(
            cell,
            Cell::TimestampTz(Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap())
        );
    }

    #[test]
    fn watermark_round_trips_through_source_param() {
        let source = Cell::Timestamp(naive("2024-01-15 09:00:00"));
        let indexed = to_index_cell(source.clone(), FieldType::DateTime, plus_two()).unwrap();

        assert_eq!(
            to_source_param(&indexed, FieldType::DateTime, plus_two()),
            source
        );
    }

    #[test]
    fn integers_are_narrowed_with_range_checks() {
        assert_eq!(
            to_index_cell(Cell::I64(12), FieldType::Int, None).unwrap(),
            Cell::I32(12)
        );

        let err = to_index_cell(Cell::I64(i64::MAX), FieldType::Int, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }

    #[test]
    fn scalars_render_into_string_fields() {
        assert_eq!(
            to_index_cell(Cell::I64(42), FieldType::String, None).unwrap(),
            Cell::String("42".to_string())
        );
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let err = to_index_cell(Cell::from("yes"), FieldType::Bool, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }

    #[test]
    fn nulls_pass_through_every_type() {
        for field_type in [FieldType::DateTime, FieldType::Long, FieldType::String] {
            assert_eq!(
                to_index_cell(Cell::Null, field_type, None).unwrap(),
                Cell::Null
            );
        }
    }

    #[test]
    fn json_values_recover_their_field_type() {
        assert_eq!(
            cell_from_json(&json!("2024-01-15T07:00:00.000Z"), FieldType::DateTime).unwrap(),
            Cell::TimestampTz(Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap())
        );
        assert_eq!(
            cell_from_json(&json!(1_705_302_000_000i64), FieldType::DateTime).unwrap(),
            Cell::TimestampTz(Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap())
        );
        assert_eq!(
            cell_from_json(&json!(17), FieldType::Short).unwrap(),
            Cell::I16(17)
        );
        assert_eq!(
            cell_from_json(&json!("2024-01-15"), FieldType::Date).unwrap(),
            Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert!(cell_from_json(&json!("abc"), FieldType::Long).is_err());
    }
}
