use crate::bail;
use crate::conversions::time::from_epoch_millis;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, FieldType};

/// Result of a max aggregation as reported by the index.
///
/// Numeric and temporal fields report a double (temporal ones as epoch milliseconds); the
/// index may add a formatted rendering, which is the only usable form for string fields.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateValue {
    pub value: f64,
    pub value_as_string: Option<String>,
}

impl AggregateValue {
    pub fn numeric(value: f64) -> Self {
        Self {
            value,
            value_as_string: None,
        }
    }
}

/// Recovers a typed watermark from a max aggregate over a field of type `field_type`.
///
/// Long values above 2^53 lose precision in the double the index reports.
pub fn cell_from_aggregate(aggregate: &AggregateValue, field_type: FieldType) -> EtlResult<Cell> {
    let value = aggregate.value;
    let cell = match field_type {
        FieldType::Date => Cell::Date(from_epoch_millis(value)?.date_naive()),
        FieldType::DateTime => Cell::TimestampTz(from_epoch_millis(value)?),
        FieldType::Float => Cell::F32(value as f32),
        FieldType::Double => Cell::F64(value),
        FieldType::Short => Cell::I16(i16::try_from(integral(value)?)?),
        FieldType::Int => Cell::I32(i32::try_from(integral(value)?)?),
        FieldType::Long => Cell::I64(integral(value)?),
        FieldType::Bool => Cell::Bool(value != 0.0),
        FieldType::String => match &aggregate.value_as_string {
            Some(rendered) => Cell::String(rendered.clone()),
            None => bail!(
                ErrorKind::ConversionError,
                "Max aggregate over a string field has no string value"
            ),
        },
    };

    Ok(cell)
}

fn integral(value: f64) -> EtlResult<i64> {
    if !value.is_finite() || value < i64::MIN as f64 || value > i64::MAX as f64 {
        bail!(
            ErrorKind::ConversionError,
            "Aggregate value is not a representable integer",
            value
        );
    }

    Ok(value.round() as i64)
}
