use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversions::cell_from_json;
use crate::error::EtlResult;
use crate::schema::FieldSpec;
use crate::types::Cell;

/// Progress of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub channel_name: String,
    pub last_execution_date: DateTime<Utc>,
    /// Root watermark keyed by the name of the root's reference field.
    #[serde(default)]
    pub last_reference: BTreeMap<String, Value>,
    /// Channel configuration the checkpoint was written with.
    #[serde(default)]
    pub channel_def: Value,
}

impl Checkpoint {
    pub fn new(channel_name: impl Into<String>, channel_def: Value) -> Self {
        Self {
            channel_name: channel_name.into(),
            last_execution_date: Utc::now(),
            last_reference: BTreeMap::new(),
            channel_def,
        }
    }

    /// Returns the stored watermark for `field`, `None` when absent or null.
    pub fn reference(&self, field: &FieldSpec) -> EtlResult<Option<Cell>> {
        let Some(value) = self.last_reference.get(&field.name) else {
            return Ok(None);
        };

        let cell = cell_from_json(value, field.field_type)?;
        Ok((!cell.is_null()).then_some(cell))
    }

    /// Moves the watermark for `field` to `value` unless the stored one is already larger.
    ///
    /// Returns whether the stored watermark changed. The execution date is refreshed either way.
    pub fn advance(&mut self, field: &FieldSpec, value: &Cell, at: DateTime<Utc>) -> EtlResult<bool> {
        self.last_execution_date = at;
        if value.is_null() {
            return Ok(false);
        }

        let advances = match self.reference(field)? {
            None => true,
            Some(current) => value.partial_cmp(&current) == Some(Ordering::Greater),
        };

        if advances {
            self.last_reference
                .insert(field.name.clone(), serde_json::to_value(value)?);
        }

        Ok(advances)
    }

    /// Whether the configuration snapshot differs from `current`.
    ///
    /// Checkpoints without a snapshot never report drift.
    pub fn has_drifted(&self, current: &Value) -> bool {
        !self.channel_def.is_null() && &self.channel_def != current
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use config::shared::FieldType;
    use serde_json::json;

    use super::*;

    fn placed_date() -> FieldSpec {
        FieldSpec {
            name: "placedDate".to_string(),
            sql_expression: "o.placed_date".to_string(),
            field_type: FieldType::DateTime,
            mappings: None,
            alias: "orders___placedDate".to_string(),
            path: "placedDate".to_string(),
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 8, 0, 0).unwrap()
    }

    #[test]
    fn watermark_never_regresses() {
        let field = placed_date();
        let mut checkpoint = Checkpoint::new("orders", Value::Null);

        assert!(checkpoint.advance(&field, &Cell::from(at(5)), at(10)).unwrap());
        assert!(!checkpoint.advance(&field, &Cell::from(at(4)), at(11)).unwrap());
        assert!(!checkpoint.advance(&field, &Cell::Null, at(12)).unwrap());

        assert_eq!(checkpoint.reference(&field).unwrap(), Some(Cell::from(at(5))));
        assert_eq!(checkpoint.last_execution_date, at(12));
    }

    #[test]
    fn serialized_layout_uses_camel_case_keys() {
        let field = placed_date();
        let mut checkpoint = Checkpoint::new("orders", json!({"name": "orders"}));
        checkpoint.advance(&field, &Cell::from(at(5)), at(6)).unwrap();

        let value = serde_json::to_value(&checkpoint).unwrap();

        assert_eq!(value["channelName"], "orders");
        assert_eq!(value["lastReference"]["placedDate"], "2024-03-05T08:00:00.000Z");
        assert_eq!(value["channelDef"]["name"], "orders");
        assert!(value["lastExecutionDate"].is_string());

        let restored: Checkpoint = serde_json::from_value(value).unwrap();
        assert_eq!(restored, checkpoint);
    }

    #[test]
    fn drift_compares_configuration_snapshots() {
        let checkpoint = Checkpoint::new("orders", json!({"batch_size": 10}));

        assert!(!checkpoint.has_drifted(&json!({"batch_size": 10})));
        assert!(checkpoint.has_drifted(&json!({"batch_size": 20})));
        assert!(!Checkpoint::new("orders", Value::Null).has_drifted(&json!({})));
    }
}
