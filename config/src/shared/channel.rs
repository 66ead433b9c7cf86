use std::path::PathBuf;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::load::{LoadConfigError, load_schema_file};
use crate::shared::{SchemaConfig, ValidationError, parse_utc_offset};

/// One independent sync unit: a schema tree read from a datasource into one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelConfig {
    pub name: String,
    pub datasource: String,
    pub cluster: String,
    pub index: String,
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
    /// Rows per page of the main fetch. Values `<= 0` fall back to `batch.default_size`.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    /// Rows fetched per run before stopping. Values `<= 0` disable the cap.
    #[serde(default = "default_max_records")]
    pub max_records: i64,
    /// Fixed UTC offset the source stores naive timestamps in. Unset means UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_time_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<PathBuf>,
}

impl ChannelConfig {
    pub const DEFAULT_DOC_TYPE: &'static str = "_doc";
    pub const DEFAULT_MAX_RECORDS: i64 = 1_000_000;

    /// Returns the page size, falling back to `default_size` when unset.
    pub fn effective_batch_size(&self, default_size: usize) -> usize {
        match usize::try_from(self.batch_size) {
            Ok(size) if size > 0 => size,
            _ => default_size,
        }
    }

    /// Returns the per-run row cap, if any.
    pub fn record_cap(&self) -> Option<usize> {
        usize::try_from(self.max_records)
            .ok()
            .filter(|cap| *cap > 0)
    }

    pub fn time_zone(&self) -> Result<Option<FixedOffset>, ValidationError> {
        match &self.source_time_zone {
            None => Ok(None),
            Some(value) => parse_utc_offset(value).map(Some).ok_or_else(|| {
                ValidationError::InvalidTimeZone {
                    channel: self.name.clone(),
                    value: value.clone(),
                }
            }),
        }
    }

    /// Replaces a `schema_file` reference with the schema it points to.
    pub fn resolve_schema_file(&mut self) -> Result<(), LoadConfigError> {
        if let Some(path) = self.schema_file.take() {
            self.schema = Some(load_schema_file(&path)?);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("name", &self.name),
            ("index", &self.index),
            ("doc_type", &self.doc_type),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidFieldValue {
                    field: format!("channels.{}.{field}", self.name),
                    constraint: "must not be empty".to_string(),
                });
            }
        }

        if self.schema.is_some() == self.schema_file.is_some() {
            return Err(ValidationError::SchemaSource(self.name.clone()));
        }

        self.time_zone()?;

        if let Some(schema) = &self.schema {
            for table in schema.types.iter().flat_map(|t| &t.tables) {
                let Some(join) = &table.join else {
                    continue;
                };

                let reason = if join.parent_columns.is_empty() {
                    Some("no join columns")
                } else if join.parent_columns.len() != join.child_columns.len() {
                    Some("parent and child column counts differ")
                } else {
                    None
                };

                if let Some(reason) = reason {
                    return Err(ValidationError::InvalidJoin {
                        channel: self.name.clone(),
                        table: table.name.clone(),
                        reason: reason.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn default_doc_type() -> String {
    ChannelConfig::DEFAULT_DOC_TYPE.to_string()
}

fn default_batch_size() -> i64 {
    -1
}

fn default_max_records() -> i64 {
    ChannelConfig::DEFAULT_MAX_RECORDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{FieldConfig, FieldType, JoinConfig, JoinKind, TableConfig, TypeConfig};

    fn channel() -> ChannelConfig {
        ChannelConfig {
            name: "orders".to_string(),
            datasource: "erp".to_string(),
            cluster: "main".to_string(),
            index: "orders".to_string(),
            doc_type: default_doc_type(),
            batch_size: default_batch_size(),
            max_records: default_max_records(),
            source_time_zone: None,
            schema: Some(SchemaConfig {
                types: vec![TypeConfig {
                    name: "orders".to_string(),
                    relation: None,
                    id_field: "orderId".to_string(),
                    ref_field: None,
                    sort_fields: vec![],
                    where_filters: vec![],
                    tables: vec![TableConfig {
                        name: "orders".to_string(),
                        alias: "o".to_string(),
                        primary_key_fields: vec![],
                        join: None,
                    }],
                    fields: vec![FieldConfig {
                        name: "orderId".to_string(),
                        sql_expression: "o.id".to_string(),
                        field_type: FieldType::Long,
                        mappings: None,
                    }],
                    updates: vec![],
                }],
            }),
            schema_file: None,
        }
    }

    #[test]
    fn batch_size_falls_back_to_default() {
        let mut config = channel();
        assert_eq!(config.effective_batch_size(500), 500);
        config.batch_size = 20;
        assert_eq!(config.effective_batch_size(500), 20);
    }

    #[test]
    fn non_positive_max_records_disables_cap() {
        let mut config = channel();
        assert_eq!(config.record_cap(), Some(1_000_000));
        config.max_records = 0;
        assert_eq!(config.record_cap(), None);
    }

    #[test]
    fn schema_and_schema_file_are_exclusive() {
        let mut config = channel();
        config.schema_file = Some(PathBuf::from("orders.yaml"));
        assert!(matches!(
            config.validate(),
            Err(ValidationError::SchemaSource(_))
        ));

        config.schema = None;
        assert!(config.validate().is_ok());

        config.schema_file = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_time_zone_is_rejected() {
        let mut config = channel();
        config.source_time_zone = Some("Mars/Olympus".to_string());
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidTimeZone { .. })
        ));
    }

    #[test]
    fn mismatched_join_columns_are_rejected() {
        let mut config = channel();
        let schema = config.schema.as_mut().unwrap();
        schema.types[0].tables.push(TableConfig {
            name: "customers".to_string(),
            alias: "c".to_string(),
            primary_key_fields: vec![],
            join: Some(JoinConfig {
                kind: JoinKind::Inner,
                parent_columns: vec!["o.customer_id".to_string(), "o.region".to_string()],
                child_columns: vec!["c.id".to_string()],
            }),
        });

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidJoin { .. })
        ));
    }
}
