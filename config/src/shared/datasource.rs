use serde::{Deserialize, Serialize};

use crate::shared::{PgConnectionConfig, ValidationError};

/// A named relational source and the SQL dialect used to talk to it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatasourceConfig {
    pub connection: PgConnectionConfig,
    #[serde(default)]
    pub dialect: SqlDialectConfig,
}

impl DatasourceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection.validate()?;
        self.dialect.validate()
    }
}

/// Clause templates used to render generated SELECT statements.
///
/// Placeholders are `${select_list}`, `${from_list}`, `${where_list}`, `${order_by_list}`,
/// `${table_name}` and `${alias}`. `quoted_alias` renders a select-list alias wherever it is
/// referenced, so mixed-case aliases survive identifier folding. The row limit is always bound through the `:limit`
/// parameter, either in `select` (e.g. `SELECT TOP :limit ${select_list}`) or in `limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SqlDialectConfig {
    pub select: String,
    pub from: String,
    #[serde(rename = "where")]
    pub where_clause: String,
    pub order_by: String,
    pub limit: String,
    pub table: String,
    pub quoted_alias: String,
}

impl SqlDialectConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("dialect.select", &self.select, "${select_list}"),
            ("dialect.from", &self.from, "${from_list}"),
            ("dialect.where", &self.where_clause, "${where_list}"),
            ("dialect.order_by", &self.order_by, "${order_by_list}"),
            ("dialect.table", &self.table, "${table_name}"),
            ("dialect.quoted_alias", &self.quoted_alias, "${alias}"),
        ];

        for (field, template, placeholder) in required {
            if !template.contains(placeholder) {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: format!("must contain `{placeholder}`"),
                });
            }
        }

        if !self.select.contains(":limit") && !self.limit.contains(":limit") {
            return Err(ValidationError::InvalidFieldValue {
                field: "dialect.limit".to_string(),
                constraint: "either `select` or `limit` must bind `:limit`".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for SqlDialectConfig {
    fn default() -> Self {
        Self {
            select: "SELECT ${select_list}".to_string(),
            from: "  FROM ${from_list}".to_string(),
            where_clause: "  WHERE ${where_list}".to_string(),
            order_by: "  ORDER BY ${order_by_list}".to_string(),
            limit: "  LIMIT :limit".to_string(),
            table: "${table_name} AS ${alias}".to_string(),
            quoted_alias: "\"${alias}\"".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dialect_is_valid() {
        assert!(SqlDialectConfig::default().validate().is_ok());
    }

    #[test]
    fn top_style_dialect_without_limit_clause_is_valid() {
        let dialect = SqlDialectConfig {
            select: "SELECT TOP :limit ${select_list}".to_string(),
            limit: String::new(),
            ..SqlDialectConfig::default()
        };
        assert!(dialect.validate().is_ok());
    }

    #[test]
    fn dialect_without_limit_binding_is_rejected() {
        let dialect = SqlDialectConfig {
            limit: String::new(),
            ..SqlDialectConfig::default()
        };
        assert!(dialect.validate().is_err());
    }
}
