use config::shared::SqlDialectConfig;

use crate::query::{FromItem, SelectBuilder};

const NEWLINE: &str = "\n";
const INDENT: &str = "     ";
const COMMA: &str = ", ";

/// Renders [`SelectBuilder`]s into SQL text using a datasource's clause templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlDialect {
    templates: SqlDialectConfig,
}

impl SqlDialect {
    pub fn new(templates: SqlDialectConfig) -> Self {
        Self { templates }
    }

    pub fn quote_alias(&self, alias: &str) -> String {
        self.templates.quoted_alias.replace("${alias}", alias)
    }

    fn table(&self, name: &str, alias: &str) -> String {
        self.templates
            .table
            .replace("${table_name}", name)
            .replace("${alias}", alias)
    }

    pub fn render(&self, builder: &SelectBuilder) -> String {
        let select_list = builder
            .select_items()
            .iter()
            .map(|item| format!("{} AS {}", item.expression, self.quote_alias(&item.alias)))
            .collect::<Vec<_>>()
            .join(COMMA);

        let mut sections = vec![self.templates.select.replace("${select_list}", &select_list)];

        if !builder.from_items().is_empty() {
            let mut from_list = String::new();
            for item in builder.from_items() {
                match item {
                    FromItem::Table { name, alias } => {
                        if !from_list.is_empty() {
                            from_list.push_str(COMMA);
                        }
                        from_list.push_str(&self.table(name, alias));
                    }
                    FromItem::Join {
                        kind,
                        name,
                        alias,
                        on,
                    } => {
                        let conditions = on
                            .iter()
                            .map(|(parent, child)| format!("{parent} = {child}"))
                            .collect::<Vec<_>>()
                            .join(" AND ");
                        from_list.push_str(NEWLINE);
                        from_list.push_str(INDENT);
                        from_list.push_str(&format!(
                            "{} {} ON {conditions}",
                            kind.as_sql(),
                            self.table(name, alias)
                        ));
                    }
                }
            }
            sections.push(self.templates.from.replace("${from_list}", &from_list));
        }

        if !builder.predicates().is_empty() {
            let separator = format!("{NEWLINE}{INDENT}AND ");
            let where_list = builder
                .predicates()
                .iter()
                .map(|predicate| predicate.to_sql())
                .collect::<Vec<_>>()
                .join(&separator);
            sections.push(
                self.templates
                    .where_clause
                    .replace("${where_list}", &where_list),
            );
        }

        if !builder.order_by_items().is_empty() {
            let order_by_list = builder
                .order_by_items()
                .iter()
                .map(|order| format!("{} {}", self.quote_alias(&order.alias), order.order.as_sql()))
                .collect::<Vec<_>>()
                .join(COMMA);
            sections.push(
                self.templates
                    .order_by
                    .replace("${order_by_list}", &order_by_list),
            );
        }

        if !self.templates.limit.trim().is_empty() {
            sections.push(self.templates.limit.clone());
        }

        sections.join(NEWLINE)
    }
}

#[cfg(test)]
mod tests {
    use config::shared::{JoinKind, SortOrder};

    use super::*;
    use crate::query::Predicate;

    fn builder() -> SelectBuilder {
        let mut builder = SelectBuilder::new();
        builder
            .select("o.id", "orders___orderId")
            .select("l.id", "orders___lines___lineId")
            .from("orders", "o")
            .join(
                JoinKind::LeftOuter,
                "order_lines",
                "l",
                &["o.id".to_string(), "o.region".to_string()],
                &["l.order_id".to_string(), "l.region".to_string()],
            )
            .filter(Predicate::Raw("o.deleted = false".to_string()))
            .order_by("orders___orderId", SortOrder::Asc);
        builder
    }

    #[test]
    fn default_dialect_renders_postgres() {
        let sql = SqlDialect::default().render(&builder());

        assert_eq!(
            sql,
            [
                "SELECT o.id AS \"orders___orderId\", l.id AS \"orders___lines___lineId\"",
                "  FROM orders AS o",
                "     LEFT OUTER JOIN order_lines AS l ON o.id = l.order_id AND o.region = l.region",
                "  WHERE (o.deleted = false)",
                "  ORDER BY \"orders___orderId\" ASC",
                "  LIMIT :limit",
            ]
            .join("\n")
        );
    }

    #[test]
    fn top_style_dialect_omits_limit_clause() {
        let dialect = SqlDialect::new(SqlDialectConfig {
            select: "SELECT TOP :limit ${select_list}".to_string(),
            limit: String::new(),
            table: "${table_name} ${alias}".to_string(),
            quoted_alias: "[${alias}]".to_string(),
            ..SqlDialectConfig::default()
        });

        let mut builder = SelectBuilder::new();
        builder.select("o.id", "orders___orderId").from("dbo.orders", "o");

        assert_eq!(
            dialect.render(&builder),
            "SELECT TOP :limit o.id AS [orders___orderId]\n  FROM dbo.orders o"
        );
    }
}
