use std::sync::Arc;

use config::shared::SortOrder;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::query::{ComparisonOp, Predicate, SelectBuilder, SelectStatement, SqlDialect};
use crate::schema::{FieldSpec, SchemaTree, TypeNode, UpdateRule};

/// Row limit of a page.
pub const PARAM_LIMIT: &str = "limit";
/// Root watermark: lower bound of the main fetch, upper bound of update passes.
pub const PARAM_LAST_REF_VALUE: &str = "last_ref_value";
/// Highest value of an update rule's field already present in the index.
pub const PARAM_LAST_UPDATE_REF_VALUE: &str = "last_upd_ref_value";
/// Root ids whose documents are re-fetched after an update pass.
pub const PARAM_ROOT_IDS: &str = "root_ids";

/// The statements of one channel, derived from a shared base over the whole tree.
#[derive(Debug, Clone)]
pub struct ChannelQueries {
    tree: Arc<SchemaTree>,
    dialect: SqlDialect,
    base: SelectBuilder,
    root_ref: FieldSpec,
}

impl ChannelQueries {
    /// Builds the base statement: every node's tables, fields, sort keys and filters, walked
    /// depth first from the root.
    pub fn new(tree: Arc<SchemaTree>, dialect: SqlDialect) -> EtlResult<ChannelQueries> {
        let Some(root_ref) = tree.root().ref_field().cloned() else {
            bail!(
                ErrorKind::SchemaDefinitionInvalid,
                "Root type must declare a reference field",
                tree.root().name()
            );
        };

        let mut base = SelectBuilder::new();
        for id in tree.depth_first() {
            let node = tree.node(id);

            for table in node.tables() {
                match &table.join {
                    Some(join) => base.join(
                        join.kind,
                        &table.name,
                        &table.alias,
                        &join.parent_columns,
                        &join.child_columns,
                    ),
                    None => base.from(&table.name, &table.alias),
                };
            }

            for field in node.fields() {
                base.select(&field.sql_expression, &field.alias);
            }

            for (field, order) in node.sort_fields() {
                base.order_by(&field.alias, order);
            }

            for filter in node.where_filters() {
                base.filter(Predicate::Raw(filter.clone()));
            }
        }

        Ok(ChannelQueries {
            tree,
            dialect,
            base,
            root_ref,
        })
    }

    pub fn tree(&self) -> &SchemaTree {
        &self.tree
    }

    pub fn dialect(&self) -> &SqlDialect {
        &self.dialect
    }

    /// Orders rows by root watermark, then root id, ahead of any declared sort keys, so the
    /// rows of one root are contiguous.
    fn order_by_root(&self, builder: &mut SelectBuilder) {
        builder
            .order_by_first(&self.tree.root().id_field().alias, SortOrder::Asc)
            .order_by_first(&self.root_ref.alias, SortOrder::Asc);
    }

    fn root_ref_filter(&self, op: ComparisonOp) -> Predicate {
        Predicate::Compare {
            expression: self.root_ref.sql_expression.clone(),
            alias: self.root_ref.alias.clone(),
            op,
            param: PARAM_LAST_REF_VALUE,
        }
    }

    /// Main incremental fetch. Without a watermark the whole source is read from the start.
    pub fn main(&self, with_ref_filter: bool) -> SelectStatement {
        let mut builder = self.base.clone();
        if with_ref_filter {
            builder.filter(self.root_ref_filter(ComparisonOp::Gte));
        }
        self.order_by_root(&mut builder);
        builder.build(&self.dialect)
    }

    /// Fetch of rows whose `rule` field moved past the last value seen in the index, limited
    /// to roots already at or below the root watermark.
    ///
    /// Without an update watermark every row with a non-null rule field matches.
    pub fn update(
        &self,
        node: &TypeNode,
        rule: &UpdateRule,
        has_update_watermark: bool,
    ) -> SelectStatement {
        let field = node.update_field(rule);
        let mut builder = self.base.clone();
        builder.filter(self.root_ref_filter(ComparisonOp::Lte));

        if has_update_watermark {
            builder.filter(Predicate::Compare {
                expression: field.sql_expression.clone(),
                alias: field.alias.clone(),
                op: ComparisonOp::Gt,
                param: PARAM_LAST_UPDATE_REF_VALUE,
            });
        } else {
            builder.filter(Predicate::NotNull {
                expression: field.sql_expression.clone(),
                alias: field.alias.clone(),
            });
        }

        for filter in &rule.where_filters {
            builder.filter(Predicate::Raw(filter.clone()));
        }

        builder.order_by_first(&field.alias, SortOrder::Asc);
        builder.build(&self.dialect)
    }

    /// Fetch of complete documents for a set of root ids, bounded by the root watermark.
    pub fn refetch(&self) -> SelectStatement {
        let root_id = self.tree.root().id_field();
        let mut builder = self.base.clone();
        builder
            .filter(self.root_ref_filter(ComparisonOp::Lte))
            .filter(Predicate::InList {
                expression: root_id.sql_expression.clone(),
                alias: root_id.alias.clone(),
                param: PARAM_ROOT_IDS,
            });
        self.order_by_root(&mut builder);
        builder.build(&self.dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::orders_schema;

    fn queries() -> ChannelQueries {
        let tree = SchemaTree::from_config(&orders_schema()).unwrap();
        ChannelQueries::new(Arc::new(tree), SqlDialect::default()).unwrap()
    }

    #[test]
    fn first_main_fetch_has_no_ref_filter() {
        let statement = queries().main(false);

        insta::assert_snapshot!(statement.sql, @r#"
        SELECT o.id AS "orders___orderId", o.placed_date AS "orders___placedDate", o.customer_name AS "orders___customerName", l.id AS "orders___lines___lineId", l.sku AS "orders___lines___sku", l.quantity AS "orders___lines___quantity", l.modified_date AS "orders___lines___modifiedDate"
          FROM orders AS o
             LEFT OUTER JOIN order_lines AS l ON o.id = l.order_id
          ORDER BY "orders___placedDate" ASC, "orders___orderId" ASC
          LIMIT :limit
        "#);
    }

    #[test]
    fn incremental_main_fetch_is_inclusive_of_the_watermark() {
        let statement = queries().main(true);

        assert!(statement
            .sql
            .contains("  WHERE o.placed_date >= :last_ref_value\n"));
        assert_eq!(
            statement.predicates,
            vec![Predicate::Compare {
                expression: "o.placed_date".to_string(),
                alias: "orders___placedDate".to_string(),
                op: ComparisonOp::Gte,
                param: PARAM_LAST_REF_VALUE,
            }]
        );
    }

    #[test]
    fn update_fetch_is_scoped_to_the_watermark() {
        let queries = queries();
        let tree = queries.tree();
        let lines = tree.node(tree.root().children()[0]);
        let rule = &lines.updates()[0];

        let first = queries.update(lines, rule, false);
        assert!(first.sql.contains(
            "  WHERE o.placed_date <= :last_ref_value\n     AND l.modified_date IS NOT NULL\n"
        ));
        assert!(first.sql.contains(
            "  ORDER BY \"orders___lines___modifiedDate\" ASC"
        ));

        let next = queries.update(lines, rule, true);
        assert!(next.sql.contains("AND l.modified_date > :last_upd_ref_value"));
    }

    #[test]
    fn refetch_selects_roots_by_id() {
        let statement = queries().refetch();

        assert!(statement.sql.contains(
            "  WHERE o.placed_date <= :last_ref_value\n     AND o.id IN (:root_ids)\n"
        ));
        assert_eq!(statement.order_by[0].alias, "orders___placedDate");
        assert_eq!(statement.order_by[1].alias, "orders___orderId");
    }
}
