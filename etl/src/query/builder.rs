use config::shared::{JoinKind, SortOrder};

use crate::query::SqlDialect;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectItem {
    pub expression: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FromItem {
    Table {
        name: String,
        alias: String,
    },
    Join {
        kind: JoinKind,
        name: String,
        alias: String,
        /// `(parent column, child column)` pairs, ANDed together.
        on: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Gt,
    Gte,
    Lte,
}

impl ComparisonOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lte => "<=",
        }
    }
}

/// A WHERE condition.
///
/// Structured variants keep the select alias of the column they test, so sources that do not
/// execute SQL text can still evaluate them against a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Free-form SQL supplied by the schema.
    Raw(String),
    /// `expression <op> :param`
    Compare {
        expression: String,
        alias: String,
        op: ComparisonOp,
        param: &'static str,
    },
    /// `expression IS NOT NULL`
    NotNull { expression: String, alias: String },
    /// `expression IN (:param)` over a list parameter.
    InList {
        expression: String,
        alias: String,
        param: &'static str,
    },
}

impl Predicate {
    pub fn to_sql(&self) -> String {
        match self {
            Predicate::Raw(sql) => format!("({sql})"),
            Predicate::Compare {
                expression,
                op,
                param,
                ..
            } => format!("{expression} {} :{param}", op.as_sql()),
            Predicate::NotNull { expression, .. } => format!("{expression} IS NOT NULL"),
            Predicate::InList {
                expression, param, ..
            } => format!("{expression} IN (:{param})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub alias: String,
    pub order: SortOrder,
}

/// Accumulates the parts of a SELECT statement.
///
/// Cloning a builder is how statement variants are derived from a shared base.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectBuilder {
    select_items: Vec<SelectItem>,
    from_items: Vec<FromItem>,
    predicates: Vec<Predicate>,
    order_by: Vec<OrderBy>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, expression: impl Into<String>, alias: impl Into<String>) -> &mut Self {
        self.select_items.push(SelectItem {
            expression: expression.into(),
            alias: alias.into(),
        });
        self
    }

    pub fn from(&mut self, name: impl Into<String>, alias: impl Into<String>) -> &mut Self {
        self.from_items.push(FromItem::Table {
            name: name.into(),
            alias: alias.into(),
        });
        self
    }

    pub fn join(
        &mut self,
        kind: JoinKind,
        name: impl Into<String>,
        alias: impl Into<String>,
        parent_columns: &[String],
        child_columns: &[String],
    ) -> &mut Self {
        self.from_items.push(FromItem::Join {
            kind,
            name: name.into(),
            alias: alias.into(),
            on: parent_columns
                .iter()
                .cloned()
                .zip(child_columns.iter().cloned())
                .collect(),
        });
        self
    }

    pub fn filter(&mut self, predicate: Predicate) -> &mut Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(&mut self, alias: impl Into<String>, order: SortOrder) -> &mut Self {
        self.order_by.push(OrderBy {
            alias: alias.into(),
            order,
        });
        self
    }

    /// Puts a sort key ahead of every key added so far.
    pub fn order_by_first(&mut self, alias: impl Into<String>, order: SortOrder) -> &mut Self {
        self.order_by.insert(
            0,
            OrderBy {
                alias: alias.into(),
                order,
            },
        );
        self
    }

    pub fn select_items(&self) -> &[SelectItem] {
        &self.select_items
    }

    pub fn from_items(&self) -> &[FromItem] {
        &self.from_items
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn order_by_items(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Renders the statement with `dialect`, keeping the structured parts alongside the text.
    pub fn build(&self, dialect: &SqlDialect) -> SelectStatement {
        SelectStatement {
            sql: dialect.render(self),
            predicates: self.predicates.clone(),
            order_by: self.order_by.clone(),
        }
    }
}

/// A rendered SELECT with named `:param` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatement {
    pub sql: String,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<OrderBy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_by_first_takes_precedence() {
        let mut builder = SelectBuilder::new();
        builder
            .order_by("b", SortOrder::Desc)
            .order_by_first("a", SortOrder::Asc);

        let aliases: Vec<_> = builder
            .order_by_items()
            .iter()
            .map(|o| o.alias.as_str())
            .collect();
        assert_eq!(aliases, vec!["a", "b"]);
    }

    #[test]
    fn clones_diverge_independently() {
        let mut base = SelectBuilder::new();
        base.select("o.id", "orders___orderId").from("orders", "o");

        let mut derived = base.clone();
        derived.filter(Predicate::Raw("o.deleted = false".to_string()));

        assert!(base.predicates().is_empty());
        assert_eq!(derived.predicates().len(), 1);
        assert_eq!(derived.select_items(), base.select_items());
    }

    #[test]
    fn predicates_render_with_named_parameters() {
        let compare = Predicate::Compare {
            expression: "o.placed".to_string(),
            alias: "orders___placed".to_string(),
            op: ComparisonOp::Gte,
            param: "last_ref_value",
        };
        let in_list = Predicate::InList {
            expression: "o.id".to_string(),
            alias: "orders___orderId".to_string(),
            param: "root_ids",
        };

        assert_eq!(compare.to_sql(), "o.placed >= :last_ref_value");
        assert_eq!(in_list.to_sql(), "o.id IN (:root_ids)");
        assert_eq!(
            Predicate::Raw("a = 1 OR b = 2".to_string()).to_sql(),
            "(a = 1 OR b = 2)"
        );
    }
}
