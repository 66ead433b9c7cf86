use std::cmp::Ordering;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::query::{ComparisonOp, PARAM_LIMIT, Predicate, QueryParams, SelectStatement};
use crate::source::RelationalSource;
use crate::types::{Cell, SourceRow};

/// A statement as it was executed against a [`MemorySource`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    pub statement: SelectStatement,
    pub params: QueryParams,
    pub returned_rows: usize,
}

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<SourceRow>,
    executed: Vec<ExecutedQuery>,
}

/// In-memory source over rows that are already joined.
///
/// [`MemorySource`] evaluates the structured predicates, sort keys and limit of a statement
/// against its rows. Free-form SQL filters cannot be evaluated and are ignored.
///
/// Comparisons follow SQL semantics: a null value never satisfies a comparison, and nulls sort
/// after every other value in ascending order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<SourceRow>) -> Self {
        let inner = Inner {
            rows,
            executed: Vec::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub async fn insert_rows(&self, rows: impl IntoIterator<Item = SourceRow>) {
        let mut inner = self.inner.lock().await;
        inner.rows.extend(rows);
    }

    /// Applies `update` to every row and returns how many rows it changed.
    pub async fn update_rows<F>(&self, mut update: F) -> usize
    where
        F: FnMut(&mut SourceRow) -> bool,
    {
        let mut inner = self.inner.lock().await;
        inner
            .rows
            .iter_mut()
            .map(|row| update(row))
            .filter(|changed| *changed)
            .count()
    }

    pub async fn rows(&self) -> Vec<SourceRow> {
        let inner = self.inner.lock().await;
        inner.rows.clone()
    }

    /// Returns every statement executed so far, oldest first.
    pub async fn executed(&self) -> Vec<ExecutedQuery> {
        let inner = self.inner.lock().await;
        inner.executed.clone()
    }

    pub async fn clear_executed(&self) {
        let mut inner = self.inner.lock().await;
        inner.executed.clear();
    }
}

impl RelationalSource for MemorySource {
    fn name() -> &'static str {
        "memory"
    }

    async fn execute(
        &self,
        statement: &SelectStatement,
        params: &QueryParams,
    ) -> EtlResult<Vec<SourceRow>> {
        let mut inner = self.inner.lock().await;

        let mut matching = Vec::new();
        for row in &inner.rows {
            if matches_all(row, &statement.predicates, params)? {
                matching.push(row.clone());
            }
        }

        matching.sort_by(|left, right| {
            statement
                .order_by
                .iter()
                .map(|key| {
                    let ordering = compare_for_sort(left.get(&key.alias), right.get(&key.alias));
                    match key.order {
                        config::shared::SortOrder::Asc => ordering,
                        config::shared::SortOrder::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        if let Some(limit) = params.scalar(PARAM_LIMIT) {
            let Cell::I64(limit) = limit else {
                bail!(ErrorKind::InvalidState, "Limit parameter must be a long", limit);
            };
            matching.truncate(usize::try_from(*limit).unwrap_or(usize::MAX));
        }

        debug!(rows = matching.len(), "memory source returned rows");

        inner.executed.push(ExecutedQuery {
            statement: statement.clone(),
            params: params.clone(),
            returned_rows: matching.len(),
        });

        Ok(matching)
    }
}

fn matches_all(row: &SourceRow, predicates: &[Predicate], params: &QueryParams) -> EtlResult<bool> {
    for predicate in predicates {
        if !matches(row, predicate, params)? {
            return Ok(false);
        }
    }

    Ok(true)
}

fn matches(row: &SourceRow, predicate: &Predicate, params: &QueryParams) -> EtlResult<bool> {
    let value = |alias: &str| row.get(alias).unwrap_or(&Cell::Null);

    let matched = match predicate {
        Predicate::Raw(_) => true,
        Predicate::NotNull { alias, .. } => !value(alias).is_null(),
        Predicate::Compare { alias, op, param, .. } => {
            let Some(bound) = params.scalar(param) else {
                bail!(ErrorKind::InvalidState, "Query parameter is not bound", *param);
            };
            let ordering = value(alias).partial_cmp(bound);
            match (op, ordering) {
                (_, None) => false,
                (ComparisonOp::Gt, Some(ordering)) => ordering == Ordering::Greater,
                (ComparisonOp::Gte, Some(ordering)) => ordering != Ordering::Less,
                (ComparisonOp::Lte, Some(ordering)) => ordering != Ordering::Greater,
            }
        }
        Predicate::InList { alias, param, .. } => {
            let Some(list) = params.list(param) else {
                bail!(ErrorKind::InvalidState, "Query parameter is not bound", *param);
            };
            let cell = value(alias);
            list.iter()
                .any(|candidate| cell.partial_cmp(candidate) == Some(Ordering::Equal))
        }
    };

    Ok(matched)
}

fn compare_for_sort(left: Option<&Cell>, right: Option<&Cell>) -> Ordering {
    let left = left.unwrap_or(&Cell::Null);
    let right = right.unwrap_or(&Cell::Null);
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => left.partial_cmp(right).unwrap_or(Ordering::Equal),
    }
}
