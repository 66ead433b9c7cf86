use std::collections::HashMap;

use crate::types::Cell;

/// One row returned by a relational source, keyed by select-list alias.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    values: HashMap<String, Cell>,
}

impl SourceRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column value, builder style.
    pub fn with(mut self, alias: impl Into<String>, value: impl Into<Cell>) -> Self {
        self.insert(alias, value);
        self
    }

    pub fn insert(&mut self, alias: impl Into<String>, value: impl Into<Cell>) {
        self.values.insert(alias.into(), value.into());
    }

    pub fn get(&self, alias: &str) -> Option<&Cell> {
        self.values.get(alias)
    }

    pub fn get_mut(&mut self, alias: &str) -> Option<&mut Cell> {
        self.values.get_mut(alias)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Cell)> for SourceRow {
    fn from_iter<I: IntoIterator<Item = (K, Cell)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(alias, cell)| (alias.into(), cell))
                .collect(),
        }
    }
}
