use std::collections::BTreeMap;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::Cell;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(Cell),
    /// Expanded into one placeholder per element.
    List(Vec<Cell>),
}

/// Values for the named `:param` placeholders of a [`crate::query::SelectStatement`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    values: BTreeMap<&'static str, ParamValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &'static str, value: impl Into<Cell>) -> &mut Self {
        self.values.insert(name, ParamValue::Scalar(value.into()));
        self
    }

    pub fn set_list(&mut self, name: &'static str, values: Vec<Cell>) -> &mut Self {
        self.values.insert(name, ParamValue::List(values));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<&Cell> {
        match self.values.get(name) {
            Some(ParamValue::Scalar(cell)) => Some(cell),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[Cell]> {
        match self.values.get(name) {
            Some(ParamValue::List(cells)) => Some(cells),
            _ => None,
        }
    }
}

/// Rewrites `:name` placeholders into positional `$n` ones, returning the values in bind order.
///
/// Casts (`::type`) and anything inside single-quoted literals or double-quoted identifiers are
/// left alone. An empty list renders as `NULL`, so `x IN (NULL)` matches nothing.
pub fn bind_named_parameters(sql: &str, params: &QueryParams) -> EtlResult<(String, Vec<Cell>)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut rendered = String::with_capacity(sql.len());
    let mut binds = Vec::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(open) = quote {
            if c == open {
                quote = None;
            }
            rendered.push(c);
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            quote = Some(c);
            rendered.push(c);
            i += 1;
            continue;
        }

        if c == ':' && chars.get(i + 1) == Some(&':') {
            rendered.push_str("::");
            i += 2;
            continue;
        }

        let starts_name = chars
            .get(i + 1)
            .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_');
        if c != ':' || !starts_name {
            rendered.push(c);
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        let name: String = chars[start..end].iter().collect();

        match params.get(&name) {
            Some(ParamValue::Scalar(cell)) => {
                binds.push(cell.clone());
                rendered.push_str(&format!("${}", binds.len()));
            }
            Some(ParamValue::List(cells)) if cells.is_empty() => rendered.push_str("NULL"),
            Some(ParamValue::List(cells)) => {
                let mut placeholders = Vec::with_capacity(cells.len());
                for cell in cells {
                    binds.push(cell.clone());
                    placeholders.push(format!("${}", binds.len()));
                }
                rendered.push_str(&placeholders.join(", "));
            }
            None => bail!(
                ErrorKind::InvalidState,
                "Query parameter is not bound",
                name
            ),
        }

        i = end;
    }

    Ok((rendered, binds))
}
