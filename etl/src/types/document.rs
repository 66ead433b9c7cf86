use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::types::Cell;

/// A nested document as written to the index.
///
/// Scalar fields of a node sit next to the embedded children of that node: a single object for
/// a one-to-one child, a list of objects for a one-to-many child.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: BTreeMap<String, DocumentValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentValue {
    Cell(Cell),
    Object(Document),
    List(Vec<Document>),
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&DocumentValue> {
        self.fields.get(key)
    }

    /// Returns the scalar stored under `key`, if the key holds a scalar.
    pub fn cell(&self, key: &str) -> Option<&Cell> {
        match self.fields.get(key) {
            Some(DocumentValue::Cell(cell)) => Some(cell),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: DocumentValue) -> Option<DocumentValue> {
        self.fields.insert(key.into(), value)
    }

    pub fn insert_cell(&mut self, key: impl Into<String>, cell: Cell) -> Option<DocumentValue> {
        self.insert(key, DocumentValue::Cell(cell))
    }

    pub(crate) fn entry(&mut self, key: String) -> Entry<'_, String, DocumentValue> {
        self.fields.entry(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DocumentValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Renders the document as the JSON body sent to the index.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl DocumentValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DocumentValue::Cell(cell) => serde_json::to_value(cell).unwrap_or_default(),
            DocumentValue::Object(document) => document.to_json(),
            DocumentValue::List(documents) => {
                serde_json::Value::Array(documents.iter().map(Document::to_json).collect())
            }
        }
    }
}

impl FromIterator<(String, Cell)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Cell)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(key, cell)| (key, DocumentValue::Cell(cell)))
                .collect(),
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for DocumentValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DocumentValue::Cell(cell) => cell.serialize(serializer),
            DocumentValue::Object(document) => document.serialize(serializer),
            DocumentValue::List(documents) => documents.serialize(serializer),
        }
    }
}
