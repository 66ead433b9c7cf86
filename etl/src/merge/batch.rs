use std::collections::HashMap;

use config::shared::Relation;

use crate::error::{ErrorKind, EtlResult};
use crate::merge::ExtractedRow;
use crate::schema::{SchemaTree, TypeId};
use crate::types::{Cell, Document, DocumentValue};
use crate::{bail, etl_error};

/// A root document with the values it is keyed and ordered by.
#[derive(Debug, Clone, PartialEq)]
pub struct RootDocument {
    /// Index key rendered from the root id.
    pub key: String,
    pub id: Cell,
    /// Value of the root's reference field, the watermark this document advances to.
    pub reference: Cell,
    pub document: Document,
}

/// Documents assembled from one page of rows, in the order their roots were first seen.
#[derive(Debug, Clone, Default)]
pub struct DocumentBatch {
    documents: Vec<RootDocument>,
    positions: HashMap<String, usize>,
    raw_row_count: usize,
}

impl DocumentBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds an extracted row into the document of its root.
    ///
    /// Root values are taken from the first row of a root. A one-to-one child is attached
    /// once; one-to-many children are matched by id and appended when new. Nodes without an
    /// id in the row are skipped together with their subtree.
    pub fn merge(&mut self, tree: &SchemaTree, mut row: ExtractedRow) -> EtlResult<()> {
        let root = tree.root();
        let root_id = row.id(tree.root_id()).clone();
        let Some(key) = root_id.to_key_string() else {
            bail!(ErrorKind::InvalidData, "Source row has no root id");
        };

        let position = match self.positions.get(&key) {
            Some(position) => *position,
            None => {
                let Some(document) = row.take_document(tree.root_id()) else {
                    bail!(ErrorKind::InvalidData, "Source row has no root id", key);
                };
                let reference = root
                    .ref_field()
                    .and_then(|field| document.cell(&field.name))
                    .cloned()
                    .unwrap_or(Cell::Null);

                self.documents.push(RootDocument {
                    key: key.clone(),
                    id: root_id,
                    reference,
                    document,
                });
                self.positions.insert(key, self.documents.len() - 1);
                self.documents.len() - 1
            }
        };

        merge_children(
            tree,
            tree.root_id(),
            &mut self.documents[position].document,
            &mut row,
        )
    }

    pub(crate) fn count_row(&mut self) {
        self.raw_row_count += 1;
    }

    /// Number of source rows folded into this batch.
    pub fn raw_row_count(&self) -> usize {
        self.raw_row_count
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&RootDocument> {
        self.positions.get(key).map(|position| &self.documents[*position])
    }

    pub fn last(&self) -> Option<&RootDocument> {
        self.documents.last()
    }

    /// Removes the most recently started document.
    pub fn pop_last(&mut self) -> Option<RootDocument> {
        let last = self.documents.pop()?;
        self.positions.remove(&last.key);
        Some(last)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RootDocument> {
        self.documents.iter()
    }

    pub fn into_documents(self) -> Vec<RootDocument> {
        self.documents
    }
}

fn merge_children(
    tree: &SchemaTree,
    parent: TypeId,
    parent_document: &mut Document,
    row: &mut ExtractedRow,
) -> EtlResult<()> {
    for &child_id in tree.node(parent).children() {
        let Some(child_document) = row.take_document(child_id) else {
            continue;
        };

        let child = tree.node(child_id);
        let Some(field) = child.parent_field() else {
            continue;
        };

        let value = parent_document
            .entry(field.to_string())
            .or_insert_with(|| match child.relation() {
                Relation::One => DocumentValue::Object(Document::new()),
                Relation::Many => DocumentValue::List(Vec::new()),
            });

        let target = match (child.relation(), value) {
            (Relation::One, DocumentValue::Object(existing)) => {
                if existing.is_empty() {
                    *existing = child_document;
                }
                existing
            }
            (Relation::Many, DocumentValue::List(entries)) => {
                let id_field = &child.id_field().name;
                let child_key = row.id(child_id).to_key_string();
                let position = entries.iter().position(|entry| {
                    entry.cell(id_field).and_then(Cell::to_key_string) == child_key
                });

                match position {
                    Some(position) => &mut entries[position],
                    None => {
                        entries.push(child_document);
                        let last = entries.len() - 1;
                        &mut entries[last]
                    }
                }
            }
            _ => {
                return Err(etl_error!(
                    ErrorKind::InvalidData,
                    "Child document collides with a field of its parent",
                    child.name()
                ));
            }
        };

        merge_children(tree, child_id, target, row)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime};
    use config::shared::{FieldType, Relation, SchemaConfig};

    use super::*;
    use crate::merge::DocumentMerger;
    use crate::test_utils::fixtures::{field, order_row, orders_schema, root_table, type_config};
    use crate::types::SourceRow;

    fn placed(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn orders_merger() -> DocumentMerger {
        let tree = SchemaTree::from_config(&orders_schema()).unwrap();
        DocumentMerger::new(Arc::new(tree), None)
    }

    fn child_ids(document: &Document, field: &str, id_field: &str) -> Vec<Cell> {
        match document.get(field) {
            Some(DocumentValue::List(entries)) => entries
                .iter()
                .filter_map(|entry| entry.cell(id_field).cloned())
                .collect(),
            other => panic!("expected a list under {field}, got {other:?}"),
        }
    }

    #[test]
    fn rows_of_one_root_merge_into_one_document() {
        let merger = orders_merger();
        let mut batch = DocumentBatch::new();

        merger
            .merge_row(&mut batch, &order_row(1, placed(1), "Ada", Some((10, "A", 1))))
            .unwrap();
        merger
            .merge_row(&mut batch, &order_row(1, placed(1), "Ada", Some((11, "B", 2))))
            .unwrap();
        merger
            .merge_row(&mut batch, &order_row(2, placed(2), "Bob", Some((12, "C", 1))))
            .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.raw_row_count(), 3);

        let first = batch.get("1").unwrap();
        assert_eq!(first.reference, Cell::TimestampTz(placed(1).and_utc()));
        assert_eq!(
            child_ids(&first.document, "lines", "lineId"),
            vec![Cell::I64(10), Cell::I64(11)]
        );
        assert_eq!(batch.last().unwrap().key, "2");
    }

    #[test]
    fn merging_the_same_row_twice_is_idempotent() {
        let merger = orders_merger();
        let row = order_row(1, placed(1), "Ada", Some((10, "A", 1)));

        let mut once = DocumentBatch::new();
        merger.merge_row(&mut once, &row).unwrap();

        let mut twice = DocumentBatch::new();
        merger.merge_row(&mut twice, &row).unwrap();
        merger.merge_row(&mut twice, &row).unwrap();

        assert_eq!(once.get("1").unwrap().document, twice.get("1").unwrap().document);
    }

    #[test]
    fn absent_child_ids_create_no_entries() {
        let merger = orders_merger();
        let mut batch = DocumentBatch::new();

        merger
            .merge_row(&mut batch, &order_row(1, placed(1), "Ada", None))
            .unwrap();
        let mut zero_id = order_row(2, placed(2), "Bob", Some((0, "X", 1)));
        zero_id.insert("orders___lines___lineId", 0i64);
        merger.merge_row(&mut batch, &zero_id).unwrap();

        assert!(batch.get("1").unwrap().document.get("lines").is_none());
        assert!(batch.get("2").unwrap().document.get("lines").is_none());
    }

    #[test]
    fn cross_product_rows_are_deduplicated_per_branch() {
        let mut root = type_config("shop", None, "shopId");
        root.ref_field = Some("shopId".to_string());
        root.fields = vec![field("shopId", "s.id", FieldType::Long)];
        root.tables = vec![root_table("shops", "s")];

        let mut items = type_config("shop.items", Some(Relation::Many), "itemId");
        items.fields = vec![field("itemId", "i.id", FieldType::Long)];

        let mut tags = type_config("shop.tags", Some(Relation::Many), "tagId");
        tags.fields = vec![field("tagId", "t.id", FieldType::Long)];

        let schema = SchemaConfig {
            types: vec![root, items, tags],
        };
        let tree = SchemaTree::from_config(&schema).unwrap();
        let merger = DocumentMerger::new(Arc::new(tree), None);

        let mut batch = DocumentBatch::new();
        for item in [1i64, 2] {
            for tag in [7i64, 8] {
                let row = SourceRow::new()
                    .with("shop___shopId", 1i64)
                    .with("shop___items___itemId", item)
                    .with("shop___tags___tagId", tag);
                merger.merge_row(&mut batch, &row).unwrap();
            }
        }

        let shop = &batch.get("1").unwrap().document;
        assert_eq!(child_ids(shop, "items", "itemId"), vec![Cell::I64(1), Cell::I64(2)]);
        assert_eq!(child_ids(shop, "tags", "tagId"), vec![Cell::I64(7), Cell::I64(8)]);
    }

    #[test]
    fn grandchildren_merge_into_the_matching_sibling() {
        let mut root = type_config("shop", None, "shopId");
        root.ref_field = Some("shopId".to_string());
        root.fields = vec![field("shopId", "s.id", FieldType::Long)];
        root.tables = vec![root_table("shops", "s")];

        let mut items = type_config("shop.items", Some(Relation::Many), "itemId");
        items.fields = vec![field("itemId", "i.id", FieldType::Long)];

        let mut owner = type_config("shop.items.owner", Some(Relation::One), "ownerId");
        owner.fields = vec![field("ownerId", "o.id", FieldType::Long)];

        let schema = SchemaConfig {
            types: vec![root, items, owner],
        };
        let tree = SchemaTree::from_config(&schema).unwrap();
        let merger = DocumentMerger::new(Arc::new(tree), None);

        let mut batch = DocumentBatch::new();
        for (item, owner) in [(1i64, 5i64), (2, 6), (1, 5)] {
            let row = SourceRow::new()
                .with("shop___shopId", 1i64)
                .with("shop___items___itemId", item)
                .with("shop___items___owner___ownerId", owner);
            merger.merge_row(&mut batch, &row).unwrap();
        }

        let shop = &batch.get("1").unwrap().document;
        let Some(DocumentValue::List(items)) = shop.get("items") else {
            panic!("expected items");
        };
        assert_eq!(items.len(), 2);
        let owners: Vec<_> = items
            .iter()
            .map(|item| match item.get("owner") {
                Some(DocumentValue::Object(owner)) => owner.cell("ownerId").cloned(),
                _ => None,
            })
            .collect();
        assert_eq!(owners, vec![Some(Cell::I64(5)), Some(Cell::I64(6))]);
    }

    #[test]
    fn pop_last_withholds_the_latest_root() {
        let merger = orders_merger();
        let mut batch = DocumentBatch::new();
        merger
            .merge_row(&mut batch, &order_row(1, placed(1), "Ada", None))
            .unwrap();
        merger
            .merge_row(&mut batch, &order_row(2, placed(2), "Bob", None))
            .unwrap();

        let withheld = batch.pop_last().unwrap();

        assert_eq!(withheld.key, "2");
        assert_eq!(batch.len(), 1);
        assert!(batch.get("2").is_none());
        assert_eq!(batch.raw_row_count(), 2);
    }
}
