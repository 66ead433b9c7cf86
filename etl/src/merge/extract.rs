use std::sync::Arc;

use chrono::FixedOffset;

use crate::conversions::to_index_cell;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::merge::DocumentBatch;
use crate::schema::{SchemaTree, TypeId};
use crate::types::{Cell, Document, SourceRow};

/// One source row split by node.
///
/// Entries are indexed by node position in the tree. A node whose id is absent (null or zero)
/// has no document: the row holds no data for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub(crate) ids: Vec<Cell>,
    pub(crate) documents: Vec<Option<Document>>,
}

impl ExtractedRow {
    pub fn id(&self, node: TypeId) -> &Cell {
        &self.ids[SchemaTree::index_of(node)]
    }

    pub fn document(&self, node: TypeId) -> Option<&Document> {
        self.documents[SchemaTree::index_of(node)].as_ref()
    }

    pub(crate) fn take_document(&mut self, node: TypeId) -> Option<Document> {
        self.documents[SchemaTree::index_of(node)].take()
    }
}

/// Converts source rows into documents of one channel.
#[derive(Debug, Clone)]
pub struct DocumentMerger {
    tree: Arc<SchemaTree>,
    time_zone: Option<FixedOffset>,
}

impl DocumentMerger {
    pub fn new(tree: Arc<SchemaTree>, time_zone: Option<FixedOffset>) -> Self {
        Self { tree, time_zone }
    }

    pub fn tree(&self) -> &SchemaTree {
        &self.tree
    }

    /// Reads every field of every node from `row`, converting values to their index form.
    ///
    /// Columns missing from the row read as null.
    pub fn extract_row(&self, row: &SourceRow) -> EtlResult<ExtractedRow> {
        let mut ids = vec![Cell::Null; self.tree.len()];
        let mut documents = vec![None; self.tree.len()];

        for id in self.tree.depth_first() {
            let node = self.tree.node(id);
            let mut document = Document::new();
            for field in node.fields() {
                let cell = row.get(&field.alias).cloned().unwrap_or(Cell::Null);
                let cell = to_index_cell(cell, field.field_type, self.time_zone).map_err(|err| {
                    etl_error!(
                        ErrorKind::ConversionError,
                        "Source column could not be converted",
                        format!("column {}: {err}", field.alias)
                    )
                })?;
                document.insert_cell(field.name.clone(), cell);
            }

            let position = SchemaTree::index_of(id);
            let node_id = document
                .cell(&node.id_field().name)
                .cloned()
                .unwrap_or(Cell::Null);

            if node.is_root() && node_id.is_absent_id() {
                return Err(etl_error!(
                    ErrorKind::InvalidData,
                    "Source row has no root id",
                    format!("column {}", node.id_field().alias)
                ));
            }

            if !node_id.is_absent_id() {
                documents[position] = Some(document);
            }
            ids[position] = node_id;
        }

        Ok(ExtractedRow { ids, documents })
    }

    /// Extracts `row` and folds it into `batch`, counting it as one fetched row.
    pub fn merge_row(&self, batch: &mut DocumentBatch, row: &SourceRow) -> EtlResult<()> {
        let extracted = self.extract_row(row)?;
        batch.merge(&self.tree, extracted)?;
        batch.count_row();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::{order_row, orders_schema};
    use chrono::NaiveDate;

    fn merger() -> DocumentMerger {
        let tree = SchemaTree::from_config(&orders_schema()).unwrap();
        DocumentMerger::new(Arc::new(tree), None)
    }

    #[test]
    fn extract_row_splits_fields_by_node() {
        let merger = merger();
        let placed = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let row = order_row(1, placed, "Ada", Some((11, "SKU-1", 3)));

        let extracted = merger.extract_row(&row).unwrap();

        let tree = merger.tree();
        let root = extracted.document(tree.root_id()).unwrap();
        assert_eq!(root.cell("orderId"), Some(&Cell::I64(1)));
        assert_eq!(root.cell("customerName"), Some(&Cell::from("Ada")));
        assert_eq!(root.cell("placedDate"), Some(&Cell::TimestampTz(placed.and_utc())));

        let lines = tree.root().children()[0];
        let line = extracted.document(lines).unwrap();
        assert_eq!(line.cell("lineId"), Some(&Cell::I64(11)));
        assert_eq!(line.cell("quantity"), Some(&Cell::I32(3)));
        assert_eq!(line.cell("modifiedDate"), Some(&Cell::Null));
    }

    #[test]
    fn extract_row_drops_children_without_id() {
        let merger = merger();
        let placed = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let row = order_row(1, placed, "Ada", None);

        let extracted = merger.extract_row(&row).unwrap();

        let lines = merger.tree().root().children()[0];
        assert!(extracted.id(lines).is_null());
        assert!(extracted.document(lines).is_none());
    }

    #[test]
    fn extract_row_requires_root_id() {
        let merger = merger();
        let row = SourceRow::new().with("orders___orderId", Cell::Null);

        let err = merger.extract_row(&row).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn extract_row_rejects_mistyped_values() {
        let merger = merger();
        let row = SourceRow::new()
            .with("orders___orderId", 1i64)
            .with("orders___placedDate", "not a date");

        let err = merger.extract_row(&row).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }
}
