//! Folding of flat joined rows into nested documents.
//!
//! Every row of a channel fetch carries one value per field of every node in the tree.
//! [`DocumentMerger::extract_row`] splits a row into per-node documents and
//! [`DocumentBatch::merge`] folds them into the document of their root, deduplicating the
//! repeated child rows that one-to-many joins produce.

mod batch;
mod extract;

pub use batch::{DocumentBatch, RootDocument};
pub use extract::{DocumentMerger, ExtractedRow};
