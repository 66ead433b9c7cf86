//! Values flowing from source rows into index documents.

mod cell;
mod document;
mod row;

pub use cell::Cell;
pub(crate) use cell::DATE_FORMAT;
pub use config::shared::FieldType;
pub use document::{Document, DocumentValue};
pub use row::SourceRow;
