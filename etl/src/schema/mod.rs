//! Resolved document tree of a channel.
//!
//! [`SchemaTree`] is built once per channel from its declared [`config::shared::SchemaConfig`]
//! and is read-only afterwards: query construction walks it to emit select items, tables and
//! filters, and the merger walks it to fold rows into nested documents.

mod mapping;
mod tree;

pub use tree::{FieldSpec, SchemaTree, SortSpec, TypeId, TypeNode, UpdateRule};

/// Separator replacing `.` in select-list aliases, which must be plain identifiers.
pub const ALIAS_SEPARATOR: &str = "___";
