//! Incremental sync of relational data into a search index.
//!
//! A channel declares a tree of types over joined source tables. Each run fetches the rows
//! past the channel's watermark page by page, folds them into nested documents, upserts them
//! into the search index and checkpoints the watermark. Update rules on child types catch
//! changes that do not move the root watermark.

pub mod channel;
pub mod conversions;
pub mod destination;
pub mod error;
mod macros;
pub mod merge;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod source;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
