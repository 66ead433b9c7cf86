//! Search indexes that channels write documents to.
//!
//! The [`SearchIndex`] trait covers everything a channel run needs from a cluster: index
//! bootstrap, bulk upserts, `max` aggregates for watermark recovery and single document access
//! for checkpoints. [`SearchClusterRegistry`] hands out one client per configured cluster for
//! the duration of a run.

mod base;
pub mod elasticsearch;
pub mod memory;
mod registry;

pub use base::{BulkItemFailure, BulkWriteReport, SearchIndex};
pub use registry::SearchClusterRegistry;

/// Document field every persisted document is stamped with, holding its channel name.
pub const CHANNEL_FIELD: &str = "channel_";
