//! Configuration model for the search index replicator.
//!
//! Holds the serde types describing datasources, search clusters and channels, the layered
//! loader that reads them from `configuration/` plus `APP_` environment overrides, and the
//! validation that runs before anything connects.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_schema_file};
