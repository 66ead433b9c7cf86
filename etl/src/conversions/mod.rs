//! Conversions between source column values, index field values and query parameters.
//!
//! Three directions are covered:
//! - source → index: [`to_index_cell`] coerces a decoded column into the declared field type,
//!   attaching the source time zone to naive timestamps;
//! - watermark → parameter: [`to_source_param`] strips the zone again before a value is bound
//!   into a query against the source;
//! - index → watermark: [`cell_from_aggregate`] and [`cell_from_json`] recover typed values
//!   from max aggregates (epoch millis for temporal fields) and stored checkpoints.

mod aggregate;
mod time;
mod value;

pub use aggregate::{AggregateValue, cell_from_aggregate};
pub use time::{from_epoch_millis, localize, to_source_local};
pub use value::{cell_from_json, to_index_cell, to_source_param};
