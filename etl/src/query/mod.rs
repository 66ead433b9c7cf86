//! SQL generation for channel fetches.
//!
//! [`SelectBuilder`] accumulates select items, tables, predicates and sort keys; a
//! [`SqlDialect`] renders them into text. [`ChannelQueries`] derives the three statements a
//! channel needs from its schema tree: the main incremental fetch, one update-detection fetch
//! per update rule, and the re-fetch of complete documents by root id.

mod builder;
mod dialect;
mod params;
mod statements;

pub use builder::{ComparisonOp, FromItem, OrderBy, Predicate, SelectBuilder, SelectItem, SelectStatement};
pub use dialect::SqlDialect;
pub use params::{ParamValue, QueryParams, bind_named_parameters};
pub use statements::{
    ChannelQueries, PARAM_LAST_REF_VALUE, PARAM_LAST_UPDATE_REF_VALUE, PARAM_LIMIT, PARAM_ROOT_IDS,
};
