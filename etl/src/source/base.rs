use std::future::Future;

use crate::error::EtlResult;
use crate::query::{QueryParams, SelectStatement};
use crate::types::SourceRow;

/// A database that channel queries run against.
///
/// Rows come back fully materialized and in the order the statement requests. Statements
/// always carry a `:limit` parameter so a page never exceeds what the caller asked for.
pub trait RelationalSource {
    /// Returns the name of the source kind, used in logs.
    fn name() -> &'static str;

    /// Executes `statement` with `params` bound to its named parameters.
    fn execute(
        &self,
        statement: &SelectStatement,
        params: &QueryParams,
    ) -> impl Future<Output = EtlResult<Vec<SourceRow>>> + Send;
}
