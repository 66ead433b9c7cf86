use std::future::Future;

use serde_json::Value;

use crate::conversions::AggregateValue;
use crate::error::EtlResult;

/// A document the index refused while the rest of its bulk request succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome of a bulk upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteReport {
    pub written: usize,
    pub failures: Vec<BulkItemFailure>,
}

impl BulkWriteReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// A document store that channels replicate into.
///
/// Absent indexes and documents are reported as `None`, never as errors: a channel that has
/// never run has neither.
pub trait SearchIndex {
    /// Returns the name of the index kind, used in logs.
    fn name() -> &'static str;

    /// Creates `index` if it does not exist and applies `mapping` to `doc_type` when given.
    ///
    /// Must be idempotent: running it against an existing index is not an error.
    fn ensure_index_and_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: Option<&Value>,
    ) -> impl Future<Output = EtlResult<()>> + Send;

    /// Writes `documents` keyed by id, replacing any document stored under the same id.
    ///
    /// Item level rejections are returned in the report; only a failure of the request as a
    /// whole is an error.
    fn bulk_upsert(
        &self,
        index: &str,
        doc_type: &str,
        documents: Vec<(String, Value)>,
    ) -> impl Future<Output = EtlResult<BulkWriteReport>> + Send;

    /// Returns the largest value of `field_path` among the documents stamped with `channel`.
    fn max_aggregate(
        &self,
        index: &str,
        doc_type: &str,
        channel: &str,
        field_path: &str,
    ) -> impl Future<Output = EtlResult<Option<AggregateValue>>> + Send;

    fn get_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> impl Future<Output = EtlResult<Option<Value>>> + Send;

    fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        document: Value,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
