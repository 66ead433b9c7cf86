use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::conversions::AggregateValue;
use crate::destination::{BulkItemFailure, BulkWriteReport, CHANNEL_FIELD, SearchIndex};
use crate::error::{ErrorKind, EtlResult};
use crate::types::DATE_FORMAT;

#[derive(Debug, Default)]
struct StoredIndex {
    mappings: HashMap<String, Value>,
    /// Documents keyed by `(doc_type, id)`.
    documents: BTreeMap<(String, String), Value>,
}

#[derive(Debug, Default)]
struct Inner {
    indexes: HashMap<String, StoredIndex>,
    failing_indexes: HashSet<String>,
    rejected_ids: HashSet<String>,
    bulk_requests: usize,
}

/// In-memory search index for tests and development.
///
/// [`MemorySearchIndex`] keeps documents as JSON and answers `max` aggregates by walking the
/// requested field path through nested objects and lists. Date strings are compared as epoch
/// milliseconds, the way a search cluster reports aggregates over date fields.
///
/// Writes can be made to fail as a whole per index with [`MemorySearchIndex::fail_writes_to`]
/// or per document with [`MemorySearchIndex::reject_ids`].
#[derive(Debug, Clone, Default)]
pub struct MemorySearchIndex {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the documents of `index` ordered by id.
    pub async fn documents(&self, index: &str) -> Vec<(String, Value)> {
        let inner = self.inner.lock().await;
        let Some(stored) = inner.indexes.get(index) else {
            return Vec::new();
        };

        stored
            .documents
            .iter()
            .map(|((_, id), document)| (id.clone(), document.clone()))
            .collect()
    }

    pub async fn document(&self, index: &str, id: &str) -> Option<Value> {
        let inner = self.inner.lock().await;
        inner.indexes.get(index).and_then(|stored| {
            stored
                .documents
                .iter()
                .find(|((_, stored_id), _)| stored_id == id)
                .map(|(_, document)| document.clone())
        })
    }

    pub async fn mapping(&self, index: &str, doc_type: &str) -> Option<Value> {
        let inner = self.inner.lock().await;
        inner
            .indexes
            .get(index)
            .and_then(|stored| stored.mappings.get(doc_type).cloned())
    }

    pub async fn has_index(&self, index: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.indexes.contains_key(index)
    }

    /// Number of bulk requests received, failed ones included.
    pub async fn bulk_request_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.bulk_requests
    }

    /// Makes every later bulk request against `index` fail.
    pub async fn fail_writes_to(&self, index: &str) {
        let mut inner = self.inner.lock().await;
        inner.failing_indexes.insert(index.to_string());
    }

    /// Makes later bulk requests reject the documents with the given ids.
    pub async fn reject_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.inner.lock().await;
        inner.rejected_ids.extend(ids.into_iter().map(Into::into));
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.indexes.clear();
        inner.failing_indexes.clear();
        inner.rejected_ids.clear();
        inner.bulk_requests = 0;
    }
}

impl SearchIndex for MemorySearchIndex {
    fn name() -> &'static str {
        "memory"
    }

    async fn ensure_index_and_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: Option<&Value>,
    ) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        let stored = inner.indexes.entry(index.to_string()).or_default();
        if let Some(mapping) = mapping {
            stored.mappings.insert(doc_type.to_string(), mapping.clone());
        }

        Ok(())
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        doc_type: &str,
        documents: Vec<(String, Value)>,
    ) -> EtlResult<BulkWriteReport> {
        let mut inner = self.inner.lock().await;
        inner.bulk_requests += 1;

        if inner.failing_indexes.contains(index) {
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Bulk request was rejected",
                format!("index {index} is failing")
            );
        }

        info!("writing a batch of {} documents to {index}", documents.len());

        let rejected_ids = inner.rejected_ids.clone();
        let stored = inner.indexes.entry(index.to_string()).or_default();
        let mut report = BulkWriteReport::default();
        for (id, document) in documents {
            if rejected_ids.contains(&id) {
                report.failures.push(BulkItemFailure {
                    id,
                    reason: "document rejected".to_string(),
                });
                continue;
            }

            stored
                .documents
                .insert((doc_type.to_string(), id), document);
            report.written += 1;
        }

        Ok(report)
    }

    async fn max_aggregate(
        &self,
        index: &str,
        doc_type: &str,
        channel: &str,
        field_path: &str,
    ) -> EtlResult<Option<AggregateValue>> {
        let inner = self.inner.lock().await;
        let Some(stored) = inner.indexes.get(index) else {
            return Ok(None);
        };

        let path: Vec<&str> = field_path.split('.').collect();
        let mut max: Option<AggregateValue> = None;
        for ((stored_type, _), document) in &stored.documents {
            if stored_type != doc_type
                || document.get(CHANNEL_FIELD).and_then(Value::as_str) != Some(channel)
            {
                continue;
            }

            let mut leaves = Vec::new();
            collect_leaves(document, &path, &mut leaves);
            for leaf in leaves {
                let Some(candidate) = aggregate_value(leaf) else {
                    continue;
                };
                if max.as_ref().is_none_or(|current| candidate.value > current.value) {
                    max = Some(candidate);
                }
            }
        }

        Ok(max)
    }

    async fn get_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> EtlResult<Option<Value>> {
        let inner = self.inner.lock().await;
        Ok(inner.indexes.get(index).and_then(|stored| {
            stored
                .documents
                .get(&(doc_type.to_string(), id.to_string()))
                .cloned()
        }))
    }

    async fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        document: Value,
    ) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .indexes
            .entry(index.to_string())
            .or_default()
            .documents
            .insert((doc_type.to_string(), id.to_string()), document);

        Ok(())
    }
}

/// Collects the values found at `path` below `value`, descending into every list entry.
fn collect_leaves<'a>(value: &'a Value, path: &[&str], leaves: &mut Vec<&'a Value>) {
    match value {
        Value::Array(entries) => {
            for entry in entries {
                collect_leaves(entry, path, leaves);
            }
        }
        Value::Object(fields) => {
            if let Some((head, rest)) = path.split_first()
                && let Some(child) = fields.get(*head)
            {
                collect_leaves(child, rest, leaves);
            }
        }
        leaf if path.is_empty() && !leaf.is_null() => leaves.push(leaf),
        _ => {}
    }
}

fn aggregate_value(leaf: &Value) -> Option<AggregateValue> {
    match leaf {
        Value::Number(number) => number.as_f64().map(AggregateValue::numeric),
        Value::Bool(flag) => Some(AggregateValue::numeric(if *flag { 1.0 } else { 0.0 })),
        Value::String(text) => {
            let millis = if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
                instant.timestamp_millis()
            } else {
                NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .ok()?
                    .and_hms_opt(0, 0, 0)?
                    .and_utc()
                    .timestamp_millis()
            };

            Some(AggregateValue {
                value: millis as f64,
                value_as_string: Some(text.clone()),
            })
        }
        _ => None,
    }
}
