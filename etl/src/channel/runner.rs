use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bail;
use crate::channel::{Channel, ChannelRunSummary};
use crate::conversions::{cell_from_aggregate, to_source_param};
use crate::destination::{CHANNEL_FIELD, SearchIndex};
use crate::error::{ErrorKind, EtlResult};
use crate::merge::{DocumentBatch, RootDocument};
use crate::query::{PARAM_LAST_REF_VALUE, PARAM_LIMIT, QueryParams};
use crate::source::RelationalSource;
use crate::state::{Checkpoint, CheckpointStore};
use crate::types::Cell;

/// Runs `channel` once against `source` and `index`.
pub async fn run_channel<S, I>(
    channel: &Channel,
    source: &S,
    index: &I,
    checkpoints: &CheckpointStore,
) -> EtlResult<ChannelRunSummary>
where
    S: RelationalSource,
    I: SearchIndex,
{
    ChannelRunner::new(channel, source, index, checkpoints)
        .run()
        .await
}

/// Drives the fetch loop of one channel.
///
/// Pages are fetched in root watermark order. Unless a page is the last one, its most recent
/// root is withheld: its rows may continue on the next page, which starts at that root's
/// reference value inclusively and rebuilds it whole.
pub struct ChannelRunner<'a, S, I> {
    pub(super) channel: &'a Channel,
    pub(super) source: &'a S,
    pub(super) index: &'a I,
    checkpoints: &'a CheckpointStore,
}

impl<'a, S, I> ChannelRunner<'a, S, I>
where
    S: RelationalSource,
    I: SearchIndex,
{
    pub fn new(
        channel: &'a Channel,
        source: &'a S,
        index: &'a I,
        checkpoints: &'a CheckpointStore,
    ) -> Self {
        Self {
            channel,
            source,
            index,
            checkpoints,
        }
    }

    pub async fn run(&self) -> EtlResult<ChannelRunSummary> {
        let config = self.channel.config();
        let mapping = self.channel.index_mapping();
        self.index
            .ensure_index_and_mapping(&config.index, &config.doc_type, Some(&mapping))
            .await?;

        let mut checkpoint = self.load_checkpoint().await?;
        let mut watermark = self.recover_watermark(&checkpoint).await?;
        let mut cursor = watermark.clone();

        info!(
            batch_size = self.channel.batch_size(),
            watermark = ?watermark,
            "starting channel run"
        );

        let mut summary = ChannelRunSummary::default();
        let mut page_limit = self.channel.batch_size();
        let mut total_rows = 0usize;
        let mut detect_updates = true;

        loop {
            if detect_updates && let Some(watermark) = &watermark {
                let (updated, failed) = self.detect_updates(watermark).await?;
                summary.updated_count += updated;
                summary.failed_count += failed;
            }

            let mut batch = self.fetch_page(cursor.as_ref(), page_limit).await?;
            if batch.is_empty() {
                debug!("no rows past the watermark");
                break;
            }

            let raw_rows = batch.raw_row_count();
            let is_final = raw_rows < page_limit
                || self
                    .channel
                    .record_cap()
                    .is_some_and(|cap| total_rows + raw_rows >= cap);

            let withheld = if is_final { None } else { batch.pop_last() };
            if batch.is_empty() {
                page_limit = page_limit.saturating_mul(2);
                debug!(page_limit, "one root fills the page, widening it");
                detect_updates = false;
                continue;
            }

            // Every root on the page shares the cursor value, so the next page would repeat it.
            if let (Some(withheld), Some(cursor)) = (&withheld, &cursor)
                && withheld.reference <= *cursor
            {
                page_limit = page_limit.saturating_mul(2);
                debug!(page_limit, "roots tied on the watermark fill the page, widening it");
                detect_updates = false;
                continue;
            }

            total_rows += raw_rows;
            let Some(last_reference) = batch.last().map(|document| document.reference.clone())
            else {
                break;
            };

            let (written, failed) = self.persist(batch).await?;
            summary.inserted_count += written;
            summary.failed_count += failed;

            checkpoint.advance(self.channel.root_ref(), &last_reference, Utc::now())?;
            self.checkpoints.store(self.index, &checkpoint).await?;
            watermark = checkpoint.reference(self.channel.root_ref())?.or(watermark);

            info!(written, failed, raw_rows, watermark = ?watermark, "persisted batch");

            let Some(withheld) = withheld else {
                break;
            };
            if withheld.reference.is_null() {
                bail!(
                    ErrorKind::InvalidData,
                    "Root reference value is null",
                    withheld.key
                );
            }

            cursor = Some(withheld.reference);
            page_limit = self.channel.batch_size();
            detect_updates = true;
        }

        if let Some(watermark) = &watermark {
            let (updated, failed) = self.detect_updates(watermark).await?;
            summary.updated_count += updated;
            summary.failed_count += failed;
        }

        summary.final_watermark = watermark;
        info!(
            inserted = summary.inserted_count,
            updated = summary.updated_count,
            failed = summary.failed_count,
            "finished channel run"
        );

        Ok(summary)
    }

    async fn load_checkpoint(&self) -> EtlResult<Checkpoint> {
        let snapshot = self.channel.snapshot();
        let Some(mut checkpoint) = self.checkpoints.load(self.index, self.channel.name()).await?
        else {
            return Ok(Checkpoint::new(self.channel.name(), snapshot.clone()));
        };

        if checkpoint.has_drifted(snapshot) {
            warn!("channel configuration changed since the last checkpoint");
        }
        checkpoint.channel_def = snapshot.clone();

        Ok(checkpoint)
    }

    /// Returns the checkpointed watermark, falling back to the largest reference value
    /// already in the index for this channel.
    async fn recover_watermark(&self, checkpoint: &Checkpoint) -> EtlResult<Option<Cell>> {
        let root_ref = self.channel.root_ref();
        if let Some(watermark) = checkpoint.reference(root_ref)? {
            return Ok(Some(watermark));
        }

        let recovered = self.index_max(&root_ref.path, root_ref.field_type).await?;
        if recovered.is_some() {
            info!(watermark = ?recovered, "recovered watermark from the index");
        }

        Ok(recovered)
    }

    pub(super) async fn index_max(
        &self,
        field_path: &str,
        field_type: config::shared::FieldType,
    ) -> EtlResult<Option<Cell>> {
        let config = self.channel.config();
        let aggregate = self
            .index
            .max_aggregate(&config.index, &config.doc_type, &config.name, field_path)
            .await?;

        aggregate
            .map(|aggregate| cell_from_aggregate(&aggregate, field_type))
            .transpose()
    }

    async fn fetch_page(&self, cursor: Option<&Cell>, limit: usize) -> EtlResult<DocumentBatch> {
        let root_ref = self.channel.root_ref();
        let statement = self.channel.queries().main(cursor.is_some());

        let mut params = QueryParams::new();
        params.set(PARAM_LIMIT, i64::try_from(limit).unwrap_or(i64::MAX));
        if let Some(cursor) = cursor {
            params.set(
                PARAM_LAST_REF_VALUE,
                to_source_param(cursor, root_ref.field_type, self.channel.time_zone()),
            );
        }

        let rows = self.source.execute(&statement, &params).await?;
        debug!(rows = rows.len(), limit, "fetched page");

        let mut batch = DocumentBatch::new();
        for row in &rows {
            self.channel.merger().merge_row(&mut batch, row)?;
        }

        Ok(batch)
    }

    /// Stamps and upserts every document of `batch`, returning written and rejected counts.
    pub(super) async fn persist(&self, batch: DocumentBatch) -> EtlResult<(usize, usize)> {
        if batch.is_empty() {
            return Ok((0, 0));
        }

        let config = self.channel.config();
        let documents = batch
            .into_documents()
            .into_iter()
            .map(|root| stamped(root, self.channel.name()))
            .collect();

        let report = self
            .index
            .bulk_upsert(&config.index, &config.doc_type, documents)
            .await?;

        for failure in &report.failures {
            warn!(id = %failure.id, reason = %failure.reason, "search index rejected document");
        }

        Ok((report.written, report.failures.len()))
    }
}

fn stamped(root: RootDocument, channel: &str) -> (String, Value) {
    let mut document = root.document.to_json();
    if let Value::Object(fields) = &mut document {
        fields.insert(CHANNEL_FIELD.to_string(), Value::String(channel.to_string()));
    }

    (root.key, document)
}
