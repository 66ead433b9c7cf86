use std::collections::HashSet;

use tracing::{debug, info};

use crate::channel::ChannelRunner;
use crate::conversions::{to_index_cell, to_source_param};
use crate::destination::SearchIndex;
use crate::error::EtlResult;
use crate::merge::DocumentBatch;
use crate::query::{
    PARAM_LAST_REF_VALUE, PARAM_LAST_UPDATE_REF_VALUE, PARAM_LIMIT, PARAM_ROOT_IDS, QueryParams,
};
use crate::schema::{TypeNode, UpdateRule};
use crate::source::RelationalSource;
use crate::types::Cell;

impl<S, I> ChannelRunner<'_, S, I>
where
    S: RelationalSource,
    I: SearchIndex,
{
    /// Re-indexes the documents whose update rule fields moved past what the index holds.
    ///
    /// Only roots at or below `watermark` are considered. Each rule is checked against its own
    /// watermark, the largest value of its field among the channel's documents; without one
    /// every non-null value counts as a change. Changed roots are re-fetched whole before being
    /// overwritten, at most a page of roots per refetch. Returns written and rejected document
    /// counts.
    pub async fn detect_updates(&self, watermark: &Cell) -> EtlResult<(usize, usize)> {
        let tree = self.channel.tree();
        let mut written = 0;
        let mut failed = 0;

        for id in tree.depth_first() {
            let node = tree.node(id);
            for rule in node.updates() {
                let root_ids = self.changed_roots(node, rule, watermark).await?;
                if root_ids.is_empty() {
                    debug!(rule = %rule.name, "no updated rows");
                    continue;
                }

                let mut rule_written = 0;
                let mut rule_failed = 0;
                for chunk in root_ids.chunks(self.channel.batch_size().max(1)) {
                    let batch = self.refetch(watermark, chunk).await?;
                    let (chunk_written, chunk_failed) = self.persist(batch).await?;
                    rule_written += chunk_written;
                    rule_failed += chunk_failed;
                }
                info!(
                    rule = %rule.name,
                    node = node.name(),
                    roots = root_ids.len(),
                    written = rule_written,
                    "re-indexed updated documents"
                );

                written += rule_written;
                failed += rule_failed;
            }
        }

        Ok((written, failed))
    }

    /// Returns the distinct root ids, in change order, of rows matched by `rule`.
    async fn changed_roots(
        &self,
        node: &TypeNode,
        rule: &UpdateRule,
        watermark: &Cell,
    ) -> EtlResult<Vec<Cell>> {
        let time_zone = self.channel.time_zone();
        let field = node.update_field(rule);
        let update_watermark = self.index_max(&field.path, field.field_type).await?;
        debug!(rule = %rule.name, update_watermark = ?update_watermark, "checking update rule");

        let statement = self
            .channel
            .queries()
            .update(node, rule, update_watermark.is_some());

        let mut params = self.unbounded_params(watermark);
        if let Some(update_watermark) = &update_watermark {
            params.set(
                PARAM_LAST_UPDATE_REF_VALUE,
                to_source_param(update_watermark, field.field_type, time_zone),
            );
        }

        let rows = self.source.execute(&statement, &params).await?;

        let root_id = self.channel.tree().root().id_field();
        let mut seen = HashSet::new();
        let mut root_ids = Vec::new();
        for row in &rows {
            let cell = row.get(&root_id.alias).cloned().unwrap_or(Cell::Null);
            let cell = to_index_cell(cell, root_id.field_type, time_zone)?;
            if let Some(key) = cell.to_key_string()
                && seen.insert(key)
            {
                root_ids.push(cell);
            }
        }

        Ok(root_ids)
    }

    async fn refetch(&self, watermark: &Cell, root_ids: &[Cell]) -> EtlResult<DocumentBatch> {
        let time_zone = self.channel.time_zone();
        let root_id = self.channel.tree().root().id_field();

        let mut params = self.unbounded_params(watermark);
        params.set_list(
            PARAM_ROOT_IDS,
            root_ids
                .iter()
                .map(|id| to_source_param(id, root_id.field_type, time_zone))
                .collect(),
        );

        let statement = self.channel.queries().refetch();
        let rows = self.source.execute(&statement, &params).await?;

        let mut batch = DocumentBatch::new();
        for row in &rows {
            self.channel.merger().merge_row(&mut batch, row)?;
        }

        Ok(batch)
    }

    fn unbounded_params(&self, watermark: &Cell) -> QueryParams {
        let root_ref = self.channel.root_ref();
        let mut params = QueryParams::new();
        params
            .set(PARAM_LIMIT, i64::MAX)
            .set(
                PARAM_LAST_REF_VALUE,
                to_source_param(watermark, root_ref.field_type, self.channel.time_zone()),
            );
        params
    }
}
