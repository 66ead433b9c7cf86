use config::shared::ReplicatorConfig;
use tracing::warn;

use crate::destination::SearchIndex;
use crate::error::EtlResult;
use crate::state::Checkpoint;

/// Reads and writes checkpoint documents, one per channel keyed by channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStore {
    index: String,
    doc_type: String,
}

impl CheckpointStore {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
        }
    }

    pub fn from_config(config: &ReplicatorConfig) -> Self {
        Self::new(&config.checkpoint_index, &config.checkpoint_doc_type)
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Loads the checkpoint of `channel`.
    ///
    /// A document that no longer parses is reported and treated as absent, so the watermark
    /// is recovered from the index instead.
    pub async fn load<I: SearchIndex>(&self, index: &I, channel: &str) -> EtlResult<Option<Checkpoint>> {
        let Some(document) = index.get_document(&self.index, &self.doc_type, channel).await? else {
            return Ok(None);
        };

        match serde_json::from_value(document) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(err) => {
                warn!(channel, error = %err, "ignoring unreadable checkpoint");
                Ok(None)
            }
        }
    }

    pub async fn store<I: SearchIndex>(&self, index: &I, checkpoint: &Checkpoint) -> EtlResult<()> {
        let document = serde_json::to_value(checkpoint)?;
        index
            .put_document(&self.index, &self.doc_type, &checkpoint.channel_name, document)
            .await
    }
}
