use std::sync::Arc;

use chrono::FixedOffset;
use config::shared::ChannelConfig;
use serde_json::{Value, json};

use crate::destination::CHANNEL_FIELD;
use crate::error::{ErrorKind, EtlResult};
use crate::merge::DocumentMerger;
use crate::query::{ChannelQueries, SqlDialect};
use crate::schema::{FieldSpec, SchemaTree};
use crate::{bail, etl_error};

/// A channel configuration resolved into everything a run needs.
#[derive(Debug, Clone)]
pub struct Channel {
    config: ChannelConfig,
    tree: Arc<SchemaTree>,
    queries: ChannelQueries,
    merger: DocumentMerger,
    root_ref: FieldSpec,
    batch_size: usize,
    record_cap: Option<usize>,
    time_zone: Option<FixedOffset>,
    snapshot: Value,
}

impl Channel {
    /// Validates `config` and builds its schema tree and statements.
    ///
    /// The schema must already be inline; schema files are resolved while loading the
    /// configuration.
    pub fn resolve(
        config: ChannelConfig,
        dialect: SqlDialect,
        default_batch_size: usize,
    ) -> EtlResult<Channel> {
        config.validate()?;

        let Some(schema) = &config.schema else {
            bail!(
                ErrorKind::ConfigError,
                "Channel schema file was not resolved",
                config.name
            );
        };

        let tree = Arc::new(SchemaTree::from_config(schema)?);
        let Some(root_ref) = tree.root().ref_field().cloned() else {
            bail!(
                ErrorKind::SchemaDefinitionInvalid,
                "Root type must declare a reference field",
                tree.root().name()
            );
        };

        let time_zone = config.time_zone()?;
        let queries = ChannelQueries::new(tree.clone(), dialect)?;
        let merger = DocumentMerger::new(tree.clone(), time_zone);
        let snapshot = serde_json::to_value(&config).map_err(|err| {
            etl_error!(
                ErrorKind::SerializationError,
                "Channel configuration could not be snapshotted",
                err
            )
        })?;

        Ok(Channel {
            batch_size: config.effective_batch_size(default_batch_size),
            record_cap: config.record_cap(),
            config,
            tree,
            queries,
            merger,
            root_ref,
            time_zone,
            snapshot,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn tree(&self) -> &SchemaTree {
        &self.tree
    }

    pub fn queries(&self) -> &ChannelQueries {
        &self.queries
    }

    pub fn merger(&self) -> &DocumentMerger {
        &self.merger
    }

    /// Reference field of the root, the field watermarks are taken from.
    pub fn root_ref(&self) -> &FieldSpec {
        &self.root_ref
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn record_cap(&self) -> Option<usize> {
        self.record_cap
    }

    pub fn time_zone(&self) -> Option<FixedOffset> {
        self.time_zone
    }

    /// Configuration snapshot stored with checkpoints.
    pub fn snapshot(&self) -> &Value {
        &self.snapshot
    }

    /// Index mapping for the channel's documents: the schema's mapping directives plus the
    /// channel stamp as a keyword.
    pub fn index_mapping(&self) -> Value {
        let mut mapping = self
            .tree
            .mapping()
            .unwrap_or_else(|| json!({ "properties": {} }));
        mapping["properties"][CHANNEL_FIELD] = json!({ "type": "keyword" });
        mapping
    }
}
