use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use crate::Config;
use crate::load::LoadConfigError;
use crate::shared::{BatchConfig, ChannelConfig, ClusterConfig, DatasourceConfig, ValidationError};

/// Complete configuration for the replicator service.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally
/// leaking datasource and cluster secrets into serialized forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReplicatorConfig {
    /// Seconds between the start of two consecutive runs over all channels.
    #[serde(default = "default_run_interval_secs")]
    pub run_interval_secs: u64,
    /// Runs every channel a single time and exits.
    #[serde(default)]
    pub run_once: bool,
    #[serde(default)]
    pub batch: BatchConfig,
    pub datasources: BTreeMap<String, DatasourceConfig>,
    pub clusters: BTreeMap<String, ClusterConfig>,
    /// Index holding one checkpoint document per channel.
    #[serde(default = "default_checkpoint_index")]
    pub checkpoint_index: String,
    #[serde(default = "default_checkpoint_doc_type")]
    pub checkpoint_doc_type: String,
    pub channels: Vec<ChannelConfig>,
}

impl ReplicatorConfig {
    pub const DEFAULT_RUN_INTERVAL_SECS: u64 = 30 * 60;
    pub const DEFAULT_CHECKPOINT_INDEX: &'static str = "etlconfig_";
    pub const DEFAULT_CHECKPOINT_DOC_TYPE: &'static str = "channels_";

    /// Validates the complete replicator configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.batch.validate()?;

        if self.run_interval_secs == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "run_interval_secs".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        for datasource in self.datasources.values() {
            datasource.validate()?;
        }

        for (name, cluster) in &self.clusters {
            cluster.validate(name)?;
        }

        if self.channels.is_empty() {
            return Err(ValidationError::NoChannels);
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.name.as_str()) {
                return Err(ValidationError::DuplicateChannel(channel.name.clone()));
            }

            if !self.datasources.contains_key(&channel.datasource) {
                return Err(ValidationError::UnknownDatasource {
                    channel: channel.name.clone(),
                    datasource: channel.datasource.clone(),
                });
            }

            if !self.clusters.contains_key(&channel.cluster) {
                return Err(ValidationError::UnknownCluster {
                    channel: channel.name.clone(),
                    cluster: channel.cluster.clone(),
                });
            }

            channel.validate()?;
        }

        Ok(())
    }

    /// Loads every channel's `schema_file` into its inline `schema`.
    pub fn resolve_schema_files(&mut self) -> Result<(), LoadConfigError> {
        for channel in &mut self.channels {
            channel.resolve_schema_file()?;
        }

        Ok(())
    }
}

impl Config for ReplicatorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

fn default_run_interval_secs() -> u64 {
    ReplicatorConfig::DEFAULT_RUN_INTERVAL_SECS
}

fn default_checkpoint_index() -> String {
    ReplicatorConfig::DEFAULT_CHECKPOINT_INDEX.to_string()
}

fn default_checkpoint_doc_type() -> String {
    ReplicatorConfig::DEFAULT_CHECKPOINT_DOC_TYPE.to_string()
}
