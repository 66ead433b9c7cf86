use std::collections::BTreeMap;

use config::shared::{ChannelConfig, ClusterConfig, ReplicatorConfig};
use tracing::{Instrument, error, info, info_span};

use crate::bail;
use crate::channel::{Channel, ChannelRunSummary, run_channel};
use crate::destination::{SearchClusterRegistry, SearchIndex};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::query::SqlDialect;
use crate::source::RelationalSource;
use crate::state::CheckpointStore;

/// Result of one channel within a run.
#[derive(Debug)]
pub struct ChannelOutcome {
    pub channel: String,
    pub result: EtlResult<ChannelRunSummary>,
}

/// Results of every configured channel, in configuration order.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<ChannelOutcome>,
}

impl PipelineReport {
    pub fn summary(&self, channel: &str) -> Option<&ChannelRunSummary> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.channel == channel)
            .and_then(|outcome| outcome.result.as_ref().ok())
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .count()
    }

    /// Returns the summaries, or every channel error aggregated when any channel failed.
    pub fn into_result(self) -> EtlResult<Vec<(String, ChannelRunSummary)>> {
        let mut summaries = Vec::with_capacity(self.outcomes.len());
        let mut errors: Vec<EtlError> = Vec::new();

        for outcome in self.outcomes {
            match outcome.result {
                Ok(summary) => summaries.push((outcome.channel, summary)),
                Err(err) => errors.push(err),
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(summaries)
    }
}

/// Runs every configured channel, one after the other.
///
/// Sources are keyed by datasource name. Search cluster clients are created through
/// `connect_index` on first use within a run and released when the run ends.
#[derive(Debug)]
pub struct Pipeline<S, F> {
    config: ReplicatorConfig,
    sources: BTreeMap<String, S>,
    connect_index: F,
    checkpoints: CheckpointStore,
}

impl<S, I, F> Pipeline<S, F>
where
    S: RelationalSource,
    I: SearchIndex,
    F: Fn(&str, &ClusterConfig) -> EtlResult<I>,
{
    pub fn new(config: ReplicatorConfig, sources: BTreeMap<String, S>, connect_index: F) -> Self {
        let checkpoints = CheckpointStore::from_config(&config);

        Self {
            config,
            sources,
            connect_index,
            checkpoints,
        }
    }

    pub fn config(&self) -> &ReplicatorConfig {
        &self.config
    }

    /// Runs each channel once.
    ///
    /// A failing channel does not stop the others; its error is logged and reported in its
    /// outcome.
    pub async fn run_channels(&self) -> PipelineReport {
        let mut registry = SearchClusterRegistry::new(&self.config.clusters, &self.connect_index);
        let mut report = PipelineReport::default();

        info!(channels = self.config.channels.len(), "starting run");

        for config in &self.config.channels {
            let span = info_span!("channel", name = %config.name);
            let result = self
                .run_one(config, &mut registry)
                .instrument(span.clone())
                .await;

            if let Err(err) = &result {
                span.in_scope(|| error!(error = %err, "channel run failed"));
            }

            report.outcomes.push(ChannelOutcome {
                channel: config.name.clone(),
                result,
            });
        }

        registry.release();
        info!(failed = report.failed_count(), "finished run");

        report
    }

    async fn run_one<C>(
        &self,
        config: &ChannelConfig,
        registry: &mut SearchClusterRegistry<'_, I, C>,
    ) -> EtlResult<ChannelRunSummary>
    where
        C: Fn(&str, &ClusterConfig) -> EtlResult<I>,
    {
        let Some(datasource) = self.config.datasources.get(&config.datasource) else {
            bail!(
                ErrorKind::ConfigError,
                "Datasource is not configured",
                config.datasource
            );
        };
        let Some(source) = self.sources.get(&config.datasource) else {
            bail!(
                ErrorKind::ConfigError,
                "Datasource has no source connection",
                config.datasource
            );
        };

        let channel = Channel::resolve(
            config.clone(),
            SqlDialect::new(datasource.dialect.clone()),
            self.config.batch.default_size,
        )?;
        let index = registry.get(&config.cluster)?;

        run_channel(&channel, source, index, &self.checkpoints).await
    }
}
