use std::collections::BTreeMap;
use std::time::Duration;

use ::config::shared::{ClusterConfig, ReplicatorConfig};
use etl::destination::SearchIndex;
use etl::destination::elasticsearch::ElasticsearchClient;
use etl::pipeline::{Pipeline, PipelineReport};
use etl::source::RelationalSource;
use etl::source::postgres::PostgresSource;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::ReplicatorResult;

/// Starts the replicator with the provided configuration.
///
/// Opens a lazily connecting pool per datasource and runs every channel against its
/// Elasticsearch cluster. With `run_once` set, a single run is made and any channel failure
/// becomes the result; otherwise runs repeat until SIGINT or SIGTERM.
pub async fn start_replicator_with_config(
    replicator_config: ReplicatorConfig,
) -> ReplicatorResult<()> {
    let sources: BTreeMap<String, PostgresSource> = replicator_config
        .datasources
        .iter()
        .map(|(name, datasource)| {
            (
                name.clone(),
                PostgresSource::connect_lazy(&datasource.connection),
            )
        })
        .collect();

    let run_once = replicator_config.run_once;
    let run_interval = Duration::from_secs(replicator_config.run_interval_secs);
    info!(
        datasources = sources.len(),
        channels = replicator_config.channels.len(),
        run_once,
        "starting replicator"
    );

    let pipeline = Pipeline::new(
        replicator_config,
        sources,
        |_name: &str, cluster: &ClusterConfig| ElasticsearchClient::new(cluster),
    );

    if run_once {
        let report = pipeline.run_channels().await;
        log_report(&report);
        report.into_result()?;
        return Ok(());
    }

    run_until_shutdown(&pipeline, run_interval).await
}

/// Runs the channels every `run_interval` until a shutdown signal arrives.
///
/// A run that overlaps the next tick delays it. A signal received mid-run abandons the run;
/// checkpoints only ever record persisted documents so the next start resumes from them.
async fn run_until_shutdown<S, I, F>(
    pipeline: &Pipeline<S, F>,
    run_interval: Duration,
) -> ReplicatorResult<()>
where
    S: RelationalSource,
    I: SearchIndex,
    F: Fn(&str, &ClusterConfig) -> etl::error::EtlResult<I>,
{
    // Listen for SIGTERM, sent by Kubernetes before SIGKILL during pod termination.
    let mut sigterm = signal(SignalKind::terminate())?;

    let mut ticker = tokio::time::interval(run_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down replicator");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down replicator");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received during a run, shutting down replicator");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("sigterm received during a run, shutting down replicator");
                return Ok(());
            }
            report = pipeline.run_channels() => log_report(&report),
        }
    }
}

fn log_report(report: &PipelineReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => info!(
                channel = %outcome.channel,
                inserted = summary.inserted_count,
                updated = summary.updated_count,
                failed = summary.failed_count,
                watermark = ?summary.final_watermark,
                "channel synced"
            ),
            Err(err) => warn!(channel = %outcome.channel, error = %err, "channel failed"),
        }
    }
}
