//! Search index replicator binary.
//!
//! Loads the configuration, initializes tracing and runs every configured channel, either
//! once or on a fixed interval until the process is asked to stop.

use std::process::ExitCode;

use ::config::shared::ReplicatorConfig;
use telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_replicator_config;
use crate::core::start_replicator_with_config;
use crate::error::{ReplicatorError, ReplicatorResult};

mod config;
mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> ReplicatorResult<()> {
    let replicator_config = load_replicator_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(ReplicatorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(replicator_config))
}

async fn async_main(replicator_config: ReplicatorConfig) -> ReplicatorResult<()> {
    if let Err(err) = start_replicator_with_config(replicator_config).await {
        error!(category = err.category(), "{err}");
        return Err(err);
    }

    Ok(())
}
