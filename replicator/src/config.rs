use ::config::load_config;
use ::config::shared::ReplicatorConfig;

use crate::error::{ReplicatorError, ReplicatorResult};

/// Loads the replicator configuration, inlines schema files and validates the result.
pub fn load_replicator_config() -> ReplicatorResult<ReplicatorConfig> {
    let mut config = load_config::<ReplicatorConfig>().map_err(ReplicatorError::config)?;
    config
        .resolve_schema_files()
        .map_err(ReplicatorError::config)?;
    config.validate().map_err(ReplicatorError::config)?;

    Ok(config)
}
