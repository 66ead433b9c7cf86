use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Connection settings for a search cluster.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterConfig {
    /// Base URL of the cluster's HTTP endpoint, e.g. `http://localhost:9200`.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClusterConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    pub fn validate(&self, name: &str) -> Result<(), ValidationError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("clusters.{name}.url"),
                constraint: "must be an http(s) URL".to_string(),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("clusters.{name}.timeout_secs"),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    ClusterConfig::DEFAULT_TIMEOUT_SECS
}
