use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Global batching defaults applied to channels that do not set their own size.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Row limit used for a page of the main fetch when a channel's `batch_size` is unset.
    #[serde(default = "default_batch_size")]
    pub default_size: usize,
}

impl BatchConfig {
    /// Default number of rows fetched per page.
    pub const DEFAULT_SIZE: usize = 50_000;

    /// Ensures the default size is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.default_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    BatchConfig::DEFAULT_SIZE
}
