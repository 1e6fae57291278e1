use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings of the relational sink's connection pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SinkConfig {
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl SinkConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_connections == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "sink.max_connections",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    SinkConfig::DEFAULT_MAX_CONNECTIONS
}
