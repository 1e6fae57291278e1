use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;
use crate::shared::base::require_non_empty;

/// Identifies the durable log stream and the consumer-group membership used to read it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StreamConfig {
    /// Stream key in the durable log.
    #[serde(default = "default_name")]
    pub name: String,
    /// Consumer group reading the stream.
    #[serde(default = "default_group")]
    pub group: String,
    /// Name of this consumer inside the group.
    #[serde(default = "default_consumer")]
    pub consumer: String,
}

impl StreamConfig {
    pub const DEFAULT_NAME: &'static str = "logs:stream";

    pub const DEFAULT_GROUP: &'static str = "log-processors";

    pub const DEFAULT_CONSUMER: &'static str = "processor-1";

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("stream.name", &self.name)?;
        require_non_empty("stream.group", &self.group)?;
        require_non_empty("stream.consumer", &self.consumer)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            group: default_group(),
            consumer: default_consumer(),
        }
    }
}

fn default_name() -> String {
    StreamConfig::DEFAULT_NAME.to_owned()
}

fn default_group() -> String {
    StreamConfig::DEFAULT_GROUP.to_owned()
}

fn default_consumer() -> String {
    StreamConfig::DEFAULT_CONSUMER.to_owned()
}
