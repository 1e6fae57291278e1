use serde::Deserialize;

use crate::Config;
use crate::shared::base::require_non_empty;
use crate::shared::{RedisConfig, StreamConfig, ValidationError};

/// Complete configuration of the ingestion service.
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerConfig {
    pub application: ApplicationConfig,
    pub redis: RedisConfig,
    /// Only the stream name is used by the producer.
    #[serde(default)]
    pub stream: StreamConfig,
}

impl ProducerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.application.validate()?;
        self.redis.validate()?;
        require_non_empty("stream.name", &self.stream.name)
    }
}

impl Config for ProducerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    /// Host the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server binds to, `0` picks a random free port.
    pub port: u16,
}

impl ApplicationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("application.host", &self.host)
    }
}
