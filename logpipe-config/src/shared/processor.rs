use serde::Deserialize;

use crate::Config;
use crate::shared::{
    ConsumerConfig, PgConnectionConfig, RedisConfig, SinkConfig, StreamConfig, ValidationError,
};

/// Complete configuration of the processor service.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Durable log connection.
    pub redis: RedisConfig,
    /// Stream and consumer-group membership.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Batching and scheduling of the consumer loop.
    #[serde(default)]
    pub consumer: ConsumerConfig,
    /// Sink database connection.
    pub database: PgConnectionConfig,
    /// Sink pool settings.
    #[serde(default)]
    pub sink: SinkConfig,
    /// Port of the Prometheus scrape endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl ProcessorConfig {
    pub const DEFAULT_METRICS_PORT: u16 = 9000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.redis.validate()?;
        self.stream.validate()?;
        self.consumer.validate()?;
        self.database.validate()?;
        self.sink.validate()
    }
}

impl Config for ProcessorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

fn default_metrics_port() -> u16 {
    ProcessorConfig::DEFAULT_METRICS_PORT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_uses_defaults() {
        let config: ProcessorConfig = serde_json::from_str(
            r#"{
                "redis": {"host": "127.0.0.1", "port": 6379},
                "database": {"host": "localhost", "port": 5432, "name": "logs", "username": "postgres"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.stream, StreamConfig::default());
        assert_eq!(config.stream.name, "logs:stream");
        assert_eq!(config.stream.group, "log-processors");
        assert_eq!(config.stream.consumer, "processor-1");
        assert_eq!(config.consumer, ConsumerConfig::default());
        assert_eq!(config.sink.max_connections, 5);
        assert_eq!(config.metrics_port, 9000);
        assert!(!config.database.tls.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_consumer_name_is_rejected() {
        let mut config: ProcessorConfig = serde_json::from_str(
            r#"{
                "redis": {"host": "127.0.0.1", "port": 6379},
                "database": {"host": "localhost", "port": 5432, "name": "logs", "username": "postgres"}
            }"#,
        )
        .unwrap();
        config.stream.consumer = " ".to_owned();

        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue {
                field: "stream.consumer",
                constraint: "must not be empty",
            })
        );
    }
}
