use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Batching and scheduling settings of the consumer loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConsumerConfig {
    /// Maximum number of records read and persisted per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of batches allowed in flight before new reads are refused.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    /// Delay between two ticks, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ConsumerConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 50;

    pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 3;

    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

    /// Maximum number of in-flight records, `batch_size * max_concurrent_batches`.
    pub fn backpressure_threshold(&self) -> usize {
        self.batch_size.saturating_mul(self.max_concurrent_batches)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "consumer.batch_size",
                constraint: "must be greater than 0",
            });
        }

        if self.max_concurrent_batches == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "consumer.max_concurrent_batches",
                constraint: "must be greater than 0",
            });
        }

        if self.poll_interval_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "consumer.poll_interval_ms",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    ConsumerConfig::DEFAULT_BATCH_SIZE
}

fn default_max_concurrent_batches() -> usize {
    ConsumerConfig::DEFAULT_MAX_CONCURRENT_BATCHES
}

fn default_poll_interval_ms() -> u64 {
    ConsumerConfig::DEFAULT_POLL_INTERVAL_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ConsumerConfig::default();

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_concurrent_batches, 3);
        assert_eq!(config.backpressure_threshold(), 150);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: ConsumerConfig = serde_json::from_str(r#"{"batch_size": 10}"#).unwrap();

        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_concurrent_batches, 3);
        assert_eq!(config.backpressure_threshold(), 30);
    }

    #[test]
    fn zero_values_are_rejected() {
        let config = ConsumerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue {
                field: "consumer.batch_size",
                constraint: "must be greater than 0",
            })
        );

        let config = ConsumerConfig {
            max_concurrent_batches: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConsumerConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
