//! Shared configuration types for the log pipeline services.

mod base;
mod connection;
mod consumer;
mod processor;
mod producer;
mod redis;
mod sink;
mod stream;

pub use base::ValidationError;
pub use connection::{
    IntoConnectOptions, LOGPIPE_MIGRATION_OPTIONS, LOGPIPE_SINK_OPTIONS, PgConnectionConfig,
    PgConnectionOptions, TlsConfig,
};
pub use consumer::ConsumerConfig;
pub use processor::ProcessorConfig;
pub use producer::{ApplicationConfig, ProducerConfig};
pub use redis::RedisConfig;
pub use sink::SinkConfig;
pub use stream::StreamConfig;
