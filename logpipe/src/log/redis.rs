use fred::prelude::{
    ClientLike, EventInterface, Pool, ReconnectPolicy, Server, ServerConfig, StreamsInterface,
    TcpConfig,
};
use fred::types::{Builder, Value};
use fred::types::config::UnresponsiveConfig;
use fred::types::streams::XReadResponse;
use futures::future::join_all;
use logpipe_config::shared::RedisConfig;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

use crate::error::{ErrorKind, PipeResult};
use crate::log::LogClient;
use crate::pipe_error;
use crate::types::{RawRecord, RecordId, RecordPayload};

/// Number of pooled connections to the Redis server.
const POOL_SIZE: usize = 2;

/// Prefix of the error Redis returns when a consumer group already exists.
const BUSYGROUP_ERROR_PREFIX: &str = "BUSYGROUP";

/// Stream id meaning "the current tail" when creating a group.
const TAIL_ID: &str = "$";

/// Stream id meaning "the pending entries of this consumer" for `XREADGROUP`.
const PENDING_ID: &str = "0";

/// Stream id meaning "never delivered entries" for `XREADGROUP`.
const NEW_ID: &str = ">";

/// Stream id asking Redis to generate the id on `XADD`.
const AUTO_ID: &str = "*";

/// Durable log backed by Redis Streams.
#[derive(Clone)]
pub struct RedisLog {
    pool: Pool,
}

impl RedisLog {
    /// Connects a pool of clients to the configured Redis server.
    pub async fn connect(config: &RedisConfig) -> PipeResult<Self> {
        let pool = Builder::default_centralized()
            .with_config(|redis_config| {
                redis_config.username = config.username.clone();
                redis_config.password = config
                    .password
                    .as_ref()
                    .map(|password| password.expose_secret().to_owned());
                redis_config.server = ServerConfig::Centralized {
                    server: Server::new(config.host.clone(), config.port),
                };
            })
            .with_connection_config(|connection| {
                connection.internal_command_timeout = Duration::from_secs(5);
                connection.reconnect_on_auth_error = true;
                connection.tcp = TcpConfig {
                    #[cfg(target_os = "linux")]
                    user_timeout: Some(Duration::from_secs(5)),
                    ..Default::default()
                };
                connection.unresponsive = UnresponsiveConfig {
                    max_timeout: Some(Duration::from_secs(10)),
                    interval: Duration::from_secs(3),
                };
            })
            .with_performance_config(|performance| {
                performance.default_command_timeout = Duration::from_secs(5);
            })
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 5000, 2))
            .build_pool(POOL_SIZE)?;

        for client in pool.clients() {
            let mut error_rx = client.error_rx();
            let mut reconnect_rx = client.reconnect_rx();

            tokio::spawn(async move {
                loop {
                    match error_rx.recv().await {
                        Ok((error, server)) => {
                            error!(?server, %error, "redis client error");
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            tokio::spawn(async move {
                loop {
                    match reconnect_rx.recv().await {
                        Ok(server) => debug!(?server, "redis client connected"),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            });
        }

        let connection_handles = pool.connect_pool();
        pool.wait_for_connect().await.map_err(|err| {
            pipe_error!(
                ErrorKind::LogConnectionFailed,
                "Could not connect to redis",
                err.to_string(),
                source: err
            )
        })?;
        tokio::spawn(async move {
            let _results = join_all(connection_handles).await;
        });

        info!(host = %config.host, port = config.port, "connected to redis");

        Ok(Self { pool })
    }

    /// Closes every pooled connection.
    pub async fn quit(&self) -> PipeResult<()> {
        self.pool.quit().await?;
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        id: &'static str,
    ) -> PipeResult<Vec<RawRecord>> {
        let response: XReadResponse<String, String, String, Value> = self
            .pool
            .xreadgroup_map(
                group,
                consumer,
                Some(count as u64),
                None,
                false,
                stream,
                id,
            )
            .await?;

        into_raw_records(response, stream)
    }
}

/// Flattens an `XREADGROUP` response for a single stream into records, keeping server order.
///
/// Field values are taken as raw bytes so that a value which is not valid UTF-8 only fails the
/// decoding of its own record.
fn into_raw_records(
    mut response: XReadResponse<String, String, String, Value>,
    stream: &str,
) -> PipeResult<Vec<RawRecord>> {
    let Some(entries) = response.remove(stream) else {
        return Ok(Vec::new());
    };

    entries
        .into_iter()
        .map(|(id, fields)| {
            let id: RecordId = id.parse().map_err(|err| {
                pipe_error!(
                    ErrorKind::InvalidRecordId,
                    "Log returned an invalid record id",
                    detail = format!("{err}"),
                    source: err
                )
            })?;

            let fields: HashMap<String, Vec<u8>> = fields
                .into_iter()
                .map(|(key, value)| (key, value_bytes(value)))
                .collect();

            Ok(RawRecord::new(id, fields))
        })
        .collect()
}

/// Returns the bytes of a bulk string reply, whether or not it was valid UTF-8.
fn value_bytes(value: Value) -> Vec<u8> {
    match value {
        Value::Bytes(bytes) => bytes.to_vec(),
        Value::String(string) => string.as_bytes().to_vec(),
        other => other.as_string().map(String::into_bytes).unwrap_or_default(),
    }
}

impl LogClient for RedisLog {
    fn name() -> &'static str {
        "redis"
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> PipeResult<()> {
        let result: Result<(), fred::error::Error> =
            self.pool.xgroup_create(stream, group, TAIL_ID, true).await;

        match result {
            Ok(()) => {
                info!(stream, group, "created consumer group");
                Ok(())
            }
            Err(err) if err.details().starts_with(BUSYGROUP_ERROR_PREFIX) => {
                debug!(stream, group, "consumer group already exists");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> PipeResult<Vec<RawRecord>> {
        self.read_group(stream, group, consumer, count, PENDING_ID)
            .await
    }

    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> PipeResult<Vec<RawRecord>> {
        self.read_group(stream, group, consumer, count, NEW_ID).await
    }

    async fn acknowledge(&self, stream: &str, group: &str, record_id: RecordId) -> PipeResult<()> {
        let _acknowledged: i64 = self
            .pool
            .xack(stream, group, record_id.to_string())
            .await?;

        Ok(())
    }

    async fn append(&self, stream: &str, payload: RecordPayload) -> PipeResult<RecordId> {
        let fields: Vec<(String, Vec<u8>)> = payload.into_inner().into_iter().collect();
        let id: String = self
            .pool
            .xadd(stream, false, None::<()>, AUTO_ID, fields)
            .await?;

        id.parse().map_err(|err| {
            pipe_error!(
                ErrorKind::InvalidRecordId,
                "Log returned an invalid record id",
                detail = format!("{err}"),
                source: err
            )
        })
    }

    async fn pending_count(&self, stream: &str, group: &str) -> PipeResult<u64> {
        // The summary form of XPENDING replies with [count, lowest id, highest id, consumers].
        let summary: Vec<Value> = self.pool.xpending(stream, group, ()).await?;

        Ok(summary.first().and_then(Value::as_u64).unwrap_or_default())
    }
}
