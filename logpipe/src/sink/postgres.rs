use logpipe_config::shared::{
    IntoConnectOptions, LOGPIPE_SINK_OPTIONS, PgConnectionConfig, SinkConfig,
};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use crate::error::PipeResult;
use crate::sink::Sink;
use crate::types::LogEvent;

/// Maximum number of bind parameters in a single Postgres statement.
const MAX_BIND_PARAMETERS: usize = u16::MAX as usize;

/// Number of bound columns per inserted row.
const COLUMNS_PER_ROW: usize = 5;

/// Rows per `INSERT` statement, keeping bind parameters under the protocol limit.
const MAX_ROWS_PER_STATEMENT: usize = MAX_BIND_PARAMETERS / COLUMNS_PER_ROW;

/// Sink writing log events to the `logs` table of a Postgres database.
///
/// Every batch is written in one transaction with multi-row `INSERT` statements. The table is
/// created by the processor's migrations.
#[derive(Debug, Clone)]
pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    /// Connects a pool to the configured database.
    pub async fn connect(
        connection: &PgConnectionConfig,
        config: &SinkConfig,
    ) -> PipeResult<Self> {
        let options: PgConnectOptions = connection.with_db(Some(&LOGPIPE_SINK_OPTIONS));

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(
            host = %connection.host,
            database = %connection.name,
            max_connections = config.max_connections,
            "connected to the sink database"
        );

        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Sink for PostgresSink {
    fn name() -> &'static str {
        "postgres"
    }

    async fn shutdown(&self) -> PipeResult<()> {
        self.pool.close().await;
        info!("closed the sink connection pool");

        Ok(())
    }

    async fn batch_insert(&self, events: Vec<LogEvent>) -> PipeResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut transaction = self.pool.begin().await?;

        for chunk in events.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new("insert into logs (ts, app, level, msg, fields) ");

            query_builder.push_values(chunk, |mut row, event| {
                row.push_bind(event.timestamp)
                    .push_bind(&event.application)
                    .push_bind(&event.level)
                    .push_bind(&event.message)
                    .push_bind(event.fields.clone().map(|fields| Json(Value::Object(fields))));
            });

            query_builder.build().execute(&mut *transaction).await?;
        }

        transaction.commit().await?;

        debug!(rows = events.len(), "inserted log events");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_stay_under_the_bind_limit() {
        assert!(MAX_ROWS_PER_STATEMENT * COLUMNS_PER_ROW <= MAX_BIND_PARAMETERS);
        assert_eq!(MAX_ROWS_PER_STATEMENT, 13_107);
    }
}
