use logpipe_config::shared::{IntoConnectOptions, LOGPIPE_MIGRATION_OPTIONS, PgConnectionConfig};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

const NUM_POOL_CONNECTIONS: u32 = 1;

/// Creates the `logs` table and its indexes when they do not exist yet.
pub async fn migrate_sink(connection: &PgConnectionConfig) -> Result<(), sqlx::Error> {
    let options: PgConnectOptions = connection.with_db(Some(&LOGPIPE_MIGRATION_OPTIONS));

    let pool = PgPoolOptions::new()
        .max_connections(NUM_POOL_CONNECTIONS)
        .min_connections(NUM_POOL_CONNECTIONS)
        .connect_with(options)
        .await?;

    let migrator = sqlx::migrate!("./migrations");
    migrator.run(&pool).await?;
    pool.close().await;

    info!(database = %connection.name, "sink schema is up to date");

    Ok(())
}
