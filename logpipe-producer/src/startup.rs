use std::net::TcpListener;

use actix_web::{App, HttpServer, dev::Server, web};
use logpipe::log::LogClient;
use logpipe::log::redis::RedisLog;
use logpipe_config::shared::{ProducerConfig, StreamConfig};
use logpipe_telemetry::metrics::init_metrics_handle;
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::routes::health_check::health_check;
use crate::routes::logs::publish_log;
use crate::routes::metrics::metrics;

/// Ingestion HTTP server.
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    /// Connects to the log and binds the HTTP listener.
    pub async fn build(config: ProducerConfig) -> anyhow::Result<Self> {
        let log = RedisLog::connect(&config.redis).await?;

        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let server = run(listener, log, config.stream)?;

        info!(port, "producer listening");

        Ok(Self { port, server })
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Runs the server until it receives a shutdown signal.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

/// Registers every route of the producer for the log client `L`.
///
/// The application must provide `Data<L>`, `Data<StreamConfig>` and a
/// `ThinData<PrometheusHandle>`.
pub fn configure_routes<L>(cfg: &mut web::ServiceConfig)
where
    L: LogClient + 'static,
{
    cfg.service(health_check)
        .service(metrics)
        .service(web::resource("/api/logs").route(web::post().to(publish_log::<L>)));
}

/// Creates the HTTP server on `listener`.
pub fn run<L>(listener: TcpListener, log: L, stream: StreamConfig) -> anyhow::Result<Server>
where
    L: LogClient + Send + Sync + 'static,
{
    let prometheus_handle = web::ThinData(init_metrics_handle()?);
    let log = web::Data::new(log);
    let stream = web::Data::new(stream);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(prometheus_handle.clone())
            .app_data(log.clone())
            .app_data(stream.clone())
            .configure(configure_routes::<L>)
    })
    .listen(listener)?
    .run();

    Ok(server)
}
