use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::trace;

/// Interval between two upkeep runs of the recorder behind [`init_metrics_handle`].
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

// Handle returned by every call to [`init_metrics_handle`].
//
// A global recorder can be installed only once per process, but tests build the producer
// application many times. Initialization is fallible, so a `Mutex` is used instead of a
// `OnceLock`.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Installs the Prometheus recorder and returns a handle to render it.
///
/// No HTTP listener is started, the caller exposes [`PrometheusHandle::render`] on a route of
/// its own server. Later calls return a clone of the first handle.
pub fn init_metrics_handle() -> Result<PrometheusHandle, BuildError> {
    let mut prometheus_handle = PROMETHEUS_HANDLE
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(handle) = &*prometheus_handle {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *prometheus_handle = Some(handle.clone());

    let upkeep_handle = handle.clone();
    // Without upkeep histograms grow without bound.
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(UPKEEP_INTERVAL).await;
            trace!("running metrics upkeep");
            upkeep_handle.run_upkeep();
        }
    });

    Ok(handle)
}

/// Installs the Prometheus recorder together with an HTTP listener serving `/metrics` on
/// `port`, for binaries without a web server of their own.
///
/// Every metric is labeled with `service`.
pub fn init_metrics(service: &str, port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port))
        .add_global_label("service", service)
        .install()?;

    Ok(())
}
