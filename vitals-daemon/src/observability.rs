//! Observability infrastructure: tracing and optional Prometheus export.
//!
//! Must be initialized once at daemon startup before any other subsystem.

use anyhow::Context;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Logs go to stdout, to `log_file`, or to both. `RUST_LOG` overrides
/// `log_level`. When `VITALS_PROMETHEUS_ADDR` is set, a Prometheus scrape
/// endpoint for the `metrics` facade counters is installed there.
pub fn init(log_level: &str, log_file: Option<&Path>, log_stdout: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .context("invalid log level")?;

    let file_layer = match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };
    let stdout_layer = (log_stdout || log_file.is_none())
        .then(|| tracing_subscriber::fmt::layer().with_target(true).with_level(true));

    tracing_subscriber::registry().with(filter).with(file_layer).with(stdout_layer).init();

    if let Ok(addr) = std::env::var("VITALS_PROMETHEUS_ADDR") {
        let addr: std::net::SocketAddr =
            addr.parse().context("invalid VITALS_PROMETHEUS_ADDR")?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        tracing::info!(%addr, "Prometheus exporter listening");
    }

    Ok(())
}
