//! vitalsd - the vitals host metrics agent daemon.
//!
//! Loads the TOML configuration, assembles the collector with its inputs,
//! outputs and storage, serves the built-in dashboard and runs until
//! SIGINT/SIGTERM.

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use vitals_core::{AgentConfig, Collector, Exporter, FileStorage, SqliteStorage, Storage};

mod dashboard;
mod health;
mod inputs;
mod observability;
mod outputs;
mod registry;
mod shutdown;

use health::{HealthChecker, HealthStatus};

/// Configuration compiled into the binary, used when no `--config` is given
/// and as the template for `--gen-config`.
const DEFAULT_CONFIG: &str = include_str!("../vitals.toml");

/// vitals host metrics agent
#[derive(Parser, Debug)]
#[command(name = "vitalsd", version, about = "vitals host metrics agent", long_about = None)]
struct Args {
    /// Path to the agent config file (embedded defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the default config with all input/output samples and exit
    /// ("-" for stdout)
    #[arg(long, value_name = "FILE")]
    gen_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to this file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log to stdout in addition to the log file
    #[arg(long)]
    log_stdout: bool,
}

fn build_storage(locator: &str) -> Option<Arc<dyn Storage>> {
    if locator.is_empty() {
        return None;
    }
    if let Some(path) = locator.strip_prefix("sqlite:") {
        Some(Arc::new(SqliteStorage::new(path)))
    } else {
        Some(Arc::new(FileStorage::new(locator)))
    }
}

fn gen_config(target: &PathBuf) -> anyhow::Result<()> {
    let mut out: Box<dyn Write> = if target.as_os_str() == "-" {
        Box::new(std::io::stdout())
    } else {
        Box::new(
            std::fs::File::create(target)
                .with_context(|| format!("cannot create {}", target.display()))?,
        )
    };
    writeln!(out, "{DEFAULT_CONFIG}")?;
    for sample in registry::sample_configs() {
        writeln!(out, "{sample}")?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Some(target) = &args.gen_config {
        return gen_config(target);
    }

    observability::init(&args.log_level, args.log_file.as_deref(), args.log_stdout)?;
    info!(version = env!("CARGO_PKG_VERSION"), "vitals agent starting");

    let content = match &args.config {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?,
        None => DEFAULT_CONFIG.to_string(),
    };
    let config = AgentConfig::from_toml(&content)?;

    let storage = build_storage(&config.data.store);
    let mut builder = Collector::builder()
        .sampling_interval(config.data.sampling_interval)
        .input_buffer(config.data.input_buffer)
        .prefix(&config.data.prefix);
    for id in config.series_ids()? {
        builder = builder.series(id);
    }
    if let Some(filter) = config.routing_filter()? {
        builder = builder.filter(filter);
    }
    if let Some(storage) = &storage {
        builder = builder.storage(storage.clone());
    }
    let collector = builder.build()?;

    let (input_kinds, exports) = registry::load(&content, &collector).await?;
    collector.start().await.context("failed to start collector")?;

    let health = HealthChecker::new();
    health.set("collector", HealthStatus::Healthy, None).await;
    if storage.is_some() {
        health.set("storage", HealthStatus::Healthy, None).await;
    }
    info!(inputs = ?input_kinds, "Collector running");

    let mut exporters = Vec::new();
    for spec in exports {
        let exporter = Exporter::new(collector.clone(), spec.interval);
        exporter.add_output(spec.output, spec.filter).await;
        exporter.start().await;
        exporters.push(exporter);
    }

    let shutdown_tx = shutdown::shutdown_signal();

    let server = if config.http.listen.is_empty() {
        None
    } else {
        let listener = tokio::net::TcpListener::bind(&config.http.listen)
            .await
            .with_context(|| format!("cannot listen on {}", config.http.listen))?;
        let mut dash = dashboard::Dashboard::new(collector.clone(), health.clone());
        if !config.http.dashboard.is_empty() {
            dash.mount_path = config.http.dashboard.clone();
        }
        let app = dash.router();
        let mut rx = shutdown_tx.subscribe();
        info!("Dashboard on {}{}", config.http.adv_addr, config.http.dashboard);
        Some(tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = rx.recv().await;
            });
            if let Err(e) = serve.await {
                warn!(error = %e, "HTTP server failed");
            }
        }))
    };

    let mut rx = shutdown_tx.subscribe();
    let _ = rx.recv().await;
    info!("vitals agent shutting down");

    for exporter in &exporters {
        exporter.stop().await;
    }
    collector.stop().await;
    if let Some(server) = server {
        let _ = server.await;
    }
    info!("vitals agent stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AgentConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.data.prefix, "vitals");
        assert_eq!(config.data.timeseries.len(), 3);
        assert!(config.series_ids().is_ok());
    }

    #[test]
    fn test_build_storage_schemes() {
        assert!(build_storage("").is_none());
        assert!(build_storage("sqlite:/tmp/x.db").is_some());
        assert!(build_storage("/tmp/data").is_some());
    }
}
