//! Periodic snapshot exporter.
//!
//! Iterates the collector's published names on a fixed cadence, snapshots
//! each configured resolution and hands the result to every registered
//! export output whose filter matches. Export errors surface on
//! [`Exporter::last_error`] and never halt the loop.

use crate::collector::Collector;
use crate::error::Result;
use crate::filter::Filter;
use crate::timeseries::SeriesSnapshot;
use crate::unit::Unit;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

/// One exported snapshot with its display metadata.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Metric name suffixed with the resolution index, e.g. `vitals:cpu:percent:0`.
    pub name: String,
    /// Metric name without the index suffix.
    pub metric: String,
    /// Series title, e.g. "2 min.".
    pub title: String,
    pub unit: Unit,
    pub snapshot: SeriesSnapshot,
}

/// A sink for periodic snapshots (e.g. the SVG file renderer).
pub trait ExportOutput: Send + Sync {
    fn export(&self, req: &ExportRequest) -> Result<()>;
}

struct ExportSlot {
    output: Box<dyn ExportOutput>,
    filter: Option<Filter>,
}

struct ExporterInner {
    collector: Collector,
    interval: Duration,
    outputs: Mutex<Vec<ExportSlot>>,
    last_error: Mutex<Option<String>>,
    shutdown: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Periodic exporter loop over a collector's published metrics.
#[derive(Clone)]
pub struct Exporter {
    inner: Arc<ExporterInner>,
}

impl Exporter {
    pub fn new(collector: Collector, interval: Duration) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(ExporterInner {
                collector,
                interval,
                outputs: Mutex::new(Vec::new()),
                last_error: Mutex::new(None),
                shutdown,
                handle: Mutex::new(None),
            }),
        }
    }

    /// Register an export output, optionally behind a metric-name filter.
    pub async fn add_output(&self, output: Box<dyn ExportOutput>, filter: Option<Filter>) {
        self.inner.outputs.lock().await.push(ExportSlot { output, filter });
    }

    /// The most recent export error, if any.
    pub async fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().await.clone()
    }

    pub async fn start(&self) {
        let shutdown = self.inner.shutdown.subscribe();
        let handle = tokio::spawn(run_exporter(self.inner.clone(), shutdown));
        *self.inner.handle.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        let _ = self.inner.shutdown.send(());
        if let Some(handle) = self.inner.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Exporter task failed");
            }
        }
    }

    /// Export every published metric at every resolution once.
    pub async fn export_all(&self) {
        let names = self.inner.collector.publish_names().await;
        let series = self.inner.collector.series_ids().to_vec();
        for name in names {
            let unit = match self.inner.collector.metric_type(&name).await {
                Ok(t) => t.unit(),
                Err(_) => continue,
            };
            for (index, id) in series.iter().enumerate() {
                let snapshot = match self.inner.collector.snapshot(&name, index).await {
                    Ok(s) if !s.is_empty() => s,
                    _ => continue,
                };
                let req = ExportRequest {
                    name: format!("{name}:{index}"),
                    metric: name.clone(),
                    title: id.title().to_string(),
                    unit,
                    snapshot,
                };
                let outputs = self.inner.outputs.lock().await;
                for slot in outputs.iter() {
                    if slot.filter.as_ref().is_some_and(|f| !f.matches(&name)) {
                        continue;
                    }
                    if let Err(e) = slot.output.export(&req) {
                        warn!(name = %req.name, error = %e, "Export failed");
                        *self.inner.last_error.lock().await = Some(e.to_string());
                    }
                }
            }
        }
    }
}

async fn run_exporter(inner: Arc<ExporterInner>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(inner.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;
    let exporter = Exporter { inner: inner.clone() };
    loop {
        tokio::select! {
            _ = ticker.tick() => exporter.export_all().await,
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gather::Gather;
    use crate::kind::MetricType;
    use crate::series::SeriesId;
    use std::sync::Mutex as StdMutex;

    struct Sink(Arc<StdMutex<Vec<String>>>);

    impl ExportOutput for Sink {
        fn export(&self, req: &ExportRequest) -> Result<()> {
            self.0.lock().unwrap().push(req.name.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_exports_every_name_and_resolution() {
        let collector = Collector::builder()
            .series(SeriesId::new("1s", "1 sec.", Duration::from_secs(1), 3).unwrap())
            .series(SeriesId::new("2s", "2 sec.", Duration::from_secs(2), 3).unwrap())
            .build()
            .unwrap();
        collector.start().await.unwrap();

        let mut g = Gather::new("test", 100);
        g.add("a:b", 1.0, MetricType::Counter(crate::unit::Unit::Short));
        collector.sender().send(g).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let exporter = Exporter::new(collector.clone(), Duration::from_secs(60));
        exporter.add_output(Box::new(Sink(seen.clone())), None).await;
        exporter.export_all().await;

        assert_eq!(*seen.lock().unwrap(), vec!["a:b:0".to_string(), "a:b:1".to_string()]);
        assert!(exporter.last_error().await.is_none());
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_export_errors_surface_without_halting() {
        struct Failing;
        impl ExportOutput for Failing {
            fn export(&self, _req: &ExportRequest) -> Result<()> {
                Err(crate::error::VitalsError::Internal("sink offline".to_string()))
            }
        }

        let collector = Collector::builder()
            .series(SeriesId::new("1s", "1 sec.", Duration::from_secs(1), 3).unwrap())
            .build()
            .unwrap();
        collector.start().await.unwrap();
        let mut g = Gather::new("test", 100);
        g.add("a:b", 1.0, MetricType::Counter(crate::unit::Unit::Short));
        collector.sender().send(g).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let exporter = Exporter::new(collector.clone(), Duration::from_secs(60));
        exporter.add_output(Box::new(Failing), None).await;
        exporter.export_all().await;

        assert_eq!(exporter.last_error().await.as_deref(), Some("Internal error: sink offline"));
        collector.stop().await;
    }
}
