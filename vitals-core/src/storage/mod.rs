//! Durable storage for closed bins.
//!
//! The collector never writes to storage directly: every bin-close enqueues a
//! [`StoreRecord`] to the [`StorageWriter`], which owns its queue and a
//! periodic retention shrink. Store failures are logged and counted; the
//! in-memory rings stay authoritative.

use crate::error::Result;
use crate::product::Product;
use crate::series::SeriesId;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub mod file;
pub mod sqlite;

pub use file::FileStorage;
pub use sqlite::SqliteStorage;

/// Interval between retention shrink passes.
const SHRINK_INTERVAL: Duration = Duration::from_secs(60);

/// A pluggable bin store. Keys are the series id plus the metric name;
/// values are products. Implementations must upsert on `(name, time)`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Prepare the backend. Called once before the writer starts.
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Persist one closed bin. `closing` marks the final flush of an
    /// in-progress bin on shutdown.
    async fn store(&self, series: &SeriesId, product: &Product, closing: bool) -> Result<()>;

    /// Load all persisted bins for one metric in ascending time order.
    /// A backend with no history for the key returns an empty vector.
    async fn load(&self, series: &SeriesId, name: &str) -> Result<Vec<Product>>;

    /// Delete records older than the series retention horizon. Returns the
    /// number of deleted records.
    async fn shrink(&self, series: &SeriesId) -> Result<u64>;

    /// Flush and release the backend.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// One queued bin-close handoff.
#[derive(Debug, Clone)]
pub struct StoreRecord {
    pub series: SeriesId,
    pub product: Product,
    pub closing: bool,
}

/// Background writer draining the bin-close queue into a [`Storage`].
pub struct StorageWriter {
    tx: mpsc::Sender<StoreRecord>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    errors: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl StorageWriter {
    /// Spawn the writer task. `buffer` matches the collector input buffer.
    pub fn spawn(storage: Arc<dyn Storage>, series: Vec<SeriesId>, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let errors = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(run_writer(storage, series, rx, stop_rx, errors.clone()));
        Self {
            tx,
            stop_tx,
            handle: Mutex::new(Some(handle)),
            errors,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build a bin-close listener that enqueues products for `series`.
    /// The listener never blocks; when the queue is full the record is
    /// dropped with a counted event.
    pub fn listener(&self, series: &SeriesId) -> crate::timeseries::BinCloseListener {
        let tx = self.tx.clone();
        let series = series.clone();
        let dropped = self.dropped.clone();
        Box::new(move |product, closing| {
            let record =
                StoreRecord { series: series.clone(), product: product.clone(), closing };
            if tx.try_send(record).is_err() {
                dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("vitals_storage_dropped_total").increment(1);
            }
        })
    }

    /// Store failures observed so far.
    pub fn store_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Records dropped because the queue was full.
    pub fn dropped_records(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Signal the writer, wait for the queue to drain and the backend to
    /// close.
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Storage writer task failed");
            }
        }
    }
}

async fn run_writer(
    storage: Arc<dyn Storage>,
    series: Vec<SeriesId>,
    mut rx: mpsc::Receiver<StoreRecord>,
    mut stop_rx: watch::Receiver<bool>,
    errors: Arc<AtomicU64>,
) {
    let mut shrink = tokio::time::interval_at(
        tokio::time::Instant::now() + SHRINK_INTERVAL,
        SHRINK_INTERVAL,
    );
    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                // Drain everything enqueued before the stop signal.
                while let Ok(record) = rx.try_recv() {
                    write_record(&*storage, &record, &errors).await;
                }
                break;
            }
            maybe = rx.recv() => match maybe {
                Some(record) => write_record(&*storage, &record, &errors).await,
                None => break,
            },
            _ = shrink.tick() => {
                for id in &series {
                    match storage.shrink(id).await {
                        Ok(0) => {}
                        Ok(n) => debug!(series = %id, deleted = n, "Shrank stored history"),
                        Err(e) => warn!(series = %id, error = %e, "Retention shrink failed"),
                    }
                }
            }
        }
    }
    if let Err(e) = storage.close().await {
        warn!(error = %e, "Failed to close storage");
    }
}

async fn write_record(storage: &dyn Storage, record: &StoreRecord, errors: &AtomicU64) {
    if let Err(e) = storage.store(&record.series, &record.product, record.closing).await {
        errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vitals_storage_errors_total").increment(1);
        warn!(
            series = %record.series,
            name = %record.product.name,
            error = %e,
            "Failed to store closed bin"
        );
    }
}
