//! The collector: sampling scheduler, dispatcher and name map.
//!
//! Two tasks cooperate through the gather channel. The sampler ticks on the
//! sampling interval and calls every input exactly once per tick, pushing the
//! resulting [`Gather`] without ever blocking (a full buffer drops the gather
//! with a counted event). The dispatcher drains the channel, routes fields
//! through the collector filter into their [`MultiTimeSeries`] (created on
//! first sight, seeded from storage when one is configured) and broadcasts
//! bin-close products to the registered outputs.

use crate::error::{Result, VitalsError};
use crate::filter::Filter;
use crate::gather::{Gather, Input};
use crate::kind::MetricType;
use crate::multi::MultiTimeSeries;
use crate::product::Product;
use crate::series::SeriesId;
use crate::storage::{Storage, StorageWriter};
use crate::timeseries::{unix_ms, SeriesSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// A sink for bin-close products registered on the collector.
pub trait Output: Send + Sync {
    /// Handle one closed bin. Must not block the dispatcher; outputs doing
    /// network I/O should queue internally and apply their own timeouts.
    fn process(&self, product: &Product) -> Result<()>;
}

/// Observable counters for events the pipeline swallows by design.
#[derive(Debug, Default)]
pub struct CollectorStats {
    dropped_gathers: AtomicU64,
    gather_errors: AtomicU64,
    duplicate_names: AtomicU64,
    output_errors: AtomicU64,
}

impl CollectorStats {
    /// Gathers dropped because the input buffer was full.
    pub fn dropped_gathers(&self) -> u64 {
        self.dropped_gathers.load(Ordering::Relaxed)
    }

    /// Failed input gather calls.
    pub fn gather_errors(&self) -> u64 {
        self.gather_errors.load(Ordering::Relaxed)
    }

    /// Fields refused because their name was first seen from another input.
    pub fn duplicate_names(&self) -> u64 {
        self.duplicate_names.load(Ordering::Relaxed)
    }

    /// Output process calls that returned an error.
    pub fn output_errors(&self) -> u64 {
        self.output_errors.load(Ordering::Relaxed)
    }
}

/// Builder for [`Collector`].
pub struct CollectorBuilder {
    sampling_interval: Duration,
    input_buffer: usize,
    prefix: String,
    series: Vec<SeriesId>,
    filter: Option<Filter>,
    storage: Option<Arc<dyn Storage>>,
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_secs(1),
            input_buffer: 100,
            prefix: String::new(),
            series: Vec::new(),
            filter: None,
            storage: None,
        }
    }
}

impl CollectorBuilder {
    /// Sampling cadence; values below one second are clamped up to it.
    pub fn sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval.max(Duration::from_secs(1));
        self
    }

    /// Capacity of the gather channel and the storage handoff queue.
    pub fn input_buffer(mut self, buffer: usize) -> Self {
        self.input_buffer = buffer.max(1);
        self
    }

    /// Name prefix prepended to every routed field (`prefix:measure:field`).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Append one time-series resolution.
    pub fn series(mut self, id: SeriesId) -> Self {
        self.series.push(id);
        self
    }

    /// Collector-level routing filter applied to un-prefixed field names.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Durable storage for closed bins.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn build(mut self) -> Result<Collector> {
        if self.series.is_empty() {
            self.series = vec![
                SeriesId::new("2m", "2 min.", Duration::from_secs(2), 60)?,
                SeriesId::new("5h", "5 hours", Duration::from_secs(300), 60)?,
                SeriesId::new("15h", "15 hours", Duration::from_secs(900), 60)?,
            ];
        }
        let mut seen = std::collections::HashSet::new();
        for id in &self.series {
            if !seen.insert(id.id().to_string()) {
                return Err(VitalsError::InvalidConfig {
                    reason: format!("duplicate series id {:?}", id.id()),
                });
            }
        }
        let (gather_tx, gather_rx) = mpsc::channel(self.input_buffer);
        let (shutdown, _) = broadcast::channel(1);
        Ok(Collector {
            inner: Arc::new(Inner {
                sampling_interval: self.sampling_interval,
                input_buffer: self.input_buffer,
                prefix: self.prefix,
                series: self.series,
                filter: self.filter,
                storage: self.storage,
                inputs: Mutex::new(Vec::new()),
                outputs: RwLock::new(Vec::new()),
                table: RwLock::new(HashMap::new()),
                gather_tx,
                gather_rx: Mutex::new(Some(gather_rx)),
                writer: Mutex::new(None),
                shutdown,
                tasks: Mutex::new(Vec::new()),
                stats: CollectorStats::default(),
                started: AtomicBool::new(false),
            }),
        })
    }
}

struct InputSlot {
    label: String,
    input: Box<dyn Input>,
}

struct OutputSlot {
    output: Box<dyn Output>,
    filter: Option<Filter>,
}

#[derive(Clone)]
struct Entry {
    owner: String,
    mts: Arc<RwLock<MultiTimeSeries>>,
}

struct Inner {
    sampling_interval: Duration,
    input_buffer: usize,
    prefix: String,
    series: Vec<SeriesId>,
    filter: Option<Filter>,
    storage: Option<Arc<dyn Storage>>,
    inputs: Mutex<Vec<InputSlot>>,
    outputs: RwLock<Vec<OutputSlot>>,
    table: RwLock<HashMap<String, Entry>>,
    gather_tx: mpsc::Sender<Gather>,
    gather_rx: Mutex<Option<mpsc::Receiver<Gather>>>,
    writer: Mutex<Option<StorageWriter>>,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stats: CollectorStats,
    started: AtomicBool,
}

/// The measurement pipeline owner. Cheap to clone; all clones share the same
/// state.
#[derive(Clone)]
pub struct Collector {
    inner: Arc<Inner>,
}

impl Collector {
    pub fn builder() -> CollectorBuilder {
        CollectorBuilder::default()
    }

    /// Register an input under a diagnostic label. The input's `init` runs
    /// here; registration is refused when it fails.
    pub async fn add_input(
        &self,
        label: impl Into<String>,
        mut input: Box<dyn Input>,
    ) -> Result<()> {
        let label = label.into();
        input.init().map_err(|e| VitalsError::InitFailed {
            input: label.clone(),
            reason: e.to_string(),
        })?;
        self.inner.inputs.lock().await.push(InputSlot { label, input });
        Ok(())
    }

    /// Register an output, optionally behind a name filter.
    pub async fn add_output(&self, output: Box<dyn Output>, filter: Option<Filter>) {
        self.inner.outputs.write().await.push(OutputSlot { output, filter });
    }

    /// The inbound gather channel, for collaborators that push measurements
    /// outside the sampling tick (e.g. HTTP middleware).
    pub fn sender(&self) -> mpsc::Sender<Gather> {
        self.inner.gather_tx.clone()
    }

    /// Configured resolutions, in registration order.
    pub fn series_ids(&self) -> &[SeriesId] {
        &self.inner.series
    }

    pub fn sampling_interval(&self) -> Duration {
        self.inner.sampling_interval
    }

    pub fn stats(&self) -> &CollectorStats {
        &self.inner.stats
    }

    /// Start the sampler and dispatcher tasks (and the storage writer when a
    /// storage is configured). Fails fast when the storage cannot open.
    pub async fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(storage) = &self.inner.storage {
            storage.open().await?;
            let writer = StorageWriter::spawn(
                storage.clone(),
                self.inner.series.clone(),
                self.inner.input_buffer,
            );
            *self.inner.writer.lock().await = Some(writer);
        }
        let mut tasks = self.inner.tasks.lock().await;
        let sampler_shutdown = self.inner.shutdown.subscribe();
        let dispatcher_shutdown = self.inner.shutdown.subscribe();
        tasks.push(tokio::spawn(run_sampler(self.inner.clone(), sampler_shutdown)));
        tasks.push(tokio::spawn(run_dispatcher(self.inner.clone(), dispatcher_shutdown)));
        info!(
            interval = ?self.inner.sampling_interval,
            series = self.inner.series.len(),
            "Collector started"
        );
        Ok(())
    }

    /// Stop the pipeline: signal shutdown, drain the tasks, flush every
    /// in-progress bin with `closing=true`, drain the storage writer and
    /// release the inputs.
    pub async fn stop(&self) {
        if !self.inner.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.shutdown.send(());
        let tasks: Vec<_> = self.inner.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Collector task failed");
            }
        }

        let entries: Vec<Entry> = self.inner.table.read().await.values().cloned().collect();
        for entry in entries {
            let products = entry.mts.write().await.close_all();
            for pd in &products {
                broadcast_product(&self.inner, pd).await;
            }
        }

        if let Some(writer) = self.inner.writer.lock().await.take() {
            writer.shutdown().await;
        }
        for slot in self.inner.inputs.lock().await.iter_mut() {
            slot.input.deinit();
        }
        info!("Collector stopped");
    }

    /// Sorted names of every published metric.
    pub async fn publish_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.table.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot one metric at one resolution index.
    pub async fn snapshot(&self, name: &str, index: usize) -> Result<SeriesSnapshot> {
        let entry = self
            .inner
            .table
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| VitalsError::MetricNotFound { name: name.to_string() })?;
        let snapshot = entry.mts.read().await.snapshot(index)?;
        Ok(snapshot)
    }

    /// The metric type of a published name.
    pub async fn metric_type(&self, name: &str) -> Result<MetricType> {
        let entry = self
            .inner
            .table
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| VitalsError::MetricNotFound { name: name.to_string() })?;
        let metric_type = entry.mts.read().await.metric_type().clone();
        Ok(metric_type)
    }

    /// Late samples clamped across every ring of every metric.
    pub async fn late_samples(&self) -> u64 {
        let entries: Vec<Entry> = self.inner.table.read().await.values().cloned().collect();
        let mut total = 0;
        for entry in entries {
            total += entry.mts.read().await.late_samples();
        }
        total
    }
}

/// Ticks on the sampling interval and gathers every input once per tick.
/// Missed ticks are skipped, never replayed.
async fn run_sampler(inner: Arc<Inner>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(inner.sampling_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await; // the zeroth tick completes immediately
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let time_ms = unix_ms(SystemTime::now());
                let mut inputs = inner.inputs.lock().await;
                for slot in inputs.iter_mut() {
                    let mut gather = Gather::new(&slot.label, time_ms);
                    if let Err(e) = slot.input.gather(&mut gather).await {
                        inner.stats.gather_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(input = %slot.label, error = %e, "Input failed to gather");
                        continue;
                    }
                    for err in gather.errors.drain(..) {
                        inner.stats.gather_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(input = %slot.label, error = %err, "Input reported error");
                    }
                    if gather.fields.is_empty() {
                        continue;
                    }
                    if inner.gather_tx.try_send(gather).is_err() {
                        inner.stats.dropped_gathers.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("vitals_dropped_gathers_total").increment(1);
                        debug!(input = %slot.label, "Gather buffer full, dropping");
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Drains the gather channel and folds fields into their series.
async fn run_dispatcher(inner: Arc<Inner>, mut shutdown: broadcast::Receiver<()>) {
    let Some(mut rx) = inner.gather_rx.lock().await.take() else {
        return;
    };
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(gather) => dispatch(&inner, gather).await,
                None => break,
            },
            _ = shutdown.recv() => {
                // Finish what was already buffered before exiting.
                while let Ok(gather) = rx.try_recv() {
                    dispatch(&inner, gather).await;
                }
                break;
            }
        }
    }
}

async fn dispatch(inner: &Arc<Inner>, gather: Gather) {
    for field in &gather.fields {
        if inner.filter.as_ref().is_some_and(|f| !f.matches(&field.name)) {
            continue;
        }
        let name = if inner.prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}:{}", inner.prefix, field.name)
        };

        let entry = { inner.table.read().await.get(&name).cloned() };
        let entry = match entry {
            Some(entry) => {
                if entry.owner != gather.input {
                    inner.stats.duplicate_names.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        name = %name,
                        owner = %entry.owner,
                        input = %gather.input,
                        "Duplicate metric name from another input, sample refused"
                    );
                    continue;
                }
                entry
            }
            None => create_entry(inner, &gather.input, &name, &field.metric_type).await,
        };

        let products = entry.mts.write().await.add(gather.time_ms, field.value);
        for pd in &products {
            broadcast_product(inner, pd).await;
        }
    }
}

/// First sighting of a field: build its rings, seed them from storage and
/// install the storage handoff listeners.
async fn create_entry(
    inner: &Arc<Inner>,
    owner: &str,
    name: &str,
    metric_type: &MetricType,
) -> Entry {
    let mut mts = MultiTimeSeries::new(name, metric_type.clone(), &inner.series);
    if let Some(storage) = &inner.storage {
        for id in &inner.series {
            match storage.load(id, name).await {
                Ok(products) if !products.is_empty() => {
                    debug!(name, series = %id, bins = products.len(), "Restored history");
                    mts.restore(id, products);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(name, series = %id, error = %e, "Restore failed, starting empty");
                }
            }
        }
    }
    if let Some(writer) = inner.writer.lock().await.as_ref() {
        for id in &inner.series {
            mts.set_listener(id, writer.listener(id));
        }
    }
    let entry = Entry { owner: owner.to_string(), mts: Arc::new(RwLock::new(mts)) };
    inner.table.write().await.insert(name.to_string(), entry.clone());
    entry
}

async fn broadcast_product(inner: &Arc<Inner>, product: &Product) {
    let outputs = inner.outputs.read().await;
    for slot in outputs.iter() {
        if slot.filter.as_ref().is_some_and(|f| !f.matches(&product.name)) {
            continue;
        }
        if let Err(e) = slot.output.process(product) {
            inner.stats.output_errors.fetch_add(1, Ordering::Relaxed);
            warn!(name = %product.name, error = %e, "Output failed to process product");
        }
    }
}
