//! vitals core library
//!
//! The measurement pipeline for the vitals host metrics agent: typed
//! aggregation kernels, multi-resolution time-series rings, the sampling
//! collector with its name registry, glob filters, the periodic exporter and
//! durable storage for closed bins.

pub mod collector;
pub mod config;
pub mod error;
pub mod exporter;
pub mod filter;
pub mod gather;
pub mod kind;
pub mod multi;
pub mod product;
pub mod series;
pub mod storage;
pub mod timeseries;
pub mod unit;
pub mod value;

// Re-export commonly used items
pub use collector::{Collector, CollectorBuilder, CollectorStats, Output};
pub use config::AgentConfig;
pub use error::{Result, VitalsError};
pub use exporter::{ExportOutput, ExportRequest, Exporter};
pub use filter::{Filter, Pattern};
pub use gather::{FilteredInput, Gather, Input};
pub use kind::MetricType;
pub use multi::MultiTimeSeries;
pub use product::Product;
pub use series::SeriesId;
pub use storage::{FileStorage, SqliteStorage, Storage};
pub use timeseries::{SeriesSnapshot, TimeSeries};
pub use unit::Unit;
pub use value::BinValue;
