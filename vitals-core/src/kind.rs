//! Metric type catalog.
//!
//! Every field an input produces is tagged with a [`MetricType`] that selects
//! the aggregation kernel used to fold samples into a bin. The set is closed
//! so that storage, export and rendering can dispatch exhaustively.

use crate::unit::Unit;
use crate::value::BinValue;

/// Default percentile vector recorded by histograms.
pub const DEFAULT_PERCENTILES: &[f64] = &[0.5, 0.9, 0.99];

/// Default histogram reservoir size.
pub const DEFAULT_RESERVOIR: usize = 100;

/// Aggregation kind plus display unit for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricType {
    /// Monotonic per-bin accumulator; samples are added up within the bin.
    Counter(Unit),
    /// Last-wins value with a running sum for the arithmetic mean.
    Gauge(Unit),
    /// Per-bin summary: first/last/min/max/sum.
    Meter(Unit),
    /// Cumulative source counter; the bin keeps only first and last readings
    /// and deltas are derived on the read side.
    Odometer(Unit),
    /// Fixed-percentile recorder backed by a uniform sampling reservoir.
    Histogram { unit: Unit, percentiles: Vec<f64>, reservoir: usize },
}

impl MetricType {
    /// Histogram with the default percentile vector and reservoir size.
    pub fn histogram(unit: Unit) -> Self {
        MetricType::Histogram {
            unit,
            percentiles: DEFAULT_PERCENTILES.to_vec(),
            reservoir: DEFAULT_RESERVOIR,
        }
    }

    /// The display unit of values of this type.
    pub fn unit(&self) -> Unit {
        match self {
            MetricType::Counter(u)
            | MetricType::Gauge(u)
            | MetricType::Meter(u)
            | MetricType::Odometer(u) => *u,
            MetricType::Histogram { unit, .. } => *unit,
        }
    }

    /// Stable lowercase tag used in persisted records and wire formats.
    pub fn kind(&self) -> &'static str {
        match self {
            MetricType::Counter(_) => "counter",
            MetricType::Gauge(_) => "gauge",
            MetricType::Meter(_) => "meter",
            MetricType::Odometer(_) => "odometer",
            MetricType::Histogram { .. } => "histogram",
        }
    }

    /// An empty bin of this kind, ready to fold samples.
    pub fn zero_value(&self) -> BinValue {
        match self {
            MetricType::Counter(_) => BinValue::Counter { samples: 0, value: 0.0 },
            MetricType::Gauge(_) => BinValue::Gauge { samples: 0, value: 0.0, sum: 0.0 },
            MetricType::Meter(_) => BinValue::Meter {
                samples: 0,
                sum: 0.0,
                first: 0.0,
                last: 0.0,
                min: 0.0,
                max: 0.0,
            },
            MetricType::Odometer(_) => BinValue::Odometer { samples: 0, first: 0.0, last: 0.0 },
            MetricType::Histogram { percentiles, reservoir, .. } => BinValue::Histogram {
                samples: 0,
                p: percentiles.clone(),
                values: Vec::new(),
                reservoir: Vec::with_capacity(*reservoir),
                reservoir_cap: *reservoir,
            },
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}
