//! Aggregation kernels.
//!
//! A [`BinValue`] is the typed aggregate of one time bin. [`BinValue::fold`]
//! reduces one sample into the bin and is allocation-free on the hot path;
//! [`BinValue::close`] finalizes the bin when it rolls over (only histograms
//! do real work there, recomputing percentiles from the reservoir).

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Typed aggregate of one bin. The `type` tag makes persisted and exported
/// records self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BinValue {
    Counter {
        samples: i64,
        value: f64,
    },
    Gauge {
        samples: i64,
        value: f64,
        sum: f64,
    },
    Meter {
        samples: i64,
        sum: f64,
        first: f64,
        last: f64,
        min: f64,
        max: f64,
    },
    Odometer {
        samples: i64,
        first: f64,
        last: f64,
    },
    Histogram {
        samples: i64,
        p: Vec<f64>,
        values: Vec<f64>,
        #[serde(skip)]
        reservoir: Vec<f64>,
        #[serde(skip)]
        reservoir_cap: usize,
    },
}

impl BinValue {
    /// Number of samples folded into this bin.
    pub fn samples(&self) -> i64 {
        match self {
            BinValue::Counter { samples, .. }
            | BinValue::Gauge { samples, .. }
            | BinValue::Meter { samples, .. }
            | BinValue::Odometer { samples, .. }
            | BinValue::Histogram { samples, .. } => *samples,
        }
    }

    /// Stable lowercase tag of this kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BinValue::Counter { .. } => "counter",
            BinValue::Gauge { .. } => "gauge",
            BinValue::Meter { .. } => "meter",
            BinValue::Odometer { .. } => "odometer",
            BinValue::Histogram { .. } => "histogram",
        }
    }

    /// Fold one sample into the bin.
    pub fn fold(&mut self, sample: f64) {
        match self {
            BinValue::Counter { samples, value } => {
                *value += sample;
                *samples += 1;
            }
            BinValue::Gauge { samples, value, sum } => {
                *sum += sample;
                *value = sample;
                *samples += 1;
            }
            BinValue::Meter { samples, sum, first, last, min, max } => {
                if *samples == 0 {
                    *first = sample;
                    *min = sample;
                    *max = sample;
                } else {
                    if sample < *min {
                        *min = sample;
                    }
                    if sample > *max {
                        *max = sample;
                    }
                }
                *last = sample;
                *sum += sample;
                *samples += 1;
            }
            BinValue::Odometer { samples, first, last } => {
                if *samples == 0 {
                    *first = sample;
                }
                *last = sample;
                *samples += 1;
            }
            BinValue::Histogram { samples, reservoir, reservoir_cap, .. } => {
                *samples += 1;
                if reservoir.len() < *reservoir_cap {
                    reservoir.push(sample);
                } else if *reservoir_cap > 0 {
                    // Uniform replacement keeps every sample equally likely
                    // to be retained.
                    let j = rand::thread_rng().gen_range(0..*samples as usize);
                    if j < *reservoir_cap {
                        reservoir[j] = sample;
                    }
                }
            }
        }
    }

    /// Finalize the bin when it closes. Histograms sort their reservoir and
    /// record one value per configured percentile; the reservoir is drained
    /// since a closed bin never folds again.
    pub fn close(&mut self) {
        if let BinValue::Histogram { p, values, reservoir, .. } = self {
            values.clear();
            if reservoir.is_empty() {
                return;
            }
            reservoir.sort_unstable_by(|a, b| a.total_cmp(b));
            let n = reservoir.len();
            for pct in p.iter() {
                let idx = (pct * (n - 1) as f64).floor() as usize;
                values.push(reservoir[idx.min(n - 1)]);
            }
            reservoir.clear();
        }
    }

    /// Read-side view of one named statistic of the bin.
    ///
    /// Unknown names return `None`; histogram percentile fields use the
    /// `p50`/`p90`/`p99` spelling (percentile x1000, trailing zero trimmed).
    pub fn field(&self, name: &str) -> Option<f64> {
        match self {
            BinValue::Counter { samples, value } => match name {
                "value" => Some(*value),
                "samples" => Some(*samples as f64),
                _ => None,
            },
            BinValue::Gauge { samples, value, sum } => match name {
                "value" | "last" => Some(*value),
                "sum" => Some(*sum),
                "avg" => (*samples > 0).then(|| *sum / *samples as f64),
                "samples" => Some(*samples as f64),
                _ => None,
            },
            BinValue::Meter { samples, sum, first, last, min, max } => match name {
                "avg" => (*samples > 0).then(|| *sum / *samples as f64),
                "sum" => Some(*sum),
                "first" => Some(*first),
                "last" => Some(*last),
                "min" => Some(*min),
                "max" => Some(*max),
                "samples" => Some(*samples as f64),
                _ => None,
            },
            BinValue::Odometer { samples, first, last } => match name {
                "first" => Some(*first),
                "last" => Some(*last),
                "diff" => Some(*last - *first),
                "non_negative_diff" => Some((*last - *first).max(0.0)),
                "abs_diff" => Some((*last - *first).abs()),
                "samples" => Some(*samples as f64),
                _ => None,
            },
            BinValue::Histogram { samples, p, values, .. } => {
                if name == "samples" {
                    return Some(*samples as f64);
                }
                p.iter()
                    .zip(values.iter())
                    .find(|(pct, _)| percentile_key(**pct) == name)
                    .map(|(_, v)| *v)
            }
        }
    }

    /// The statistic charted when no field is requested explicitly.
    pub fn default_field(&self) -> &'static str {
        match self {
            BinValue::Counter { .. } | BinValue::Gauge { .. } => "value",
            BinValue::Meter { .. } => "avg",
            BinValue::Odometer { .. } => "non_negative_diff",
            BinValue::Histogram { .. } => "p50",
        }
    }
}

/// Render a percentile as a field key: 0.5 -> "p50", 0.99 -> "p99",
/// 0.999 -> "p999".
pub fn percentile_key(p: f64) -> String {
    let mut k = format!("p{}", (p * 1000.0).round() as i64);
    if k.len() > 2 && k.ends_with('0') {
        k.truncate(k.len() - 1);
    }
    k
}
