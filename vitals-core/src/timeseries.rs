//! Fixed-capacity time-series ring at one resolution.
//!
//! A [`TimeSeries`] keeps up to `max_count - 1` closed bins plus the bin
//! currently being aggregated. Sample timestamps are unix milliseconds; the
//! owning bin is `floor(t / period) * period`. Closing a bin emits a
//! [`Product`] to the registered listener before any sample of the following
//! bin is folded.

use crate::kind::MetricType;
use crate::product::Product;
use crate::value::BinValue;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Convert a wall-clock instant to unix milliseconds.
pub fn unix_ms(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// One aggregated bin: start timestamp plus the typed aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBin {
    /// Bin start, unix milliseconds, always a multiple of the ring period.
    pub start: i64,
    pub value: BinValue,
}

/// Read-only copy of a ring: closed bins followed by the in-progress bin.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSnapshot {
    /// Bin start timestamps, non-decreasing, unix milliseconds.
    pub times: Vec<i64>,
    /// Aggregates matching `times` pairwise.
    pub values: Vec<BinValue>,
    #[serde(with = "crate::product::duration_ms", rename = "period_ms")]
    pub period: Duration,
    pub max_count: usize,
}

impl SeriesSnapshot {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Extract one statistic across all bins, e.g. "avg" or "p99".
    /// Falls back to the kind's default statistic for unknown names.
    pub fn field_values(&self, field: &str) -> Vec<f64> {
        self.values
            .iter()
            .map(|v| {
                v.field(field).or_else(|| v.field(v.default_field())).unwrap_or_default()
            })
            .collect()
    }
}

/// Callback invoked with the product of every closed bin. The flag is true
/// only for the final flush of an in-progress bin on shutdown.
pub type BinCloseListener = Box<dyn Fn(&Product, bool) + Send + Sync>;

/// Circular buffer of closed bins plus the current bin for one resolution.
pub struct TimeSeries {
    name: String,
    metric_type: MetricType,
    period: Duration,
    period_ms: i64,
    max_count: usize,
    closed: VecDeque<TimeBin>,
    current: Option<TimeBin>,
    listener: Option<BinCloseListener>,
    late_samples: u64,
    dropped_samples: u64,
}

impl TimeSeries {
    /// Create an empty ring. `period` and `max_count` are assumed validated
    /// by [`crate::series::SeriesId`].
    pub fn new(period: Duration, max_count: usize, metric_type: MetricType) -> Self {
        Self {
            name: String::new(),
            metric_type,
            period,
            period_ms: period.as_millis() as i64,
            max_count,
            closed: VecDeque::with_capacity(max_count.saturating_sub(1)),
            current: None,
            listener: None,
            late_samples: 0,
            dropped_samples: 0,
        }
    }

    /// Set the fully qualified metric name used in emitted products.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Register the bin-close listener. Listeners run synchronously on the
    /// dispatcher and must not block.
    pub fn set_listener(&mut self, listener: BinCloseListener) {
        self.listener = Some(listener);
    }

    pub fn interval(&self) -> Duration {
        self.period
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn metric_type(&self) -> &MetricType {
        &self.metric_type
    }

    /// Samples clamped into the current bin because they arrived late.
    pub fn late_samples(&self) -> u64 {
        self.late_samples
    }

    /// Samples older than the earliest retained bin, discarded entirely.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    fn bin_start(&self, t_ms: i64) -> i64 {
        (t_ms / self.period_ms) * self.period_ms
    }

    /// Fold one sample taken at `t_ms` into the ring, rolling the current
    /// bin over when `t_ms` falls past its boundary. Returns the product of
    /// the bin that closed, if any.
    pub fn add(&mut self, t_ms: i64, sample: f64) -> Option<Product> {
        let start = self.bin_start(t_ms);
        let Some(cur_start) = self.current.as_ref().map(|b| b.start) else {
            let mut value = self.metric_type.zero_value();
            value.fold(sample);
            self.current = Some(TimeBin { start, value });
            return None;
        };
        if start == cur_start {
            if let Some(cur) = &mut self.current {
                cur.value.fold(sample);
            }
            None
        } else if start > cur_start {
            let product = self.roll_over(start);
            if let Some(cur) = &mut self.current {
                cur.value.fold(sample);
            }
            product
        } else {
            // Late sample: clamp into the current bin unless it predates
            // everything the ring still retains.
            let earliest = self.closed.front().map_or(cur_start, |b| b.start);
            if t_ms < earliest {
                self.dropped_samples += 1;
            } else {
                if let Some(cur) = &mut self.current {
                    cur.value.fold(sample);
                }
                self.late_samples += 1;
            }
            None
        }
    }

    /// Close the current bin and open a fresh one at `start`.
    fn roll_over(&mut self, start: i64) -> Option<Product> {
        let product = self.close_current(false);
        self.current = Some(TimeBin { start, value: self.metric_type.zero_value() });
        product
    }

    /// Close the in-progress bin, push it into history and notify the
    /// listener. Used by rollover and by the shutdown flush (`closing`).
    pub fn close_current(&mut self, closing: bool) -> Option<Product> {
        let mut bin = self.current.take()?;
        bin.value.close();
        let product = Product {
            name: self.name.clone(),
            time: bin.start,
            period: self.period,
            value: bin.value.clone(),
        };
        if self.max_count > 1 {
            if self.closed.len() == self.max_count - 1 {
                self.closed.pop_front();
            }
            self.closed.push_back(bin);
        }
        if let Some(listener) = &self.listener {
            listener(&product, closing);
        }
        Some(product)
    }

    /// Seed history from persisted products, bypassing the fold path. Keeps
    /// the most recent `max_count - 1` bins; the current bin stays empty
    /// until the next sample. Records whose aggregate kind does not match
    /// the ring are skipped.
    pub fn restore(&mut self, mut products: Vec<Product>) {
        products.sort_by_key(|p| p.time);
        self.closed.clear();
        self.current = None;
        for pd in products {
            if pd.value.kind() != self.metric_type.kind() {
                tracing::warn!(
                    name = %self.name,
                    expected = self.metric_type.kind(),
                    got = pd.value.kind(),
                    "Skipping stored bin of mismatched kind"
                );
                continue;
            }
            let start = self.bin_start(pd.time);
            if self.closed.back().is_some_and(|b| b.start == start) {
                // Upsert semantics: the later record wins.
                self.closed.pop_back();
            }
            if self.closed.len() == self.max_count - 1 {
                self.closed.pop_front();
            }
            self.closed.push_back(TimeBin { start, value: pd.value });
        }
    }

    /// Copy out the closed bins followed by the current bin.
    pub fn snapshot(&self) -> SeriesSnapshot {
        let mut times = Vec::with_capacity(self.closed.len() + 1);
        let mut values = Vec::with_capacity(self.closed.len() + 1);
        for bin in &self.closed {
            times.push(bin.start);
            values.push(bin.value.clone());
        }
        if let Some(cur) = &self.current {
            times.push(cur.start);
            let mut value = cur.value.clone();
            // Present in-progress histograms with live percentiles.
            value.close();
            values.push(value);
        }
        SeriesSnapshot { times, values, period: self.period, max_count: self.max_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Unit;
    use std::sync::{Arc, Mutex};

    fn counter_ring(period_secs: u64, max_count: usize) -> TimeSeries {
        TimeSeries::new(
            Duration::from_secs(period_secs),
            max_count,
            MetricType::Counter(Unit::Short),
        )
    }

    #[test]
    fn test_rollup_alignment() {
        let mut ts = counter_ring(1, 3);
        for t in [200, 900, 1100, 1400, 2600] {
            ts.add(t, 1.0);
        }
        let snap = ts.snapshot();
        assert_eq!(snap.times, vec![0, 1000, 2000]);
        assert_eq!(snap.values[0], BinValue::Counter { samples: 2, value: 2.0 });
        assert_eq!(snap.values[1], BinValue::Counter { samples: 2, value: 2.0 });
        assert_eq!(snap.values[2], BinValue::Counter { samples: 1, value: 1.0 });
    }

    #[test]
    fn test_history_bounded_and_monotonic() {
        let mut ts = counter_ring(1, 3);
        for t in 0..10 {
            ts.add(t * 1000, 1.0);
        }
        let snap = ts.snapshot();
        // Two closed bins plus current.
        assert_eq!(snap.times, vec![7000, 8000, 9000]);
        assert!(snap.times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_close_emitted_once_per_bin_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut ts = counter_ring(1, 3);
        ts.set_name("test:count");
        let sink = seen.clone();
        ts.set_listener(Box::new(move |pd, closing| {
            sink.lock().unwrap().push((pd.time, closing));
        }));
        for t in [100, 1100, 2100, 3100] {
            ts.add(t, 1.0);
        }
        ts.close_current(true);
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![(0, false), (1000, false), (2000, false), (3000, true)]
        );
    }

    #[test]
    fn test_late_sample_clamped_and_counted() {
        let mut ts = counter_ring(1, 3);
        ts.add(500, 1.0);
        ts.add(2500, 1.0);
        ts.add(1500, 5.0); // late, clamps into the 2s bin
        assert_eq!(ts.late_samples(), 1);
        let snap = ts.snapshot();
        assert_eq!(snap.values.last(), Some(&BinValue::Counter { samples: 2, value: 6.0 }));
    }

    #[test]
    fn test_ancient_sample_dropped() {
        let mut ts = counter_ring(1, 3);
        for t in [100, 5100, 6100, 7100] {
            ts.add(t, 1.0);
        }
        ts.add(200, 9.0); // before the earliest retained bin
        assert_eq!(ts.dropped_samples(), 1);
        assert_eq!(ts.late_samples(), 0);
        let snap = ts.snapshot();
        assert_eq!(snap.values.last(), Some(&BinValue::Counter { samples: 1, value: 1.0 }));
    }

    #[test]
    fn test_restore_then_sample() {
        let mut ts = counter_ring(1, 3);
        let stored = vec![
            Product {
                name: "test:count".to_string(),
                time: 1000,
                period: Duration::from_secs(1),
                value: BinValue::Counter { samples: 2, value: 2.0 },
            },
            Product {
                name: "test:count".to_string(),
                time: 2000,
                period: Duration::from_secs(1),
                value: BinValue::Counter { samples: 1, value: 1.0 },
            },
        ];
        ts.restore(stored);
        let snap = ts.snapshot();
        assert_eq!(snap.times, vec![1000, 2000]);

        ts.add(3200, 1.0);
        let snap = ts.snapshot();
        assert_eq!(snap.times, vec![1000, 2000, 3000]);
        assert_eq!(snap.values[2], BinValue::Counter { samples: 1, value: 1.0 });
    }

    #[test]
    fn test_meter_bin_summary() {
        let mut ts =
            TimeSeries::new(Duration::from_secs(1), 3, MetricType::Meter(Unit::Short));
        for s in [10.0, 20.0, 30.0] {
            ts.add(500, s);
        }
        let pd = ts.close_current(true).unwrap();
        assert_eq!(
            pd.value,
            BinValue::Meter { samples: 3, sum: 60.0, first: 10.0, last: 30.0, min: 10.0, max: 30.0 }
        );
    }
}
