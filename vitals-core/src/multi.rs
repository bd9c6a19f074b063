//! Fan-out of one field to every configured resolution.

use crate::error::{Result, VitalsError};
use crate::kind::MetricType;
use crate::product::Product;
use crate::series::SeriesId;
use crate::timeseries::{BinCloseListener, SeriesSnapshot, TimeSeries};

/// All per-resolution rings for one field. Every sample is folded into every
/// ring; the rings roll over independently according to their periods.
pub struct MultiTimeSeries {
    name: String,
    metric_type: MetricType,
    rings: Vec<(SeriesId, TimeSeries)>,
}

impl MultiTimeSeries {
    /// Create one ring per series id, all carrying the field's name and type.
    pub fn new(name: impl Into<String>, metric_type: MetricType, series: &[SeriesId]) -> Self {
        let name = name.into();
        let rings = series
            .iter()
            .map(|id| {
                let mut ts = TimeSeries::new(id.period(), id.max_count(), metric_type.clone());
                ts.set_name(name.clone());
                (id.clone(), ts)
            })
            .collect();
        Self { name, metric_type, rings }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metric_type(&self) -> &MetricType {
        &self.metric_type
    }

    pub fn series_count(&self) -> usize {
        self.rings.len()
    }

    pub fn series_ids(&self) -> impl Iterator<Item = &SeriesId> {
        self.rings.iter().map(|(id, _)| id)
    }

    /// Install a bin-close listener on the ring belonging to `series`.
    pub fn set_listener(&mut self, series: &SeriesId, listener: BinCloseListener) {
        if let Some((_, ts)) = self.rings.iter_mut().find(|(id, _)| id == series) {
            ts.set_listener(listener);
        }
    }

    /// Fold one sample into every ring. Returns the products of all bins
    /// that closed during this fold, one per rolled-over ring at most.
    pub fn add(&mut self, t_ms: i64, sample: f64) -> Vec<Product> {
        self.rings.iter_mut().filter_map(|(_, ts)| ts.add(t_ms, sample)).collect()
    }

    /// Flush the in-progress bin of every ring, emitting closing products.
    pub fn close_all(&mut self) -> Vec<Product> {
        self.rings.iter_mut().filter_map(|(_, ts)| ts.close_current(true)).collect()
    }

    /// Snapshot the ring at the given resolution index.
    pub fn snapshot(&self, index: usize) -> Result<SeriesSnapshot> {
        let (_, ts) = self
            .rings
            .get(index)
            .ok_or(VitalsError::IndexOutOfRange { index, len: self.rings.len() })?;
        Ok(ts.snapshot())
    }

    /// Seed the ring belonging to `series` from persisted products.
    pub fn restore(&mut self, series: &SeriesId, products: Vec<Product>) {
        if let Some((_, ts)) = self.rings.iter_mut().find(|(id, _)| id == series) {
            ts.restore(products);
        }
    }

    /// Total late samples clamped across all rings.
    pub fn late_samples(&self) -> u64 {
        self.rings.iter().map(|(_, ts)| ts.late_samples()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Unit;
    use crate::value::BinValue;
    use std::time::Duration;

    fn series(id: &str, secs: u64, count: usize) -> SeriesId {
        SeriesId::new(id, id, Duration::from_secs(secs), count).unwrap()
    }

    #[test]
    fn test_two_resolutions() {
        let ids = [series("1s", 1, 3), series("2s", 2, 3)];
        let mut mts =
            MultiTimeSeries::new("test:count", MetricType::Counter(Unit::Short), &ids);
        for t in [200, 900, 1100, 1400, 2600] {
            mts.add(t, 1.0);
        }

        let fine = mts.snapshot(0).unwrap();
        assert_eq!(fine.times, vec![0, 1000, 2000]);

        let coarse = mts.snapshot(1).unwrap();
        assert_eq!(coarse.times, vec![0, 2000]);
        assert_eq!(coarse.values[0], BinValue::Counter { samples: 4, value: 4.0 });
        assert_eq!(coarse.values[1], BinValue::Counter { samples: 1, value: 1.0 });
    }

    #[test]
    fn test_snapshot_index_out_of_range() {
        let ids = [series("1s", 1, 3)];
        let mts = MultiTimeSeries::new("test:count", MetricType::Counter(Unit::Short), &ids);
        assert!(matches!(
            mts.snapshot(5),
            Err(VitalsError::IndexOutOfRange { index: 5, len: 1 })
        ));
    }

    #[test]
    fn test_close_all_flushes_every_ring() {
        let ids = [series("1s", 1, 3), series("2s", 2, 3)];
        let mut mts =
            MultiTimeSeries::new("test:count", MetricType::Counter(Unit::Short), &ids);
        mts.add(500, 1.0);
        let products = mts.close_all();
        assert_eq!(products.len(), 2);
        assert!(products.iter().all(|p| p.name == "test:count"));
    }
}
