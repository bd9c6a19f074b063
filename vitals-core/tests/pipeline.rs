//! End-to-end pipeline tests: a collector fed through its gather channel,
//! with durable storage underneath, behaving like one long-running process
//! across restarts.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use vitals_core::timeseries::unix_ms;
use vitals_core::{
    BinValue, Collector, FileStorage, Gather, Input, MetricType, Product, Result, SeriesId,
    SqliteStorage, Storage, Unit,
};

fn series_1s() -> SeriesId {
    SeriesId::new("1s", "1 sec.", Duration::from_secs(1), 3).unwrap()
}

fn counter_gather(t_ms: i64, value: f64) -> Gather {
    let mut g = Gather::new("bench", t_ms);
    g.add("app:events", value, MetricType::Counter(Unit::Short));
    g
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Scenario: two closed bins already in storage; a fresh collector restores
/// them and a new sample opens a correctly aligned current bin.
async fn check_restart_continuity(storage: Arc<dyn Storage>) {
    let id = series_1s();
    // Two closed bins, aligned a few seconds in the past.
    let base = (unix_ms(SystemTime::now()) / 1000) * 1000 - 10_000;
    storage.open().await.unwrap();
    for (offset, value) in [(0i64, 2.0), (1000, 3.0)] {
        let pd = Product {
            name: "app:events".to_string(),
            time: base + offset,
            period: Duration::from_secs(1),
            value: BinValue::Counter { samples: 1, value },
        };
        storage.store(&id, &pd, false).await.unwrap();
    }

    let collector =
        Collector::builder().series(id.clone()).storage(storage).build().unwrap();
    collector.start().await.unwrap();
    collector.sender().send(counter_gather(base + 3100, 7.0)).await.unwrap();
    settle().await;

    let snap = collector.snapshot("app:events", 0).await.unwrap();
    assert_eq!(snap.times, vec![base, base + 1000, base + 3000]);
    assert_eq!(snap.values[0], BinValue::Counter { samples: 1, value: 2.0 });
    assert_eq!(snap.values[1], BinValue::Counter { samples: 1, value: 3.0 });
    assert_eq!(snap.values[2], BinValue::Counter { samples: 1, value: 7.0 });
    collector.stop().await;
}

#[tokio::test]
async fn test_restart_continuity_with_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    check_restart_continuity(Arc::new(FileStorage::new(dir.path()))).await;
}

#[tokio::test]
async fn test_restart_continuity_with_sqlite_storage() {
    let dir = tempfile::tempdir().unwrap();
    check_restart_continuity(Arc::new(SqliteStorage::new(dir.path().join("vitals.db")))).await;
}

/// Property: stop-then-restart yields the same snapshot a long-running
/// process would have, modulo the in-progress bin boundary.
#[tokio::test]
async fn test_stop_then_restart_matches_uninterrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let base = (unix_ms(SystemTime::now()) / 1000) * 1000 - 20_000;

    let first = Collector::builder()
        .series(series_1s())
        .storage(Arc::new(FileStorage::new(dir.path())))
        .build()
        .unwrap();
    first.start().await.unwrap();
    for (offset, value) in [(100i64, 1.0), (1100, 2.0), (2100, 3.0)] {
        first.sender().send(counter_gather(base + offset, value)).await.unwrap();
    }
    settle().await;
    // Stop flushes the in-progress bin at base+2000 with closing=true.
    first.stop().await;

    let second = Collector::builder()
        .series(series_1s())
        .storage(Arc::new(FileStorage::new(dir.path())))
        .build()
        .unwrap();
    second.start().await.unwrap();
    second.sender().send(counter_gather(base + 3100, 4.0)).await.unwrap();
    settle().await;

    let snap = second.snapshot("app:events", 0).await.unwrap();
    // Same bins an uninterrupted run would show: the two oldest fall out of
    // the ring (capacity 3), leaving 1s, 2s (restored) and the new current.
    assert_eq!(snap.times, vec![base + 1000, base + 2000, base + 3000]);
    assert_eq!(snap.values[0], BinValue::Counter { samples: 1, value: 2.0 });
    assert_eq!(snap.values[1], BinValue::Counter { samples: 1, value: 3.0 });
    assert_eq!(snap.values[2], BinValue::Counter { samples: 1, value: 4.0 });
    second.stop().await;
}

struct Pulse {
    calls: Arc<AtomicU64>,
}

#[async_trait]
impl Input for Pulse {
    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        g.add("pulse:beat", 1.0, MetricType::Counter(Unit::Short));
        Ok(())
    }
}

/// The sampler calls each input once per tick, starting one interval after
/// the collector starts.
#[tokio::test]
async fn test_ticking_sampler_gathers_each_interval() {
    let calls = Arc::new(AtomicU64::new(0));
    let collector = Collector::builder().series(series_1s()).prefix("vitals").build().unwrap();
    collector.add_input("pulse", Box::new(Pulse { calls: calls.clone() })).await.unwrap();
    collector.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(2300)).await;
    collector.stop().await;

    let calls = calls.load(Ordering::Relaxed);
    assert!((1..=3).contains(&calls), "expected ~2 ticks, saw {calls}");
    let names = collector.publish_names().await;
    assert_eq!(names, vec!["vitals:pulse:beat".to_string()]);
}

/// Late samples are clamped into the current bin and observable.
#[tokio::test]
async fn test_late_samples_counted() {
    let collector = Collector::builder().series(series_1s()).build().unwrap();
    collector.start().await.unwrap();

    let tx = collector.sender();
    tx.send(counter_gather(500, 1.0)).await.unwrap();
    tx.send(counter_gather(2500, 1.0)).await.unwrap();
    tx.send(counter_gather(1500, 1.0)).await.unwrap();
    settle().await;

    assert_eq!(collector.late_samples().await, 1);
    let snap = collector.snapshot("app:events", 0).await.unwrap();
    assert_eq!(snap.values.last(), Some(&BinValue::Counter { samples: 2, value: 2.0 }));
    collector.stop().await;
}
