//! File-backed storage: one newline-delimited JSON file per metric and
//! series, append-only, truncated by the retention shrink.

use crate::error::Result;
use crate::product::Product;
use crate::series::SeriesId;
use crate::storage::Storage;
use crate::timeseries::unix_ms;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

/// Stores products under `<dir>/<name>__<series>.ndjson` with `:` in metric
/// names flattened to `_`.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_path(&self, series: &SeriesId, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}__{}.ndjson", series.id()))
    }

    fn read_products(path: &Path) -> Result<Vec<Product>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut products = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Product>(&line) {
                Ok(pd) => products.push(pd),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable record")
                }
            }
        }
        Ok(products)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn open(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    async fn store(&self, series: &SeriesId, product: &Product, _closing: bool) -> Result<()> {
        let path = self.file_path(series, &product.name);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let line = serde_json::to_string(product)
            .map_err(|e| crate::error::VitalsError::storage(e))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    async fn load(&self, series: &SeriesId, name: &str) -> Result<Vec<Product>> {
        let path = self.file_path(series, name);
        let products = Self::read_products(&path)?;
        // The append-only log can hold several records per bin (closing
        // flush followed by the real close); the latest record wins.
        let mut by_time: BTreeMap<i64, Product> = BTreeMap::new();
        for pd in products.into_iter().filter(|p| p.name == name) {
            by_time.insert(pd.time, pd);
        }
        Ok(by_time.into_values().collect())
    }

    async fn shrink(&self, series: &SeriesId) -> Result<u64> {
        let suffix = format!("__{}.ndjson", series.id());
        let cutoff = unix_ms(SystemTime::now()) - series.retention().as_millis() as i64;
        let mut deleted = 0u64;
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if !path.file_name().is_some_and(|n| n.to_string_lossy().ends_with(&suffix)) {
                continue;
            }
            let products = Self::read_products(&path)?;
            let kept: Vec<&Product> = products.iter().filter(|p| p.time >= cutoff).collect();
            if kept.len() == products.len() {
                continue;
            }
            deleted += (products.len() - kept.len()) as u64;
            let mut file = File::create(&path)?;
            for pd in kept {
                let line = serde_json::to_string(pd)
                    .map_err(|e| crate::error::VitalsError::storage(e))?;
                writeln!(file, "{line}")?;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::BinValue;
    use std::time::Duration;

    fn product(name: &str, time: i64, value: f64) -> Product {
        Product {
            name: name.to_string(),
            time,
            period: Duration::from_secs(1),
            value: BinValue::Counter { samples: 1, value },
        }
    }

    #[tokio::test]
    async fn test_store_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.open().await.unwrap();
        let series = SeriesId::new("1s", "1 sec.", Duration::from_secs(1), 3).unwrap();

        for t in [2000, 0, 1000] {
            storage.store(&series, &product("a:b", t, t as f64), false).await.unwrap();
        }
        let loaded = storage.load(&series, "a:b").await.unwrap();
        assert_eq!(loaded.iter().map(|p| p.time).collect::<Vec<_>>(), vec![0, 1000, 2000]);
    }

    #[tokio::test]
    async fn test_load_upserts_duplicate_bins() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.open().await.unwrap();
        let series = SeriesId::new("1s", "1 sec.", Duration::from_secs(1), 3).unwrap();

        // Closing flush followed by the final close of the same bin.
        storage.store(&series, &product("a:b", 1000, 1.0), true).await.unwrap();
        storage.store(&series, &product("a:b", 1000, 2.0), false).await.unwrap();

        let loaded = storage.load(&series, "a:b").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].value, BinValue::Counter { samples: 1, value: 2.0 });
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.open().await.unwrap();
        let series = SeriesId::new("1s", "1 sec.", Duration::from_secs(1), 3).unwrap();
        assert!(storage.load(&series, "no:such").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shrink_drops_expired_records() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.open().await.unwrap();
        let series = SeriesId::new("1s", "1 sec.", Duration::from_secs(1), 3).unwrap();

        let now = unix_ms(SystemTime::now());
        storage.store(&series, &product("a:b", now - 3_600_000, 1.0), false).await.unwrap();
        storage.store(&series, &product("a:b", now, 2.0), false).await.unwrap();

        let deleted = storage.shrink(&series).await.unwrap();
        assert_eq!(deleted, 1);
        let loaded = storage.load(&series, "a:b").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].time, now);
    }
}
