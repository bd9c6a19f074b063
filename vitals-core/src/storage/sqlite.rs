//! Relational storage on SQLite.
//!
//! One table per series (`METRIC_<id>`) with one row per `(name, bin start)`,
//! replaced on conflict so the closing flush and the final close of a bin
//! collapse into a single record.

use crate::error::Result;
use crate::product::Product;
use crate::series::SeriesId;
use crate::storage::Storage;
use crate::timeseries::unix_ms;
use crate::value::BinValue;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

/// SQLite-backed [`Storage`].
pub struct SqliteStorage {
    path: PathBuf,
    pool: RwLock<Option<SqlitePool>>,
    tables: RwLock<HashSet<String>>,
}

impl SqliteStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), pool: RwLock::new(None), tables: RwLock::new(HashSet::new()) }
    }

    fn table_name(series: &SeriesId) -> String {
        format!("METRIC_{}", series.id())
    }

    async fn pool(&self) -> Result<SqlitePool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| crate::error::VitalsError::storage("sqlite storage is not open"))
    }

    /// Create the series table on first use.
    async fn ensure_table(&self, pool: &SqlitePool, table: &str) -> Result<()> {
        if self.tables.read().await.contains(table) {
            return Ok(());
        }
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                name TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                type TEXT,
                samples INTEGER,
                value REAL,
                sum REAL,
                first_value REAL,
                last_value REAL,
                min REAL,
                max REAL,
                other TEXT,
                PRIMARY KEY (name, timestamp)
            )
            "#
        ))
        .execute(pool)
        .await?;
        self.tables.write().await.insert(table.to_string());
        Ok(())
    }
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("no such table"))
}

/// Histogram percentiles serialized into the `other` column, keyed by the
/// percentile itself ("0.5", "0.99").
fn histogram_other(p: &[f64], values: &[f64]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = p
        .iter()
        .zip(values.iter())
        .map(|(p, v)| (format!("{p}"), serde_json::json!(v)))
        .collect();
    serde_json::Value::Object(map).to_string()
}

#[async_trait]
impl Storage for SqliteStorage {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn open(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let options = SqliteConnectOptions::from_str(&self.path.to_string_lossy())
            .map_err(crate::error::VitalsError::from)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(2).connect_with(options).await?;
        *self.pool.write().await = Some(pool);
        Ok(())
    }

    async fn store(&self, series: &SeriesId, product: &Product, _closing: bool) -> Result<()> {
        let pool = self.pool().await?;
        let table = Self::table_name(series);
        self.ensure_table(&pool, &table).await?;

        let mut columns = vec!["name", "timestamp", "type"];
        let query = match &product.value {
            BinValue::Counter { .. } => {
                columns.extend(["samples", "value"]);
                build_upsert(&table, &columns)
            }
            BinValue::Gauge { .. } => {
                columns.extend(["samples", "value", "sum"]);
                build_upsert(&table, &columns)
            }
            BinValue::Meter { .. } => {
                columns.extend(["samples", "value", "sum", "first_value", "last_value", "min", "max"]);
                build_upsert(&table, &columns)
            }
            BinValue::Odometer { .. } => {
                columns.extend(["samples", "first_value", "last_value"]);
                build_upsert(&table, &columns)
            }
            BinValue::Histogram { .. } => {
                columns.extend(["samples", "value", "other"]);
                build_upsert(&table, &columns)
            }
        };

        let q = sqlx::query(&query)
            .bind(&product.name)
            .bind(product.time)
            .bind(product.value.kind());
        let q = match &product.value {
            BinValue::Counter { samples, value } => q.bind(*samples).bind(*value),
            BinValue::Gauge { samples, value, sum } => q.bind(*samples).bind(*value).bind(*sum),
            BinValue::Meter { samples, sum, first, last, min, max } => {
                let avg = if *samples > 0 { *sum / *samples as f64 } else { 0.0 };
                q.bind(*samples)
                    .bind(avg)
                    .bind(*sum)
                    .bind(*first)
                    .bind(*last)
                    .bind(*min)
                    .bind(*max)
            }
            BinValue::Odometer { samples, first, last } => {
                q.bind(*samples).bind(*first).bind(*last)
            }
            BinValue::Histogram { samples, p, values, .. } => {
                // The value column carries the median, or the first
                // percentile when no P50 is recorded.
                let median = p
                    .iter()
                    .zip(values.iter())
                    .find(|(pct, _)| **pct == 0.5)
                    .or_else(|| p.iter().zip(values.iter()).next())
                    .map(|(_, v)| *v)
                    .unwrap_or_default();
                q.bind(*samples).bind(median).bind(histogram_other(p, values))
            }
        };
        q.execute(&pool).await?;
        Ok(())
    }

    async fn load(&self, series: &SeriesId, name: &str) -> Result<Vec<Product>> {
        let pool = self.pool().await?;
        let table = Self::table_name(series);
        let rows = match sqlx::query(&format!(
            r#"
            SELECT name, timestamp, type, samples, value, sum,
                   first_value, last_value, min, max, other
            FROM "{table}" WHERE name = ? ORDER BY timestamp ASC
            "#
        ))
        .bind(name)
        .fetch_all(&pool)
        .await
        {
            Ok(rows) => rows,
            Err(e) if is_missing_table(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.get("type");
            let time: i64 = row.get("timestamp");
            let samples: i64 = row.try_get::<Option<i64>, _>("samples")?.unwrap_or_default();
            let value = row.try_get::<Option<f64>, _>("value")?.unwrap_or_default();
            let sum = row.try_get::<Option<f64>, _>("sum")?.unwrap_or_default();
            let first = row.try_get::<Option<f64>, _>("first_value")?.unwrap_or_default();
            let last = row.try_get::<Option<f64>, _>("last_value")?.unwrap_or_default();
            let min = row.try_get::<Option<f64>, _>("min")?.unwrap_or_default();
            let max = row.try_get::<Option<f64>, _>("max")?.unwrap_or_default();

            let value = match kind.as_str() {
                "counter" => BinValue::Counter { samples, value },
                "gauge" => BinValue::Gauge { samples, value, sum },
                "meter" => BinValue::Meter { samples, sum, first, last, min, max },
                "odometer" => BinValue::Odometer { samples, first, last },
                "histogram" => {
                    let other: Option<String> = row.try_get("other")?;
                    let mut pairs: Vec<(f64, f64)> = other
                        .and_then(|text| {
                            serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(
                                &text,
                            )
                            .ok()
                        })
                        .map(|map| {
                            map.iter()
                                .filter_map(|(k, v)| {
                                    Some((k.parse::<f64>().ok()?, v.as_f64()?))
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
                    BinValue::Histogram {
                        samples,
                        p: pairs.iter().map(|(p, _)| *p).collect(),
                        values: pairs.iter().map(|(_, v)| *v).collect(),
                        reservoir: Vec::new(),
                        reservoir_cap: 0,
                    }
                }
                other => {
                    warn!(kind = other, name, "Skipping record of unknown metric type");
                    continue;
                }
            };
            products.push(Product {
                name: row.get("name"),
                time,
                period: series.period(),
                value,
            });
        }
        Ok(products)
    }

    async fn shrink(&self, series: &SeriesId) -> Result<u64> {
        let pool = self.pool().await?;
        let table = Self::table_name(series);
        let cutoff = unix_ms(SystemTime::now()) - series.retention().as_millis() as i64;
        match sqlx::query(&format!(r#"DELETE FROM "{table}" WHERE timestamp < ?"#))
            .bind(cutoff)
            .execute(&pool)
            .await
        {
            Ok(result) => Ok(result.rows_affected()),
            Err(e) if is_missing_table(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) -> Result<()> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
        Ok(())
    }
}

fn build_upsert(table: &str, columns: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        r#"INSERT OR REPLACE INTO "{table}" ({}) VALUES ({placeholders})"#,
        columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn series() -> SeriesId {
        SeriesId::new("1s", "1 sec.", Duration::from_secs(1), 3).unwrap()
    }

    async fn open_storage(dir: &tempfile::TempDir) -> SqliteStorage {
        let storage = SqliteStorage::new(dir.path().join("vitals.db"));
        storage.open().await.unwrap();
        storage
    }

    fn product(time: i64, value: BinValue) -> Product {
        Product { name: "test:field".to_string(), time, period: Duration::from_secs(1), value }
    }

    #[tokio::test]
    async fn test_store_load_round_trip_all_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir).await;
        let id = series();

        let bins = vec![
            product(0, BinValue::Counter { samples: 2, value: 5.0 }),
            product(1000, BinValue::Gauge { samples: 3, value: 7.0, sum: 20.0 }),
            product(
                2000,
                BinValue::Meter {
                    samples: 3,
                    sum: 60.0,
                    first: 10.0,
                    last: 30.0,
                    min: 10.0,
                    max: 30.0,
                },
            ),
            product(3000, BinValue::Odometer { samples: 4, first: 100.0, last: 400.0 }),
            product(
                4000,
                BinValue::Histogram {
                    samples: 100,
                    p: vec![0.5, 0.9],
                    values: vec![50.0, 90.0],
                    reservoir: Vec::new(),
                    reservoir_cap: 0,
                },
            ),
        ];
        for pd in &bins {
            storage.store(&id, pd, false).await.unwrap();
        }

        let loaded = storage.load(&id, "test:field").await.unwrap();
        assert_eq!(loaded, bins);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_replaces_closing_flush() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir).await;
        let id = series();

        storage
            .store(&id, &product(1000, BinValue::Counter { samples: 1, value: 1.0 }), true)
            .await
            .unwrap();
        storage
            .store(&id, &product(1000, BinValue::Counter { samples: 2, value: 2.0 }), false)
            .await
            .unwrap();

        let loaded = storage.load(&id, "test:field").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].value, BinValue::Counter { samples: 2, value: 2.0 });
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_unknown_series_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir).await;
        assert!(storage.load(&series(), "test:field").await.unwrap().is_empty());
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_shrink_deletes_expired_rows() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir).await;
        let id = series();
        let now = unix_ms(SystemTime::now());

        storage
            .store(&id, &product(now - 3_600_000, BinValue::Counter { samples: 1, value: 1.0 }), false)
            .await
            .unwrap();
        storage
            .store(&id, &product(now, BinValue::Counter { samples: 1, value: 1.0 }), false)
            .await
            .unwrap();

        assert_eq!(storage.shrink(&id).await.unwrap(), 1);
        let loaded = storage.load(&id, "test:field").await.unwrap();
        assert_eq!(loaded.len(), 1);
        storage.close().await.unwrap();
    }
}
