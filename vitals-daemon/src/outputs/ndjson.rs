//! NDJSON output: one flattened JSON record per closed bin, printed to
//! stdout or POSTed to a collecting endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::warn;
use vitals_core::config::duration_str;
use vitals_core::value::percentile_key;
use vitals_core::{BinValue, Output, Product, Result};

const SAMPLE_CONFIG: &str = r#"[output.ndjson]
## POST records here; empty prints to stdout.
# dest_url = "http://127.0.0.1:5654/db/write/TAG"
## Percentile published in VALUE for histograms.
# histogram_value_percentile = 0.5
"#;

/// Config block for the ndjson output.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct NdjsonConfig {
    pub dest_url: String,
    pub histogram_value_percentile: f64,
}

/// Wire record, flattened across all kinds with unpopulated fields omitted.
#[derive(Debug, Default, Serialize)]
struct Record {
    #[serde(rename = "NAME")]
    name: String,
    /// Bin start, unix nanoseconds.
    #[serde(rename = "TIME")]
    time: i64,
    #[serde(rename = "TYPE")]
    kind: String,
    #[serde(rename = "PERIOD")]
    period: String,
    #[serde(rename = "VALUE")]
    value: f64,
    #[serde(rename = "SAMPLES")]
    samples: i64,
    #[serde(rename = "SUM", skip_serializing_if = "is_zero")]
    sum: f64,
    #[serde(rename = "FIRST", skip_serializing_if = "is_zero")]
    first: f64,
    #[serde(rename = "LAST", skip_serializing_if = "is_zero")]
    last: f64,
    #[serde(rename = "MIN", skip_serializing_if = "is_zero")]
    min: f64,
    #[serde(rename = "MAX", skip_serializing_if = "is_zero")]
    max: f64,
    #[serde(rename = "P", skip_serializing_if = "BTreeMap::is_empty")]
    p: BTreeMap<String, f64>,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

/// NDJSON [`Output`]. Remote delivery runs on its own task so the dispatcher
/// never waits on the network.
pub struct NdjsonOutput {
    config: NdjsonConfig,
    sender: Option<mpsc::UnboundedSender<String>>,
}

impl NdjsonOutput {
    /// Must be created inside a tokio runtime when `dest_url` is set.
    pub fn new(config: NdjsonConfig) -> Self {
        let sender = if config.dest_url.is_empty() {
            None
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_poster(config.dest_url.clone(), rx));
            Some(tx)
        };
        Self { config, sender }
    }

    pub fn sample_config() -> &'static str {
        SAMPLE_CONFIG
    }

    fn record(&self, pd: &Product) -> Record {
        let mut record = Record {
            name: pd.name.clone(),
            time: pd.time.saturating_mul(1_000_000),
            kind: pd.value.kind().to_string(),
            period: duration_str::format(pd.period),
            samples: pd.value.samples(),
            ..Record::default()
        };
        match &pd.value {
            BinValue::Counter { value, .. } => record.value = *value,
            BinValue::Gauge { value, sum, .. } => {
                record.value = *value;
                record.sum = *sum;
            }
            BinValue::Meter { samples, sum, first, last, min, max } => {
                record.value = if *samples > 0 { *sum / *samples as f64 } else { 0.0 };
                record.sum = *sum;
                record.first = *first;
                record.last = *last;
                record.min = *min;
                record.max = *max;
            }
            BinValue::Odometer { first, last, .. } => {
                record.value = (*last - *first).max(0.0);
                record.first = *first;
                record.last = *last;
            }
            BinValue::Histogram { p, values, .. } => {
                let wanted = if self.config.histogram_value_percentile > 0.0 {
                    self.config.histogram_value_percentile
                } else {
                    0.5
                };
                for (pct, value) in p.iter().zip(values.iter()) {
                    if *pct == wanted {
                        record.value = *value;
                    }
                    record.p.insert(percentile_key(*pct), *value);
                }
            }
        }
        record
    }
}

impl Output for NdjsonOutput {
    fn process(&self, product: &Product) -> Result<()> {
        let line = serde_json::to_string(&self.record(product))
            .map_err(vitals_core::VitalsError::storage)?;
        match &self.sender {
            None => println!("{line}"),
            Some(tx) => {
                if tx.send(line).is_err() {
                    warn!("ndjson poster task is gone, dropping record");
                }
            }
        }
        Ok(())
    }
}

async fn run_poster(url: String, mut rx: mpsc::UnboundedReceiver<String>) {
    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Failed to build ndjson HTTP client");
            return;
        }
    };
    while let Some(line) = rx.recv().await {
        let result = client
            .post(&url)
            .header("content-type", "application/x-ndjson")
            .body(line)
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(url = %url, status = %response.status(), "ndjson endpoint rejected record");
            }
            Ok(_) => {}
            Err(e) => warn!(url = %url, error = %e, "Failed to post ndjson record"),
        }
    }
}
