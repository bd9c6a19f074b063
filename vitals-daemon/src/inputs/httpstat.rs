//! HTTP endpoint probe input.
//!
//! Issues one GET per configured URL each tick and publishes the response
//! latency as a histogram plus per-status-class counters, named
//! `http:<label>:latency` and `http:<label>:status_Nxx`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use vitals_core::{Gather, Input, MetricType, Result, Unit, VitalsError};

const SAMPLE_CONFIG: &str = r#"[input.httpstat]
## Endpoints to probe each tick.
# urls = ["http://127.0.0.1:8080/healthz"]
## Per-request timeout.
# timeout = "900ms"
"#;

fn default_timeout() -> String {
    "900ms".to_string()
}

/// Probe latency and status of HTTP endpoints.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct HttpStat {
    pub urls: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout: String,

    #[serde(skip)]
    client: Option<reqwest::Client>,
}

/// Strip a URL down to a field-safe label: host and port.
fn label_of(url: &str) -> String {
    let trimmed = url.split("://").nth(1).unwrap_or(url);
    let host = trimmed.split('/').next().unwrap_or(trimmed);
    host.chars().map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' }).collect()
}

#[async_trait]
impl Input for HttpStat {
    fn init(&mut self) -> Result<()> {
        if self.urls.is_empty() {
            return Err(VitalsError::InvalidConfig {
                reason: "httpstat input requires at least one url".to_string(),
            });
        }
        if self.timeout.is_empty() {
            self.timeout = default_timeout();
        }
        let timeout = vitals_core::config::duration_str::parse(&self.timeout)
            .map_err(|reason| VitalsError::InvalidConfig { reason })?;
        let client = reqwest::Client::builder()
            .timeout(if timeout.is_zero() { Duration::from_millis(900) } else { timeout })
            .build()
            .map_err(|e| VitalsError::InitFailed {
                input: "httpstat".to_string(),
                reason: e.to_string(),
            })?;
        self.client = Some(client);
        Ok(())
    }

    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        let Some(client) = &self.client else {
            return Ok(());
        };
        for url in &self.urls {
            let label = label_of(url);
            let started = Instant::now();
            match client.get(url).send().await {
                Ok(response) => {
                    let latency = started.elapsed().as_nanos() as f64;
                    let class = response.status().as_u16() / 100;
                    g.add(
                        format!("http:{label}:latency"),
                        latency,
                        MetricType::histogram(Unit::Duration),
                    );
                    g.add(
                        format!("http:{label}:status_{class}xx"),
                        1.0,
                        MetricType::Counter(Unit::Short),
                    );
                }
                Err(e) => {
                    g.add(
                        format!("http:{label}:failures"),
                        1.0,
                        MetricType::Counter(Unit::Short),
                    );
                    g.add_error(format!("probe {url}: {e}"));
                }
            }
        }
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_of() {
        assert_eq!(label_of("http://127.0.0.1:8080/healthz"), "127.0.0.1_8080");
        assert_eq!(label_of("https://example.com/x/y"), "example.com");
    }

    #[test]
    fn test_init_requires_urls() {
        let mut input = HttpStat::default();
        assert!(input.init().is_err());
    }
}
