//! Agent configuration model.
//!
//! Maps the `[data]` and `[http]` tables of the TOML config file. Input and
//! output blocks (`[input.<kind>]`, `[output.<kind>]`) are not modeled here;
//! the daemon's registry instantiates those from the raw document.

use crate::error::{Result, VitalsError};
use crate::filter::Filter;
use crate::series::SeriesId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub data: DataConfig,
    pub http: HttpConfig,
}

impl AgentConfig {
    /// Parse a TOML document, tolerating unknown tables (input/output blocks).
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| VitalsError::InvalidConfig { reason: e.to_string() })
    }

    /// Build the validated series ids configured under `[[data.timeseries]]`.
    pub fn series_ids(&self) -> Result<Vec<SeriesId>> {
        self.data
            .timeseries
            .iter()
            .map(|ts| SeriesId::new(&ts.id, &ts.title, ts.interval, ts.length))
            .collect()
    }

    /// Compile the collector-level routing filter, if any is configured.
    pub fn routing_filter(&self) -> Result<Option<Filter>> {
        if self.data.filter.includes.is_empty() && self.data.filter.excludes.is_empty() {
            return Ok(None);
        }
        Filter::compile_include_exclude(
            &self.data.filter.includes,
            &self.data.filter.excludes,
            Some(':'),
        )
        .map(Some)
    }
}

/// The `[data]` table: sampling cadence, buffering, routing and resolutions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    #[serde(with = "duration_str")]
    pub sampling_interval: Duration,
    pub input_buffer: usize,
    pub prefix: String,
    /// Storage locator: empty for none, `sqlite:<path>` for the relational
    /// backend, otherwise a directory for file storage.
    pub store: String,
    pub filter: FilterConfig,
    pub timeseries: Vec<TimeseriesConfig>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_secs(1),
            input_buffer: 100,
            prefix: "vitals".to_string(),
            store: String::new(),
            filter: FilterConfig::default(),
            timeseries: vec![
                TimeseriesConfig::new("2m", "2 min.", Duration::from_secs(2), 60),
                TimeseriesConfig::new("5h", "5 hours", Duration::from_secs(300), 60),
                TimeseriesConfig::new("15h", "15 hours", Duration::from_secs(900), 60),
            ],
        }
    }
}

/// One `[[data.timeseries]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeseriesConfig {
    pub id: String,
    pub title: String,
    #[serde(with = "duration_str")]
    pub interval: Duration,
    pub length: usize,
}

impl TimeseriesConfig {
    pub fn new(id: &str, title: &str, interval: Duration, length: usize) -> Self {
        Self { id: id.to_string(), title: title.to_string(), interval, length }
    }
}

/// Include/exclude pattern lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
}

/// The `[http]` table: dashboard listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address; empty disables the HTTP server.
    pub listen: String,
    /// Advertised address used in startup logs.
    pub adv_addr: String,
    /// Dashboard mount path.
    pub dashboard: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: String::new(),
            adv_addr: "http://127.0.0.1:3000".to_string(),
            dashboard: "/".to_string(),
        }
    }
}

/// Durations as human-readable strings: "500ms", "1s", "5m", "2h".
pub mod duration_str {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        parse(&text).map_err(D::Error::custom)
    }

    /// Render with the largest unit that divides evenly.
    pub fn format(d: Duration) -> String {
        let ms = d.as_millis();
        if ms == 0 {
            return "0s".to_string();
        }
        if ms % 3_600_000 == 0 {
            format!("{}h", ms / 3_600_000)
        } else if ms % 60_000 == 0 {
            format!("{}m", ms / 60_000)
        } else if ms % 1_000 == 0 {
            format!("{}s", ms / 1_000)
        } else {
            format!("{ms}ms")
        }
    }

    pub fn parse(text: &str) -> Result<Duration, String> {
        let text = text.trim();
        let split = text
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| format!("missing unit in duration {text:?}"))?;
        let (num, unit) = text.split_at(split);
        let num: f64 = num.parse().map_err(|_| format!("invalid duration {text:?}"))?;
        let ms = match unit.trim() {
            "ms" => num,
            "s" => num * 1_000.0,
            "m" => num * 60_000.0,
            "h" => num * 3_600_000.0,
            other => return Err(format!("unknown duration unit {other:?}")),
        };
        if ms < 0.0 {
            return Err(format!("negative duration {text:?}"));
        }
        Ok(Duration::from_millis(ms as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_parse_and_format() {
        assert_eq!(duration_str::parse("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(duration_str::parse("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(duration_str::parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(duration_str::parse("2h").unwrap(), Duration::from_secs(7200));
        assert!(duration_str::parse("10").is_err());
        assert!(duration_str::parse("10x").is_err());

        assert_eq!(duration_str::format(Duration::from_secs(300)), "5m");
        assert_eq!(duration_str::format(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_parse_config() {
        let cfg = AgentConfig::from_toml(
            r#"
            [data]
            sampling_interval = "2s"
            input_buffer = 50
            prefix = "host"
            store = "sqlite:/tmp/vitals.db"

            [data.filter]
            includes = ["cpu:*", "mem:*"]
            excludes = ["cpu:idle"]

            [[data.timeseries]]
            id = "1m"
            title = "1 min."
            interval = "1s"
            length = 60

            [http]
            listen = "127.0.0.1:3000"

            [input.cpu]
            type = "meter"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.data.sampling_interval, Duration::from_secs(2));
        assert_eq!(cfg.data.input_buffer, 50);
        assert_eq!(cfg.data.prefix, "host");
        let series = cfg.series_ids().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].id(), "1m");

        let filter = cfg.routing_filter().unwrap().unwrap();
        assert!(filter.matches("cpu:user"));
        assert!(!filter.matches("cpu:idle"));
    }

    #[test]
    fn test_defaults() {
        let cfg = AgentConfig::from_toml("").unwrap();
        assert_eq!(cfg.data.sampling_interval, Duration::from_secs(1));
        assert_eq!(cfg.data.prefix, "vitals");
        assert_eq!(cfg.data.timeseries.len(), 3);
        assert!(cfg.http.listen.is_empty());
    }

    #[test]
    fn test_invalid_series_rejected() {
        let cfg = AgentConfig::from_toml(
            r#"
            [[data.timeseries]]
            id = "bad id"
            title = "x"
            interval = "1s"
            length = 10
            "#,
        )
        .unwrap();
        assert!(cfg.series_ids().is_err());
    }
}
