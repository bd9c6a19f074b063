//! SVG file output: renders a sparkline per exported snapshot.

use crate::dashboard::svg::Canvas;
use serde::Deserialize;
use std::path::PathBuf;
use vitals_core::{ExportOutput, ExportRequest, Result};

const SAMPLE_CONFIG: &str = r#"[output.svg]
## Directory receiving one .svg per metric and resolution.
# dest_dir = "/tmp/vitals-svg"
## Export cadence.
# interval = "10s"
"#;

/// Config block for the svg output.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SvgConfig {
    pub dest_dir: String,
    pub interval: String,
}

impl Default for SvgConfig {
    fn default() -> Self {
        Self { dest_dir: String::new(), interval: "10s".to_string() }
    }
}

/// Writes `<dest_dir>/<name>.svg` on every export, replacing `:` with `_`.
pub struct SvgOutput {
    dest_dir: PathBuf,
}

impl SvgOutput {
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self { dest_dir: dest_dir.into() }
    }

    pub fn sample_config() -> &'static str {
        SAMPLE_CONFIG
    }
}

impl ExportOutput for SvgOutput {
    fn export(&self, req: &ExportRequest) -> Result<()> {
        let field = req
            .snapshot
            .values
            .last()
            .map(|v| v.default_field())
            .unwrap_or("value");
        let values = req.snapshot.field_values(field);
        let last = values.last().copied().unwrap_or_default();

        let mut canvas = Canvas::new(200, 80);
        canvas.title = format!("{} - {}", req.title, req.unit.format(last, 1));
        canvas.max_count = req.snapshot.max_count;
        let svg = canvas.render(&values);

        std::fs::create_dir_all(&self.dest_dir)?;
        let file = self.dest_dir.join(format!("{}.svg", req.name.replace(':', "_")));
        std::fs::write(file, svg)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vitals_core::timeseries::SeriesSnapshot;
    use vitals_core::{BinValue, Unit};

    #[test]
    fn test_writes_one_file_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let output = SvgOutput::new(dir.path());
        let req = ExportRequest {
            name: "vitals:cpu:percent:0".to_string(),
            metric: "vitals:cpu:percent".to_string(),
            title: "2 min.".to_string(),
            unit: Unit::Percent,
            snapshot: SeriesSnapshot {
                times: vec![0, 1000],
                values: vec![
                    BinValue::Gauge { samples: 1, value: 10.0, sum: 10.0 },
                    BinValue::Gauge { samples: 1, value: 20.0, sum: 20.0 },
                ],
                period: Duration::from_secs(1),
                max_count: 3,
            },
        };
        output.export(&req).unwrap();
        let path = dir.path().join("vitals_cpu_percent_0.svg");
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("2 min. - 20.0%"));
    }
}
