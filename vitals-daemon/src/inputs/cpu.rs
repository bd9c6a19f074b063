//! CPU usage input.

use async_trait::async_trait;
use serde::Deserialize;
use sysinfo::System;
use vitals_core::{Gather, Input, MetricType, Result, Unit};

const SAMPLE_CONFIG: &str = r#"[input.cpu]
## Aggregation for cpu:percent: "gauge" (default) or "meter".
# type = "gauge"
"#;

/// Global CPU usage as `cpu:percent`.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct Cpu {
    /// "gauge" (default) or "meter".
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip)]
    system: Option<System>,
}

impl Cpu {
    fn metric_type(&self) -> MetricType {
        match self.kind.as_str() {
            "meter" => MetricType::Meter(Unit::Percent),
            _ => MetricType::Gauge(Unit::Percent),
        }
    }
}

#[async_trait]
impl Input for Cpu {
    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        // Usage is a delta against the previous refresh, so the very first
        // reading carries no signal and is skipped.
        let metric_type = self.metric_type();
        let primed = self.system.is_some();
        let system = self.system.get_or_insert_with(System::new);
        system.refresh_cpu_usage();
        if !primed {
            return Ok(());
        }
        g.add("cpu:percent", system.global_cpu_usage() as f64, metric_type);
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }
}
