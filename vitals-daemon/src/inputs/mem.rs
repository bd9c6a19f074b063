//! Memory usage input.

use async_trait::async_trait;
use serde::Deserialize;
use sysinfo::System;
use vitals_core::{Gather, Input, MetricType, Result, Unit};

const SAMPLE_CONFIG: &str = r#"[input.mem]
## Aggregation for mem:percent: "gauge" (default) or "meter".
# type = "gauge"
"#;

/// Memory usage as `mem:percent`, `mem:used` and `mem:total`.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct Memory {
    /// "gauge" (default) or "meter".
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip)]
    system: Option<System>,
}

#[async_trait]
impl Input for Memory {
    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        let (percent_type, bytes_type) = match self.kind.as_str() {
            "meter" => (MetricType::Meter(Unit::Percent), MetricType::Meter(Unit::Bytes)),
            _ => (MetricType::Gauge(Unit::Percent), MetricType::Gauge(Unit::Bytes)),
        };
        let system = self.system.get_or_insert_with(System::new);
        system.refresh_memory();
        let total = system.total_memory() as f64;
        let used = system.used_memory() as f64;
        let percent = if total > 0.0 { used / total * 100.0 } else { 0.0 };

        g.add("mem:percent", percent, percent_type);
        g.add("mem:used", used, bytes_type.clone());
        g.add("mem:total", total, bytes_type);
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }
}
