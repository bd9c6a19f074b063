//! Load average input.

use async_trait::async_trait;
use serde::Deserialize;
use sysinfo::System;
use vitals_core::{Gather, Input, MetricType, Result, Unit};

const SAMPLE_CONFIG: &str = r#"[input.load]
"#;

/// System load averages as `load:load1`, `load:load5`, `load:load15`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Load {}

#[async_trait]
impl Input for Load {
    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        let avg = System::load_average();
        let gauge = MetricType::Gauge(Unit::Short);
        g.add("load:load1", avg.one, gauge.clone());
        g.add("load:load5", avg.five, gauge.clone());
        g.add("load:load15", avg.fifteen, gauge);
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }
}
