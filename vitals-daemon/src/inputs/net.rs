//! Network I/O input.

use async_trait::async_trait;
use serde::Deserialize;
use sysinfo::Networks;
use vitals_core::{Filter, Gather, Input, MetricType, Result, Unit};

const SAMPLE_CONFIG: &str = r#"[input.net]
## Only count these interfaces (glob patterns, all when empty).
# interfaces = ["eth*", "en*"]
"#;

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    bytes_sent: u64,
    bytes_recv: u64,
    packets_sent: u64,
    packets_recv: u64,
    err_in: u64,
    err_out: u64,
}

/// Aggregate network counters as `net:{bytes,packets,err}_{sent,recv}`.
///
/// Kernel counters are cumulative; each tick emits the delta since the
/// previous tick as a counter sample, so the first tick emits nothing.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct Net {
    pub interfaces: Vec<String>,

    #[serde(skip)]
    filter: Option<Filter>,
    #[serde(skip)]
    prev: Option<Counts>,
}

#[async_trait]
impl Input for Net {
    fn init(&mut self) -> Result<()> {
        if !self.interfaces.is_empty() {
            self.filter = Some(Filter::compile(&self.interfaces)?);
        }
        Ok(())
    }

    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        let networks = Networks::new_with_refreshed_list();
        let mut counts = Counts::default();
        for (name, data) in networks.iter() {
            if self.filter.as_ref().is_some_and(|f| !f.matches(name)) {
                continue;
            }
            counts.bytes_sent += data.total_transmitted();
            counts.bytes_recv += data.total_received();
            counts.packets_sent += data.total_packets_transmitted();
            counts.packets_recv += data.total_packets_received();
            counts.err_in += data.total_errors_on_received();
            counts.err_out += data.total_errors_on_transmitted();
        }

        if let Some(prev) = self.prev {
            let bytes = MetricType::Counter(Unit::Bytes);
            let short = MetricType::Counter(Unit::Short);
            let delta = |now: u64, before: u64| now.saturating_sub(before) as f64;
            g.add("net:bytes_sent", delta(counts.bytes_sent, prev.bytes_sent), bytes.clone());
            g.add("net:bytes_recv", delta(counts.bytes_recv, prev.bytes_recv), bytes);
            g.add("net:packets_sent", delta(counts.packets_sent, prev.packets_sent), short.clone());
            g.add("net:packets_recv", delta(counts.packets_recv, prev.packets_recv), short.clone());
            g.add("net:err_in", delta(counts.err_in, prev.err_in), short.clone());
            g.add("net:err_out", delta(counts.err_out, prev.err_out), short);
        }
        self.prev = Some(counts);
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }
}
