//! Agent self-statistics input (Linux).
//!
//! The counterpart of a runtime-stats collector: how much the agent itself
//! costs. Reads `/proc/self` and publishes `proc:rss`, `proc:vsize`,
//! `proc:threads` and `proc:fds`.

use async_trait::async_trait;
use serde::Deserialize;
use vitals_core::{Gather, Input, MetricType, Result, Unit};

const SAMPLE_CONFIG: &str = r#"[input.proc]
"#;

/// Self process stats from `/proc/self`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProcSelf {}

#[derive(Debug, PartialEq)]
struct ProcStat {
    threads: f64,
    vsize: f64,
    rss_pages: f64,
}

/// Parse `/proc/self/stat`. The command field is parenthesized and may
/// contain spaces, so fields are counted from the closing parenthesis:
/// num_threads is field 20, vsize 23, rss 24 (1-based).
fn parse_stat(content: &str) -> Option<ProcStat> {
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    Some(ProcStat {
        threads: fields.get(17)?.parse().ok()?,
        vsize: fields.get(20)?.parse().ok()?,
        rss_pages: fields.get(21)?.parse().ok()?,
    })
}

#[async_trait]
impl Input for ProcSelf {
    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        let content = match std::fs::read_to_string("/proc/self/stat") {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let Some(stat) = parse_stat(&content) else {
            g.add_error("unparseable /proc/self/stat");
            return Ok(());
        };
        let page_size = 4096.0;
        g.add("proc:rss", stat.rss_pages * page_size, MetricType::Gauge(Unit::Bytes));
        g.add("proc:vsize", stat.vsize, MetricType::Gauge(Unit::Bytes));
        g.add("proc:threads", stat.threads, MetricType::Gauge(Unit::Short));
        if let Ok(entries) = std::fs::read_dir("/proc/self/fd") {
            g.add("proc:fds", entries.count() as f64, MetricType::Gauge(Unit::Short));
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
    fn test_parse_stat_with_spaced_command() {
        // 52 fields total; command contains spaces and parentheses.
        let content = "1234 (my (odd) cmd) S 1 1234 1234 0 -1 4194304 100 0 0 0 5 3 0 0 20 0 \
                       7 0 12345 104857600 2560 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 \
                       17 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_stat(content).unwrap();
        assert_eq!(stat.threads, 7.0);
        assert_eq!(stat.vsize, 104857600.0);
        assert_eq!(stat.rss_pages, 2560.0);
    }
}
