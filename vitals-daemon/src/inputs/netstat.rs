//! Socket state input (Linux).
//!
//! Counts TCP connections per state and UDP sockets from `/proc/net`.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use vitals_core::{Gather, Input, MetricType, Result, Unit};

const SAMPLE_CONFIG: &str = r#"[input.netstat]
## Typical trimming of noisy states:
# [input.netstat.filter]
# excludes = ["netstat:tcp_time_wait", "netstat:tcp_none", "netstat:tcp_closing"]
"#;

/// TCP state field names indexed by the kernel state code (1-based, per
/// `include/net/tcp_states.h`).
const TCP_STATES: [&str; 11] = [
    "tcp_established",
    "tcp_syn_sent",
    "tcp_syn_recv",
    "tcp_fin_wait1",
    "tcp_fin_wait2",
    "tcp_time_wait",
    "tcp_close",
    "tcp_close_wait",
    "tcp_last_ack",
    "tcp_listen",
    "tcp_closing",
];

/// Connection counts as `netstat:tcp_*` and `netstat:udp_socket`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NetStat {}

/// Count `/proc/net/tcp`-format rows by their hex state column.
fn count_states(content: &str, counts: &mut HashMap<&'static str, u64>) {
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // sl local_address rem_address st ...
        let Some(state_hex) = fields.get(3) else {
            continue;
        };
        let Ok(state) = u8::from_str_radix(state_hex, 16) else {
            continue;
        };
        if (1..=TCP_STATES.len() as u8).contains(&state) {
            *counts.entry(TCP_STATES[state as usize - 1]).or_default() += 1;
        }
    }
}

fn socket_rows(path: &str) -> u64 {
    std::fs::read_to_string(path)
        .map(|content| content.lines().skip(1).filter(|l| !l.trim().is_empty()).count() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl Input for NetStat {
    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        let mut counts: HashMap<&'static str, u64> = HashMap::new();
        let mut found = false;
        for path in ["/proc/net/tcp", "/proc/net/tcp6"] {
            if let Ok(content) = std::fs::read_to_string(path) {
                found = true;
                count_states(&content, &mut counts);
            }
        }
        if !found {
            // Not Linux or procfs unavailable.
            return Ok(());
        }

        let gauge = MetricType::Gauge(Unit::Short);
        for state in TCP_STATES {
            let count = counts.get(state).copied().unwrap_or(0);
            g.add(format!("netstat:{state}"), count as f64, gauge.clone());
        }
        let udp = socket_rows("/proc/net/udp") + socket_rows("/proc/net/udp6");
        g.add("netstat:udp_socket", udp as f64, gauge);
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000
   1: 0100007F:ACE2 0100007F:1F90 01 00000000:00000000 00:00000000 00000000  1000
   2: 0100007F:ACE4 0100007F:1F90 01 00000000:00000000 00:00000000 00000000  1000
   3: 0100007F:ACE6 0100007F:1F90 06 00000000:00000000 00:00000000 00000000  1000
";

    #[test]
    fn test_count_states() {
        let mut counts = HashMap::new();
        count_states(SAMPLE, &mut counts);
        assert_eq!(counts.get("tcp_listen"), Some(&1));
        assert_eq!(counts.get("tcp_established"), Some(&2));
        assert_eq!(counts.get("tcp_time_wait"), Some(&1));
        assert_eq!(counts.get("tcp_close"), None);
    }
}
