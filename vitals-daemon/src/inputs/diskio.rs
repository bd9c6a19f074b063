//! Disk I/O counters input (Linux).
//!
//! Reads `/proc/diskstats` and publishes the kernel's cumulative counters as
//! odometers (`diskio:<device>:read_bytes`, ...); the read side derives
//! per-bin deltas. On other platforms the input gathers nothing.

use async_trait::async_trait;
use serde::Deserialize;
use vitals_core::{Filter, Gather, Input, MetricType, Result, Unit};

const SAMPLE_CONFIG: &str = r#"[input.diskio]
## Only report these devices (glob patterns, all when empty).
# devices = ["sd*", "nvme*"]
"#;

/// Sector size used by the diskstats ABI regardless of hardware.
const SECTOR_SIZE: f64 = 512.0;

/// Per-device I/O odometers from `/proc/diskstats`.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct DiskIo {
    pub devices: Vec<String>,

    #[serde(skip)]
    filter: Option<Filter>,
}

#[derive(Debug, PartialEq)]
struct DiskStats {
    device: String,
    read_count: f64,
    read_bytes: f64,
    write_count: f64,
    write_bytes: f64,
    io_time_ms: f64,
    weighted_io_time_ms: f64,
}

/// Parse one `/proc/diskstats` line:
/// `major minor device reads reads_merged sectors_read ms_reading writes
///  writes_merged sectors_written ms_writing in_flight ms_io weighted_ms_io ...`
fn parse_line(line: &str) -> Option<DiskStats> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 14 {
        return None;
    }
    let num = |idx: usize| fields[idx].parse::<f64>().ok();
    Some(DiskStats {
        device: fields[2].to_string(),
        read_count: num(3)?,
        read_bytes: num(5)? * SECTOR_SIZE,
        write_count: num(7)?,
        write_bytes: num(9)? * SECTOR_SIZE,
        io_time_ms: num(12)?,
        weighted_io_time_ms: num(13)?,
    })
}

#[async_trait]
impl Input for DiskIo {
    fn init(&mut self) -> Result<()> {
        if !self.devices.is_empty() {
            self.filter = Some(Filter::compile(&self.devices)?);
        }
        Ok(())
    }

    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        let content = match std::fs::read_to_string("/proc/diskstats") {
            Ok(content) => content,
            // Not Linux or procfs unavailable.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let bytes = MetricType::Odometer(Unit::Bytes);
        let short = MetricType::Odometer(Unit::Short);
        let duration = MetricType::Odometer(Unit::Duration);
        for stats in content.lines().filter_map(parse_line) {
            if self.filter.as_ref().is_some_and(|f| !f.matches(&stats.device)) {
                continue;
            }
            let name = format!("diskio:{}:", stats.device);
            g.add(format!("{name}read_bytes"), stats.read_bytes, bytes.clone());
            g.add(format!("{name}write_bytes"), stats.write_bytes, bytes.clone());
            g.add(format!("{name}read_count"), stats.read_count, short.clone());
            g.add(format!("{name}write_count"), stats.write_count, short.clone());
            g.add(format!("{name}io_time"), stats.io_time_ms * 1_000_000.0, duration.clone());
            g.add(
                format!("{name}weighted_io_time"),
                stats.weighted_io_time_ms * 1_000_000.0,
                duration.clone(),
            );
        }
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }
}
