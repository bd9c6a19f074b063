//! Disk usage input.

use async_trait::async_trait;
use serde::Deserialize;
use sysinfo::Disks;
use vitals_core::{Gather, Input, MetricType, Result, Unit};

const SAMPLE_CONFIG: &str = r#"[input.disk]
## Only report these mount points (all when empty).
# mount_points = ["/", "/data"]
## Skip these filesystem types.
# ignore_fs = ["tmpfs", "devtmpfs", "overlay", "squashfs"]
"#;

/// Per-mountpoint usage as `disk:<mount>:{total,free,used,used_percent}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Disk {
    pub mount_points: Vec<String>,
    pub ignore_fs: Vec<String>,
}

#[async_trait]
impl Input for Disk {
    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        let disks = Disks::new_with_refreshed_list();
        for disk in disks.list() {
            let mount = disk.mount_point().to_string_lossy().to_string();
            let fs = disk.file_system().to_string_lossy().to_string();
            if !self.mount_points.is_empty() && !self.mount_points.contains(&mount) {
                continue;
            }
            if self.ignore_fs.contains(&fs) {
                continue;
            }
            let total = disk.total_space() as f64;
            if total == 0.0 {
                // Pseudo filesystems report no capacity.
                continue;
            }
            let free = disk.available_space() as f64;
            let used = total - free;
            let used_percent = used / total * 100.0;

            let name = format!("disk:{mount}:");
            g.add(format!("{name}total"), total, MetricType::Gauge(Unit::Bytes));
            g.add(format!("{name}free"), free, MetricType::Gauge(Unit::Bytes));
            g.add(format!("{name}used"), used, MetricType::Gauge(Unit::Bytes));
            g.add(format!("{name}used_percent"), used_percent, MetricType::Gauge(Unit::Percent));
        }
        Ok(())
    }

    fn sample_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }
}
