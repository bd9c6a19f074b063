//! Measurement units and value formatting.

use serde::{Deserialize, Serialize};

/// Unit attached to a metric type, used by the dashboard and exporters
/// to format raw float values for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Dimensionless count, abbreviated with K/M/G suffixes.
    #[default]
    Short,
    /// Byte size, abbreviated with binary suffixes (KiB, MiB, ...).
    Bytes,
    /// Percentage in the 0-100 range.
    Percent,
    /// Duration measured in nanoseconds.
    Duration,
}

impl Unit {
    /// Short display suffix for axis labels and chart titles.
    pub fn suffix(&self) -> &'static str {
        match self {
            Unit::Short => "",
            Unit::Bytes => "B",
            Unit::Percent => "%",
            Unit::Duration => "",
        }
    }

    /// Format a raw value for display with the given number of fraction digits.
    pub fn format(&self, value: f64, precision: usize) -> String {
        match self {
            Unit::Short => format_scaled(value, precision, 1000.0, &["", "K", "M", "G", "T"]),
            Unit::Bytes => {
                format_scaled(value, precision, 1024.0, &["B", "KiB", "MiB", "GiB", "TiB"])
            }
            Unit::Percent => format!("{value:.precision$}%"),
            Unit::Duration => format_duration_ns(value, precision),
        }
    }
}

fn format_scaled(value: f64, precision: usize, base: f64, suffixes: &[&str]) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let mut v = value.abs();
    let mut idx = 0;
    while v >= base && idx < suffixes.len() - 1 {
        v /= base;
        idx += 1;
    }
    if idx == 0 && v.fract() == 0.0 {
        format!("{sign}{v:.0}{}", suffixes[idx])
    } else {
        format!("{sign}{v:.precision$}{}", suffixes[idx])
    }
}

/// Render a nanosecond quantity using the largest unit that keeps the
/// mantissa above one.
fn format_duration_ns(ns: f64, precision: usize) -> String {
    let abs = ns.abs();
    if abs < 1_000.0 {
        format!("{ns:.0}ns")
    } else if abs < 1_000_000.0 {
        format!("{:.precision$}us", ns / 1_000.0)
    } else if abs < 1_000_000_000.0 {
        format!("{:.precision$}ms", ns / 1_000_000.0)
    } else if abs < 60_000_000_000.0 {
        format!("{:.precision$}s", ns / 1_000_000_000.0)
    } else {
        format!("{:.precision$}m", ns / 60_000_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_format() {
        assert_eq!(Unit::Short.format(42.0, 1), "42");
        assert_eq!(Unit::Short.format(1500.0, 1), "1.5K");
        assert_eq!(Unit::Short.format(2_500_000.0, 1), "2.5M");
        assert_eq!(Unit::Short.format(-1500.0, 1), "-1.5K");
    }

    #[test]
    fn test_bytes_format() {
        assert_eq!(Unit::Bytes.format(512.0, 1), "512B");
        assert_eq!(Unit::Bytes.format(2048.0, 1), "2.0KiB");
        assert_eq!(Unit::Bytes.format(3.5 * 1024.0 * 1024.0, 1), "3.5MiB");
    }

    #[test]
    fn test_percent_format() {
        assert_eq!(Unit::Percent.format(42.1234, 1), "42.1%");
    }

    #[test]
    fn test_duration_format() {
        assert_eq!(Unit::Duration.format(800.0, 1), "800ns");
        assert_eq!(Unit::Duration.format(1_500.0, 1), "1.5us");
        assert_eq!(Unit::Duration.format(20_000_000.0, 0), "20ms");
        assert_eq!(Unit::Duration.format(2_000_000_000.0, 1), "2.0s");
    }
}
