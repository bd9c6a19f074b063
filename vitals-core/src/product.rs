//! Bin-close products.

use crate::value::BinValue;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Value-typed record emitted when a bin closes.
///
/// Products flow to storage, to registered outputs and over the dashboard
/// API. The aggregate is flattened into the record so the JSON form carries
/// the `type` tag and only the fields the kind populates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Fully qualified metric name (`prefix:measure:field`).
    pub name: String,
    /// Bin start, unix milliseconds.
    pub time: i64,
    /// Bin period of the emitting ring.
    #[serde(with = "duration_ms", rename = "period_ms")]
    pub period: Duration,
    #[serde(flatten)]
    pub value: BinValue,
}

/// Serialize a `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let pd = Product {
            name: "vitals:cpu:percent".to_string(),
            time: 1_700_000_000_000,
            period: Duration::from_secs(15),
            value: BinValue::Meter {
                samples: 3,
                sum: 60.0,
                first: 10.0,
                last: 30.0,
                min: 10.0,
                max: 30.0,
            },
        };
        let encoded = serde_json::to_string(&pd).unwrap();
        let decoded: Product = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, pd);
    }

    #[test]
    fn test_json_carries_type_tag() {
        let pd = Product {
            name: "vitals:net:bytes_recv".to_string(),
            time: 0,
            period: Duration::from_secs(1),
            value: BinValue::Counter { samples: 2, value: 4.0 },
        };
        let v: serde_json::Value = serde_json::to_value(&pd).unwrap();
        assert_eq!(v["type"], "counter");
        assert_eq!(v["period_ms"], 1000);
        assert_eq!(v["samples"], 2);
    }

    #[test]
    fn test_histogram_pairing_survives_round_trip() {
        let pd = Product {
            name: "vitals:http:latency".to_string(),
            time: 1000,
            period: Duration::from_secs(1),
            value: BinValue::Histogram {
                samples: 100,
                p: vec![0.5, 0.9, 0.99],
                values: vec![50.0, 90.0, 99.0],
                reservoir: Vec::new(),
                reservoir_cap: 0,
            },
        };
        let decoded: Product =
            serde_json::from_str(&serde_json::to_string(&pd).unwrap()).unwrap();
        assert_eq!(decoded, pd);
    }
}
