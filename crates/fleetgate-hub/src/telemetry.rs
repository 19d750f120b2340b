//! Last-sample telemetry sink.
//!
//! Appliances push their full key/value state on every status post; only the
//! most recent sample per device is kept. The legacy exchange encodes every
//! value as a string, numeric or not.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use fleetgate_core::db::unix_timestamp;

/// One key/value pair of the legacy exchange format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeValue {
    pub k: i32,
    pub v: String,
}

/// Most recent state pushed by one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub version: String,
    pub ek: Vec<ExchangeValue>,
    pub received_at: i64,
}

/// In-memory last-sample store keyed by device serial.
#[derive(Clone, Default)]
pub struct TelemetrySink {
    samples: Arc<RwLock<HashMap<String, TelemetrySample>>>,
}

impl TelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored sample for a device.
    pub async fn store(&self, serial: &str, version: String, ek: Vec<ExchangeValue>) {
        let sample = TelemetrySample {
            version,
            ek,
            received_at: unix_timestamp(),
        };
        self.samples.write().await.insert(serial.to_string(), sample);
    }

    pub async fn get(&self, serial: &str) -> Option<TelemetrySample> {
        self.samples.read().await.get(serial).cloned()
    }

    /// Number of devices that have pushed at least once.
    pub async fn count(&self) -> usize {
        self.samples.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ek(pairs: &[(i32, &str)]) -> Vec<ExchangeValue> {
        pairs
            .iter()
            .map(|&(k, v)| ExchangeValue { k, v: v.to_string() })
            .collect()
    }

    #[tokio::test]
    async fn keeps_only_the_latest_sample() {
        let sink = TelemetrySink::new();
        sink.store("CLIENT-01", "2.18".into(), ek(&[(363, "21.5")])).await;
        sink.store("CLIENT-01", "2.18".into(), ek(&[(363, "22.0"), (11, "1")]))
            .await;

        let sample = sink.get("CLIENT-01").await.unwrap();
        assert_eq!(sample.ek.len(), 2);
        assert_eq!(sample.ek[0].v, "22.0");
        assert_eq!(sink.count().await, 1);
    }

    #[tokio::test]
    async fn counts_distinct_devices() {
        let sink = TelemetrySink::new();
        sink.store("CLIENT-01", "2.18".into(), ek(&[])).await;
        sink.store("CLIENT-02", "2.17".into(), ek(&[])).await;

        assert_eq!(sink.count().await, 2);
        assert!(sink.get("CLIENT-03").await.is_none());
    }

    #[test]
    fn exchange_values_stay_strings_on_the_wire() {
        let parsed: TelemetrySample = serde_json::from_str(
            r#"{"version":"2.18","ek":[{"k":363,"v":"21.5"}],"received_at":0}"#,
        )
        .unwrap();
        assert_eq!(parsed.ek[0].k, 363);
        assert_eq!(parsed.ek[0].v, "21.5");
    }
}
