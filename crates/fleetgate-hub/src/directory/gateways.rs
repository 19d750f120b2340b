//! In-memory registry of field gateways.
//!
//! Gateways (the site collectors, usually a Raspberry Pi next to the
//! appliances) report hostname and version periodically; the hub stamps the
//! source IP and last-seen time. The registry is ephemeral by design: a
//! restart simply waits for the next round of reports.

use std::collections::HashMap;
use std::sync::Arc;

use fleetgate_core::db::unix_timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

/// Last reported state of one gateway, keyed by hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayStatus {
    pub hostname: String,
    pub ip: String,
    pub version: String,
    pub last_seen: i64,
}

/// Thread-safe gateway registry.
#[derive(Clone)]
pub struct GatewayRegistry {
    gateways: Arc<RwLock<HashMap<String, GatewayStatus>>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self {
            gateways: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Upsert a gateway report.
    pub async fn report(&self, hostname: &str, ip: &str, version: &str) -> GatewayStatus {
        let status = GatewayStatus {
            hostname: hostname.to_string(),
            ip: ip.to_string(),
            version: version.to_string(),
            last_seen: unix_timestamp(),
        };
        let previous = self
            .gateways
            .write()
            .await
            .insert(hostname.to_string(), status.clone());
        if previous.is_none() {
            info!(hostname = %hostname, ip = %ip, "Gateway first report");
        }
        status
    }

    /// Get a gateway by hostname.
    pub async fn find(&self, hostname: &str) -> Option<GatewayStatus> {
        self.gateways.read().await.get(hostname).cloned()
    }

    /// All known gateways, hostname-ordered.
    pub async fn list(&self) -> Vec<GatewayStatus> {
        let mut gateways: Vec<GatewayStatus> =
            self.gateways.read().await.values().cloned().collect();
        gateways.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        gateways
    }

    /// Number of gateways that have reported since startup.
    pub async fn count(&self) -> usize {
        self.gateways.read().await.len()
    }
}

impl Default for GatewayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
