//! Machine directory: every appliance the hub has ever seen.
//!
//! Identities and connection details live in two in-memory maps keyed by the
//! composite credential key, guarded by a single `RwLock`. Every mutation
//! rewrites the JSON snapshot before the lock is released, so readers never
//! observe a state that is newer than disk. This trades write throughput for
//! simplicity; fleets here are hundreds of devices, not millions.

pub mod gateways;
pub mod geo;
pub mod snapshot;

use std::collections::HashMap;

use fleetgate_core::db::unix_timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

pub use gateways::{GatewayRegistry, GatewayStatus};
pub use geo::{GeoEnricher, GeoJob, GeoProvider};
pub use snapshot::{DirectorySnapshot, JsonSnapshotStore, SnapshotError, SnapshotStore};

/// Directory errors. Only mutations that must be durable report them;
/// best-effort paths (connection recording, geolocation write-back) log and
/// swallow instead.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("snapshot persistence failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("machine not found")]
    NotFound,
}

/// A machine's identity row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineIdentity {
    /// Sequential directory id, assigned at registration.
    pub id: i64,
    /// Serial label; auto-registered machines get a derived placeholder.
    pub serial: String,
    /// The legacy credential key, stored verbatim.
    pub composite_key: String,
    /// Inactive machines may connect but are denied on strict routes until
    /// an administrator activates them.
    pub is_active: bool,
}

/// What we know about a machine's last contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDetail {
    pub id: i64,
    pub serial: String,
    pub ip: String,
    pub last_seen: i64,
    /// Base64 payload exactly as presented.
    pub raw_auth: String,
    /// Decoded `username:password` string.
    pub raw_decoded: String,
    pub geo_location: Option<String>,
}

/// Identity and connection detail joined for operator views. The composite
/// key is deliberately absent: it is the device's credential.
#[derive(Debug, Clone, Serialize)]
pub struct MachineOverview {
    pub id: i64,
    pub serial: String,
    pub is_active: bool,
    pub ip: String,
    pub last_seen: i64,
    pub raw_auth: String,
    pub raw_decoded: String,
    pub geo_location: Option<String>,
}

#[derive(Default)]
struct DirectoryState {
    machines: HashMap<String, MachineIdentity>,
    details: HashMap<String, ConnectionDetail>,
}

impl DirectoryState {
    fn next_id(&self) -> i64 {
        self.machines.values().map(|m| m.id).max().unwrap_or(0) + 1
    }
}

/// The shared machine directory.
pub struct MachineDirectory {
    state: RwLock<DirectoryState>,
    store: Box<dyn SnapshotStore>,
    geo_tx: Option<mpsc::Sender<GeoJob>>,
}

/// Placeholder connection IP until a machine first contacts the hub.
const NEVER_SEEN_IP: &str = "-";

fn derived_serial(composite_key: &str) -> String {
    let prefix: String = composite_key.chars().take(8).collect();
    format!("UNKNOWN-{prefix}")
}

impl MachineDirectory {
    /// Load the directory from its snapshot store. A missing snapshot means
    /// an empty fleet, not an error.
    pub async fn load(
        store: Box<dyn SnapshotStore>,
        geo_tx: Option<mpsc::Sender<GeoJob>>,
    ) -> Result<Self, DirectoryError> {
        let state = match store.load().await? {
            Some(snapshot) => {
                info!(machines = snapshot.machines.len(), "Machine directory loaded");
                DirectoryState {
                    machines: snapshot.machines,
                    details: snapshot.details,
                }
            }
            None => DirectoryState::default(),
        };

        Ok(Self {
            state: RwLock::new(state),
            store,
            geo_tx,
        })
    }

    async fn persist(&self, state: &DirectoryState) -> Result<(), DirectoryError> {
        let snapshot = DirectorySnapshot {
            machines: state.machines.clone(),
            details: state.details.clone(),
        };
        self.store.save(&snapshot).await?;
        Ok(())
    }

    /// Look up a machine by its composite key.
    pub async fn lookup(&self, composite_key: &str) -> Option<MachineIdentity> {
        self.state.read().await.machines.get(composite_key).cloned()
    }

    /// Register an unknown machine as inactive.
    ///
    /// Idempotent under the write lock: concurrent first contacts with the
    /// same key produce exactly one record, and every caller gets it. The
    /// record only survives if the snapshot write succeeds; on failure the
    /// insertion is rolled back and the error reported so the access gate can
    /// fall back to its credential-failure policy.
    pub async fn auto_register(
        &self,
        composite_key: &str,
    ) -> Result<MachineIdentity, DirectoryError> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.machines.get(composite_key) {
            return Ok(existing.clone());
        }

        let id = state.next_id();
        let serial = derived_serial(composite_key);
        let machine = MachineIdentity {
            id,
            serial: serial.clone(),
            composite_key: composite_key.to_string(),
            is_active: false,
        };
        state.machines.insert(composite_key.to_string(), machine.clone());
        state.details.insert(
            composite_key.to_string(),
            ConnectionDetail {
                id,
                serial,
                ip: NEVER_SEEN_IP.to_string(),
                last_seen: unix_timestamp(),
                raw_auth: String::new(),
                raw_decoded: String::new(),
                geo_location: None,
            },
        );

        if let Err(e) = self.persist(&state).await {
            state.machines.remove(composite_key);
            state.details.remove(composite_key);
            return Err(e);
        }

        info!(machine_id = id, serial = %machine.serial, "Unknown machine auto-registered (inactive)");
        Ok(machine)
    }

    /// Record a contact from a known machine: IP, raw credential forms,
    /// last-seen. Called for every authenticated request, active or not, so
    /// operators can see inactive machines knocking.
    ///
    /// Persistence failures are logged and swallowed; the in-memory record
    /// keeps the fresh values. When the IP changed (or no geolocation is
    /// recorded yet) a lookup job is pushed onto the bounded enrichment
    /// queue; a full queue drops the job rather than blocking the caller.
    pub async fn record_connection(
        &self,
        composite_key: &str,
        ip: &str,
        raw_auth: &str,
        raw_decoded: &str,
    ) {
        let mut state = self.state.write().await;

        let Some(wants_geo) = ({
            state.details.get_mut(composite_key).map(|detail| {
                let wants = (detail.ip != ip || detail.geo_location.is_none())
                    && !ip.is_empty()
                    && ip != "127.0.0.1";
                detail.ip = ip.to_string();
                detail.raw_auth = raw_auth.to_string();
                detail.raw_decoded = raw_decoded.to_string();
                detail.last_seen = unix_timestamp();
                wants
            })
        }) else {
            return;
        };

        if let Err(e) = self.persist(&state).await {
            warn!(error = %e, "Failed to persist connection record");
        }
        drop(state);

        if wants_geo {
            self.enqueue_geo(composite_key, ip);
        }
    }

    fn enqueue_geo(&self, composite_key: &str, ip: &str) {
        let Some(tx) = &self.geo_tx else { return };
        let job = GeoJob {
            composite_key: composite_key.to_string(),
            ip: ip.to_string(),
        };
        match tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(ip = %job.ip, "Geolocation queue full, dropping lookup");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Geolocation worker stopped, lookup skipped");
            }
        }
    }

    /// Write back a geolocation result. Worker-only path; takes the lock just
    /// for the update and persist.
    pub async fn apply_geo(&self, composite_key: &str, location: &str) {
        let mut state = self.state.write().await;

        let Some(machine_id) = ({
            state.details.get_mut(composite_key).map(|detail| {
                detail.geo_location = Some(location.to_string());
                detail.id
            })
        }) else {
            return;
        };

        if let Err(e) = self.persist(&state).await {
            warn!(error = %e, "Failed to persist geolocation");
        }
        info!(machine_id, location = %location, "Geolocation recorded");
    }

    /// Activate or deactivate a machine. The changed flag is kept in memory
    /// even if the snapshot write fails, so a retry only needs the persist.
    pub async fn set_active(
        &self,
        machine_id: i64,
        active: bool,
    ) -> Result<MachineIdentity, DirectoryError> {
        let mut state = self.state.write().await;

        let Some(machine) = ({
            state
                .machines
                .values_mut()
                .find(|m| m.id == machine_id)
                .map(|m| {
                    m.is_active = active;
                    m.clone()
                })
        }) else {
            return Err(DirectoryError::NotFound);
        };

        self.persist(&state).await?;
        info!(machine_id, active, "Machine activation changed");
        Ok(machine)
    }

    /// Seed a known machine (deploy tooling, test fixtures). Idempotent: an
    /// existing record for the key is returned untouched.
    pub async fn provision(
        &self,
        composite_key: &str,
        serial: &str,
        active: bool,
    ) -> Result<MachineIdentity, DirectoryError> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.machines.get(composite_key) {
            return Ok(existing.clone());
        }

        let id = state.next_id();
        let machine = MachineIdentity {
            id,
            serial: serial.to_string(),
            composite_key: composite_key.to_string(),
            is_active: active,
        };
        state.machines.insert(composite_key.to_string(), machine.clone());
        state.details.insert(
            composite_key.to_string(),
            ConnectionDetail {
                id,
                serial: serial.to_string(),
                ip: NEVER_SEEN_IP.to_string(),
                last_seen: unix_timestamp(),
                raw_auth: String::new(),
                raw_decoded: String::new(),
                geo_location: None,
            },
        );

        if let Err(e) = self.persist(&state).await {
            state.machines.remove(composite_key);
            state.details.remove(composite_key);
            return Err(e);
        }

        info!(machine_id = id, serial = %serial, active, "Machine provisioned");
        Ok(machine)
    }

    /// All machines joined with their connection details, id-ordered.
    pub async fn list(&self) -> Vec<MachineOverview> {
        let state = self.state.read().await;
        let mut overview: Vec<MachineOverview> = state
            .machines
            .iter()
            .filter_map(|(key, machine)| {
                state.details.get(key).map(|detail| MachineOverview {
                    id: machine.id,
                    serial: machine.serial.clone(),
                    is_active: machine.is_active,
                    ip: detail.ip.clone(),
                    last_seen: detail.last_seen,
                    raw_auth: detail.raw_auth.clone(),
                    raw_decoded: detail.raw_decoded.clone(),
                    geo_location: detail.geo_location.clone(),
                })
            })
            .collect();
        overview.sort_by_key(|m| m.id);
        overview
    }

    /// A single machine overview by directory id.
    pub async fn find_by_id(&self, machine_id: i64) -> Option<MachineOverview> {
        self.list().await.into_iter().find(|m| m.id == machine_id)
    }

    /// Number of known machines.
    pub async fn count(&self) -> usize {
        self.state.read().await.machines.len()
    }
}
