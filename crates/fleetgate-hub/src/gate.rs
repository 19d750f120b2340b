//! Device access gate.
//!
//! Every device-facing route group runs requests through here. The gate
//! decodes the legacy credential, resolves (or auto-registers) the machine,
//! records the contact, and only then applies the active check. Two modes
//! cover the legacy surface: `Strict` routes reject unusable credentials and
//! inactive machines, `Lax` routes serve those callers anonymously so old
//! firmware keeps polling successfully while an operator activates it.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::auth::basic::decode_basic_header;
use crate::directory::MachineDirectory;

/// Enforcement mode of a route group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Unusable credential or inactive machine: reject.
    Strict,
    /// Unusable credential or inactive machine: proceed anonymously.
    Lax,
}

/// Identity attached to a device request once the gate lets it through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceIdentity {
    /// A known, active machine.
    Machine { id: i64, serial: String },
    /// Lax-mode fallback when no usable identity was resolved.
    Anonymous,
}

impl DeviceIdentity {
    /// Serial label for logs and telemetry keys.
    pub fn label(&self) -> &str {
        match self {
            Self::Machine { serial, .. } => serial,
            Self::Anonymous => "anonymous",
        }
    }
}

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No usable credential (or registration failed): 401 with the
    /// `WWW-Authenticate: Basic` retry hint the legacy firmware needs.
    Unauthorized,
    /// Known machine, not yet activated by an operator: 403.
    Inactive,
}

/// Gate decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Proceed(DeviceIdentity),
    Denied(DenyReason),
}

/// The device access gate.
pub struct AccessGate {
    directory: Arc<MachineDirectory>,
}

impl AccessGate {
    pub fn new(directory: Arc<MachineDirectory>) -> Self {
        Self { directory }
    }

    /// Run one request through the gate.
    ///
    /// The contact is recorded for every resolved machine before the active
    /// check, so operators can see inactive machines knocking; recording
    /// failures never change the outcome.
    #[instrument(skip(self, auth_header), fields(ip = %client_ip))]
    pub async fn authorize(
        &self,
        mode: GateMode,
        auth_header: Option<&str>,
        client_ip: &str,
    ) -> GateOutcome {
        let credential = match decode_basic_header(auth_header) {
            Ok(credential) => credential,
            Err(e) => {
                debug!(error = %e, "No usable device credential");
                return unusable(mode);
            }
        };
        let key = credential.composite_key();

        let machine = match self.directory.lookup(&key).await {
            Some(machine) => machine,
            None => match self.directory.auto_register(&key).await {
                Ok(machine) => machine,
                Err(e) => {
                    warn!(error = %e, "Auto-registration failed");
                    return unusable(mode);
                }
            },
        };

        self.directory
            .record_connection(
                &key,
                client_ip,
                &credential.raw_encoded,
                &credential.raw_decoded(),
            )
            .await;

        if !machine.is_active {
            debug!(machine_id = machine.id, "Inactive machine contact");
            return match mode {
                GateMode::Strict => GateOutcome::Denied(DenyReason::Inactive),
                GateMode::Lax => GateOutcome::Proceed(DeviceIdentity::Anonymous),
            };
        }

        GateOutcome::Proceed(DeviceIdentity::Machine {
            id: machine.id,
            serial: machine.serial,
        })
    }
}

const fn unusable(mode: GateMode) -> GateOutcome {
    match mode {
        GateMode::Strict => GateOutcome::Denied(DenyReason::Unauthorized),
        GateMode::Lax => GateOutcome::Proceed(DeviceIdentity::Anonymous),
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::directory::snapshot::testing::{FailingSnapshotStore, MemorySnapshotStore};

    // 16 'a' characters, a colon, 16 'b' characters.
    const FACTORY_HEADER: &str = "Basic YWFhYWFhYWFhYWFhYWFhYTpiYmJiYmJiYmJiYmJiYmJi";
    const FACTORY_KEY: &str = "aaaaaaaaaaaaaaaabbbbbbbbbbbbbbbb";

    async fn gate() -> (AccessGate, Arc<MachineDirectory>) {
        let directory = Arc::new(
            MachineDirectory::load(Box::new(MemorySnapshotStore::default()), None)
                .await
                .unwrap(),
        );
        (AccessGate::new(Arc::clone(&directory)), directory)
    }

    #[tokio::test]
    async fn missing_credential_strict_demands_retry() {
        let (gate, _) = gate().await;
        assert_eq!(
            gate.authorize(GateMode::Strict, None, "10.0.0.1").await,
            GateOutcome::Denied(DenyReason::Unauthorized)
        );
        assert_eq!(
            gate.authorize(GateMode::Strict, Some("Bearer x"), "10.0.0.1").await,
            GateOutcome::Denied(DenyReason::Unauthorized)
        );
        assert_eq!(
            gate.authorize(GateMode::Strict, Some("Basic ###"), "10.0.0.1").await,
            GateOutcome::Denied(DenyReason::Unauthorized)
        );
    }

    #[tokio::test]
    async fn missing_credential_lax_proceeds_anonymously() {
        let (gate, directory) = gate().await;
        assert_eq!(
            gate.authorize(GateMode::Lax, None, "10.0.0.1").await,
            GateOutcome::Proceed(DeviceIdentity::Anonymous)
        );
        assert_eq!(
            gate.authorize(GateMode::Lax, Some("Basic ###"), "10.0.0.1").await,
            GateOutcome::Proceed(DeviceIdentity::Anonymous)
        );
        // Nothing was registered for garbled credentials.
        assert_eq!(directory.count().await, 0);
    }

    #[tokio::test]
    async fn unknown_machine_is_registered_then_held_inactive() {
        let (gate, directory) = gate().await;

        let outcome = gate
            .authorize(GateMode::Strict, Some(FACTORY_HEADER), "88.10.0.4")
            .await;
        assert_eq!(outcome, GateOutcome::Denied(DenyReason::Inactive));

        let machine = directory.lookup(FACTORY_KEY).await.unwrap();
        assert!(!machine.is_active);
        assert_eq!(machine.serial, "UNKNOWN-aaaaaaaa");

        // Same credential under lax: still anonymous, still one record.
        let outcome = gate
            .authorize(GateMode::Lax, Some(FACTORY_HEADER), "88.10.0.4")
            .await;
        assert_eq!(outcome, GateOutcome::Proceed(DeviceIdentity::Anonymous));
        assert_eq!(directory.count().await, 1);
    }

    #[tokio::test]
    async fn inactive_contact_is_still_recorded() {
        let (gate, directory) = gate().await;

        gate.authorize(GateMode::Strict, Some(FACTORY_HEADER), "88.10.0.4")
            .await;

        let overview = directory.find_by_id(1).await.unwrap();
        assert_eq!(overview.ip, "88.10.0.4");
        assert_eq!(
            overview.raw_auth,
            "YWFhYWFhYWFhYWFhYWFhYTpiYmJiYmJiYmJiYmJiYmJi"
        );
        assert_eq!(overview.raw_decoded, "aaaaaaaaaaaaaaaa:bbbbbbbbbbbbbbbb");
    }

    #[tokio::test]
    async fn registration_failure_falls_back_per_mode() {
        let directory = Arc::new(
            MachineDirectory::load(Box::new(FailingSnapshotStore), None)
                .await
                .unwrap(),
        );
        let gate = AccessGate::new(Arc::clone(&directory));

        assert_eq!(
            gate.authorize(GateMode::Strict, Some(FACTORY_HEADER), "10.0.0.1").await,
            GateOutcome::Denied(DenyReason::Unauthorized)
        );
        assert_eq!(
            gate.authorize(GateMode::Lax, Some(FACTORY_HEADER), "10.0.0.1").await,
            GateOutcome::Proceed(DeviceIdentity::Anonymous)
        );
        assert_eq!(directory.count().await, 0);
    }

    #[tokio::test]
    async fn active_machine_passes_with_its_serial() {
        let (gate, directory) = gate().await;
        directory
            .provision(FACTORY_KEY, "TEST-CLIENT-01", true)
            .await
            .unwrap();

        for mode in [GateMode::Strict, GateMode::Lax] {
            let outcome = gate
                .authorize(mode, Some(FACTORY_HEADER), "88.10.0.4")
                .await;
            assert_eq!(
                outcome,
                GateOutcome::Proceed(DeviceIdentity::Machine {
                    id: 1,
                    serial: "TEST-CLIENT-01".into(),
                })
            );
        }
    }

    #[tokio::test]
    async fn activation_unlocks_a_previously_denied_machine() {
        let (gate, directory) = gate().await;

        gate.authorize(GateMode::Strict, Some(FACTORY_HEADER), "88.10.0.4")
            .await;
        directory.set_active(1, true).await.unwrap();

        let outcome = gate
            .authorize(GateMode::Strict, Some(FACTORY_HEADER), "88.10.0.4")
            .await;
        assert_eq!(
            outcome,
            GateOutcome::Proceed(DeviceIdentity::Machine {
                id: 1,
                serial: "UNKNOWN-aaaaaaaa".into(),
            })
        );
    }

    #[test]
    fn identity_labels() {
        assert_eq!(DeviceIdentity::Anonymous.label(), "anonymous");
        assert_eq!(
            DeviceIdentity::Machine {
                id: 7,
                serial: "SER".into()
            }
            .label(),
            "SER"
        );
    }
}
