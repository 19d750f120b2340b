//! Device-linking resolver.
//!
//! Accounts are tied to the machine or gateway on the same network as the
//! requester. At registration the requester's IP picks the machine and the
//! candidate role; the storage layer's one-local-admin index decides who
//! actually gets the slot. Manual re-links from the profile require the
//! target device to be on the requester's network, administrators excepted.

use std::sync::Arc;

use serde::Serialize;

use fleetgate_core::Role;

use crate::directory::{GatewayRegistry, GatewayStatus, MachineDirectory, MachineOverview};

/// Why a manual link was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("Machine not found")]
    MachineNotFound,

    #[error("Gateway not found")]
    GatewayNotFound,

    #[error("IP mismatch: device is not on the requester's network")]
    IpMismatch,
}

/// Link and candidate role resolved for a new registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationLink {
    pub linked_machine_id: Option<i64>,
    /// `AdminLocal` is a candidacy: storage demotes to `GuestLocal` when the
    /// machine's slot is already taken.
    pub role: Role,
}

/// Devices sharing the requester's network address.
#[derive(Debug, Serialize)]
pub struct NearbyDevices {
    pub machines: Vec<MachineOverview>,
    pub gateways: Vec<GatewayStatus>,
    pub user_ip: String,
}

/// Resolves account/device associations by network address.
pub struct LinkResolver {
    directory: Arc<MachineDirectory>,
    gateways: GatewayRegistry,
}

impl LinkResolver {
    pub fn new(directory: Arc<MachineDirectory>, gateways: GatewayRegistry) -> Self {
        Self { directory, gateways }
    }

    /// First machine (id order) whose current connection IP equals the
    /// requester's. An empty requester IP never matches.
    pub async fn locate_machine_by_ip(&self, ip: &str) -> Option<MachineOverview> {
        if ip.is_empty() {
            return None;
        }
        self.directory
            .list()
            .await
            .into_iter()
            .find(|machine| machine.ip == ip)
    }

    /// Link and candidate role for an account registering from `ip`.
    pub async fn resolve_registration(&self, ip: &str) -> RegistrationLink {
        match self.locate_machine_by_ip(ip).await {
            Some(machine) => RegistrationLink {
                linked_machine_id: Some(machine.id),
                role: Role::AdminLocal,
            },
            None => RegistrationLink {
                linked_machine_id: None,
                role: Role::GuestLocal,
            },
        }
    }

    /// Validate a manual profile re-link.
    ///
    /// Absent targets mean "clear that link" and need no validation.
    /// Administrators skip the same-network check; everyone still needs the
    /// target to exist.
    pub async fn validate_manual_link(
        &self,
        requester_ip: &str,
        actor_is_admin: bool,
        machine_id: Option<i64>,
        gateway_hostname: Option<&str>,
    ) -> Result<(), LinkError> {
        if let Some(id) = machine_id {
            let machine = self
                .directory
                .find_by_id(id)
                .await
                .ok_or(LinkError::MachineNotFound)?;
            if !actor_is_admin && machine.ip != requester_ip {
                return Err(LinkError::IpMismatch);
            }
        }

        if let Some(hostname) = gateway_hostname {
            let gateway = self
                .gateways
                .find(hostname)
                .await
                .ok_or(LinkError::GatewayNotFound)?;
            if !actor_is_admin && gateway.ip != requester_ip {
                return Err(LinkError::IpMismatch);
            }
        }

        Ok(())
    }

    /// Machines and gateways currently seen on the requester's address.
    pub async fn nearby(&self, ip: &str) -> NearbyDevices {
        let (machines, gateways) = if ip.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            (
                self.directory
                    .list()
                    .await
                    .into_iter()
                    .filter(|machine| machine.ip == ip)
                    .collect(),
                self.gateways
                    .list()
                    .await
                    .into_iter()
                    .filter(|gateway| gateway.ip == ip)
                    .collect(),
            )
        };

        NearbyDevices {
            machines,
            gateways,
            user_ip: ip.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::directory::snapshot::testing::MemorySnapshotStore;

    async fn resolver() -> LinkResolver {
        let directory = Arc::new(
            MachineDirectory::load(Box::new(MemorySnapshotStore::default()), None)
                .await
                .unwrap(),
        );
        directory.provision("key-one", "CLIENT-01", true).await.unwrap();
        directory.provision("key-two", "CLIENT-02", true).await.unwrap();
        directory
            .record_connection("key-one", "88.10.0.4", "auth1", "dec1")
            .await;
        directory
            .record_connection("key-two", "88.10.0.4", "auth2", "dec2")
            .await;

        let gateways = GatewayRegistry::new();
        gateways.report("gw-lyon-1", "88.10.0.4", "1.4.2").await;
        gateways.report("gw-paris-2", "92.44.1.9", "1.4.2").await;

        LinkResolver::new(directory, gateways)
    }

    #[tokio::test]
    async fn locates_the_lowest_id_match() {
        let resolver = resolver().await;

        let machine = resolver.locate_machine_by_ip("88.10.0.4").await.unwrap();
        assert_eq!(machine.id, 1);
        assert_eq!(machine.serial, "CLIENT-01");

        assert!(resolver.locate_machine_by_ip("1.2.3.4").await.is_none());
        assert!(resolver.locate_machine_by_ip("").await.is_none());
    }

    #[tokio::test]
    async fn registration_from_a_machine_network_is_an_admin_candidate() {
        let resolver = resolver().await;

        let link = resolver.resolve_registration("88.10.0.4").await;
        assert_eq!(link.linked_machine_id, Some(1));
        assert_eq!(link.role, Role::AdminLocal);

        let unlinked = resolver.resolve_registration("203.0.113.7").await;
        assert_eq!(unlinked.linked_machine_id, None);
        assert_eq!(unlinked.role, Role::GuestLocal);
    }

    #[tokio::test]
    async fn manual_link_requires_same_network() {
        let resolver = resolver().await;

        // On the machine's network: fine, including with a gateway.
        resolver
            .validate_manual_link("88.10.0.4", false, Some(1), Some("gw-lyon-1"))
            .await
            .unwrap();

        // Elsewhere: refused.
        assert_eq!(
            resolver
                .validate_manual_link("203.0.113.7", false, Some(1), None)
                .await,
            Err(LinkError::IpMismatch)
        );
        assert_eq!(
            resolver
                .validate_manual_link("203.0.113.7", false, None, Some("gw-lyon-1"))
                .await,
            Err(LinkError::IpMismatch)
        );
    }

    #[tokio::test]
    async fn admins_skip_the_network_check_but_not_existence() {
        let resolver = resolver().await;

        resolver
            .validate_manual_link("203.0.113.7", true, Some(2), Some("gw-paris-2"))
            .await
            .unwrap();

        assert_eq!(
            resolver
                .validate_manual_link("203.0.113.7", true, Some(99), None)
                .await,
            Err(LinkError::MachineNotFound)
        );
        assert_eq!(
            resolver
                .validate_manual_link("203.0.113.7", true, None, Some("gw-nowhere"))
                .await,
            Err(LinkError::GatewayNotFound)
        );
    }

    #[tokio::test]
    async fn clearing_links_needs_no_validation() {
        let resolver = resolver().await;
        resolver
            .validate_manual_link("203.0.113.7", false, None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn nearby_filters_both_kinds_by_address() {
        let resolver = resolver().await;

        let nearby = resolver.nearby("88.10.0.4").await;
        assert_eq!(nearby.machines.len(), 2);
        assert_eq!(nearby.gateways.len(), 1);
        assert_eq!(nearby.gateways[0].hostname, "gw-lyon-1");
        assert_eq!(nearby.user_ip, "88.10.0.4");

        let nowhere = resolver.nearby("").await;
        assert!(nowhere.machines.is_empty());
        assert!(nowhere.gateways.is_empty());
    }
}
