//! Data models for fleetgate hub storage.

use fleetgate_core::{Provider, Role};
use serde::{Deserialize, Serialize};

/// A console account.
///
/// `password_hash` is empty for federated accounts and never leaves the
/// process in API responses.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub provider: Provider,
    pub linked_machine_id: Option<i64>,
    pub linked_gateway_id: Option<String>,
    pub created_at: i64,
    pub last_login_at: i64,
}

impl User {
    /// Federated accounts have no password until they set one.
    pub fn is_federated_only(&self) -> bool {
        self.provider != Provider::Email && self.password_hash.is_empty()
    }
}

/// One immutable audit trail row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_user_id: Option<i64>,
    pub actor_label: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub ip: String,
    pub details: String,
    pub created_at: i64,
}
