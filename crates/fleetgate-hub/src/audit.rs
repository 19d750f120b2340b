//! Append-only audit trail.
//!
//! Writes are fire-and-forget: a failed insert is logged and swallowed so
//! the trail can never abort the caller's primary operation. Reads are for
//! the console and do propagate errors.

use tracing::warn;

use crate::storage::{AuditEntry, AuditScope, DatabaseError, HubDatabase, NewAuditEntry};

/// What happened. Stored as the legacy console's tag strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    Register,
    UpdateRole,
    UpdateProfile,
    DeleteProfile,
    UpdateLinks,
    ActivateMachine,
    DeactivateMachine,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Register => "REGISTER",
            Self::UpdateRole => "UPDATE_ROLE",
            Self::UpdateProfile => "UPDATE_PROFILE",
            Self::DeleteProfile => "DELETE_PROFILE",
            Self::UpdateLinks => "UPDATE_LINKS",
            Self::ActivateMachine => "ACTIVATE_MACHINE",
            Self::DeactivateMachine => "DEACTIVATE_MACHINE",
        }
    }
}

/// What it happened to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    User,
    Machine,
    Gateway,
}

impl ResourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Machine => "MACHINE",
            Self::Gateway => "GATEWAY",
        }
    }
}

/// One event to append.
pub struct AuditEvent<'a> {
    /// `None` for system or anonymous actors.
    pub actor_user_id: Option<i64>,
    /// Email snapshot; entries outlive account deletion.
    pub actor_label: &'a str,
    pub action: AuditAction,
    pub resource: ResourceKind,
    pub resource_id: &'a str,
    pub ip: &'a str,
    pub details: &'a str,
}

/// Records and reads the audit trail.
#[derive(Clone)]
pub struct AuditRecorder {
    db: HubDatabase,
}

impl AuditRecorder {
    pub fn new(db: HubDatabase) -> Self {
        Self { db }
    }

    /// Append one entry. Persistence failures are logged and swallowed.
    pub async fn record(&self, event: AuditEvent<'_>) {
        let entry = NewAuditEntry {
            actor_user_id: event.actor_user_id,
            actor_label: event.actor_label,
            action: event.action.as_str(),
            resource_type: event.resource.as_str(),
            resource_id: event.resource_id,
            ip: event.ip,
            details: event.details,
        };

        if let Err(e) = self.db.insert_audit(&entry).await {
            warn!(
                error = %e,
                action = event.action.as_str(),
                actor = event.actor_label,
                "Audit write failed"
            );
        }
    }

    /// Read one page of the trail, newest first.
    pub async fn query(
        &self,
        scope: AuditScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEntry>, DatabaseError> {
        self.db.audit_page(scope, limit, offset).await
    }
}
