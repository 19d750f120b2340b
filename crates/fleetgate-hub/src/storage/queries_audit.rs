//! Audit trail queries for the fleetgate hub.
//!
//! The trail is append-only: rows are inserted and read, never updated or
//! deleted.

use fleetgate_core::db::{unix_timestamp, DatabaseError};

use super::db::HubDatabase;
use super::models::AuditEntry;

/// Page size applied when the caller passes a non-positive limit.
pub const DEFAULT_AUDIT_PAGE: i64 = 100;

/// Visibility scope for audit reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditScope {
    /// Everything (global admins).
    All,
    /// Actions performed by users linked to the given machine (local admins).
    Machine(i64),
    /// Actions performed by one user (self-view).
    Actor(i64),
}

/// Parameters for appending an audit entry.
pub struct NewAuditEntry<'a> {
    pub actor_user_id: Option<i64>,
    pub actor_label: &'a str,
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: &'a str,
    pub ip: &'a str,
    pub details: &'a str,
}

impl HubDatabase {
    /// Append one audit entry.
    pub async fn insert_audit(&self, entry: &NewAuditEntry<'_>) -> Result<i64, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "INSERT INTO audit_log (actor_user_id, actor_label, action, resource_type, resource_id, ip, details, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.actor_user_id)
        .bind(entry.actor_label)
        .bind(entry.action)
        .bind(entry.resource_type)
        .bind(entry.resource_id)
        .bind(entry.ip)
        .bind(entry.details)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Read one page of the trail, newest first.
    pub async fn audit_page(
        &self,
        scope: AuditScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEntry>, DatabaseError> {
        let limit = if limit <= 0 { DEFAULT_AUDIT_PAGE } else { limit };

        let entries = match scope {
            AuditScope::All => {
                sqlx::query_as::<_, AuditEntry>(
                    "SELECT * FROM audit_log ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await?
            }
            AuditScope::Machine(machine_id) => {
                sqlx::query_as::<_, AuditEntry>(
                    "SELECT a.* FROM audit_log a JOIN users u ON a.actor_user_id = u.id WHERE u.linked_machine_id = ? ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?",
                )
                .bind(machine_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await?
            }
            AuditScope::Actor(user_id) => {
                sqlx::query_as::<_, AuditEntry>(
                    "SELECT * FROM audit_log WHERE actor_user_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                )
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(entries)
    }
}
