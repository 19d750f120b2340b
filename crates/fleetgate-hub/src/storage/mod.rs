//! SQLite storage for the fleetgate hub.
//!
//! Persists console accounts and the append-only audit trail. Machine
//! identity is not here: it lives in the directory snapshot file.

mod db;
mod models;
mod queries;
mod queries_audit;


pub use db::HubDatabase;
pub use fleetgate_core::db::DatabaseError;
pub use models::*;
pub use queries::NewUserParams;
pub use queries_audit::{AuditScope, NewAuditEntry, DEFAULT_AUDIT_PAGE};
