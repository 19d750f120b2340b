//! Administrative console endpoints.
//!
//! All routes require an admin-tier principal. What a local admin may see or
//! touch is further scoped to its own linked machine; the service secret and
//! global admins are unscoped.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use fleetgate_core::Role;

use crate::audit::{AuditAction, AuditEvent, ResourceKind};
use crate::auth::Principal;
use crate::directory::{DirectoryError, MachineOverview};
use crate::storage::{AuditScope, DatabaseError, User};

use super::AppState;
use super::extract::{ClientIp, RequireAdmin};

/// Fleet counters for the console dashboard.
#[derive(Serialize)]
pub struct AdminStats {
    /// Devices that have pushed a status since startup.
    connected_clients: usize,
    total_machines: usize,
    total_users: i64,
}

/// `GET /api/admin/stats`
pub async fn stats(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<AdminStats>, (StatusCode, &'static str)> {
    let total_users = state.db.count_users().await.map_err(|e| {
        error!(error = %e, "User count failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;

    Ok(Json(AdminStats {
        connected_clients: state.telemetry.count().await,
        total_machines: state.directory.count().await,
        total_users,
    }))
}

/// `GET /api/admin/machines` — the directory joined with connection details.
/// Composite keys are not part of the overview.
pub async fn machines(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Json<Vec<MachineOverview>> {
    Json(state.directory.list().await)
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    is_active: bool,
}

/// `PUT /api/admin/machines/{id}/active` — flip the gate flag for a machine.
pub async fn set_machine_active(
    RequireAdmin(principal): RequireAdmin,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(req): Json<SetActiveRequest>,
) -> Response {
    let machine = match state.directory.set_active(id, req.is_active).await {
        Ok(machine) => machine,
        Err(DirectoryError::NotFound) => {
            return (StatusCode::NOT_FOUND, "Machine not found").into_response();
        }
        Err(e) => {
            error!(error = %e, machine_id = id, "Activation persist failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist activation")
                .into_response();
        }
    };

    let action = if req.is_active {
        AuditAction::ActivateMachine
    } else {
        AuditAction::DeactivateMachine
    };
    let (actor_user_id, actor_label) = actor_identity(&state, &principal).await;
    let machine_id = id.to_string();
    state
        .audit
        .record(AuditEvent {
            actor_user_id,
            actor_label: &actor_label,
            action,
            resource: ResourceKind::Machine,
            resource_id: &machine_id,
            ip: &ip,
            details: &machine.serial,
        })
        .await;

    StatusCode::OK.into_response()
}

/// `GET /api/admin/users`
pub async fn users(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, (StatusCode, &'static str)> {
    let users = state.db.list_users().await.map_err(|e| {
        error!(error = %e, "User listing failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;
    Ok(Json(users))
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    role: Role,
}

/// `PUT /api/admin/users/{id}/role`
///
/// Two checks gate the change: the assignment matrix (a local admin can
/// never mint another admin), then the machine scope (a local admin only
/// touches accounts linked to its own machine). The service secret skips
/// both.
pub async fn set_user_role(
    RequireAdmin(principal): RequireAdmin,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(req): Json<SetRoleRequest>,
) -> Response {
    let target = match state.db.get_user(id).await {
        Ok(target) => target,
        Err(DatabaseError::NotFound(_)) => {
            return (StatusCode::NOT_FOUND, "User not found").into_response();
        }
        Err(e) => {
            error!(error = %e, "Role target lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    match &principal {
        Principal::Service => {}
        Principal::User { email, role } => {
            if !role.may_assign(req.role) {
                return (StatusCode::FORBIDDEN, "Role not assignable").into_response();
            }
            if *role == Role::AdminLocal {
                let actor = match state.db.find_user_by_email(email).await {
                    Ok(Some(actor)) => actor,
                    Ok(None) => return (StatusCode::FORBIDDEN, "Forbidden").into_response(),
                    Err(e) => {
                        error!(error = %e, "Role actor lookup failed");
                        return (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
                            .into_response();
                    }
                };
                let same_machine = matches!(
                    (actor.linked_machine_id, target.linked_machine_id),
                    (Some(a), Some(t)) if a == t
                );
                if !same_machine {
                    return (StatusCode::FORBIDDEN, "Target outside your machine scope")
                        .into_response();
                }
            }
        }
    }

    match state.db.update_user_role(id, req.role).await {
        Ok(()) => {}
        Err(DatabaseError::AlreadyExists(reason)) => {
            return (StatusCode::CONFLICT, reason).into_response();
        }
        Err(DatabaseError::NotFound(_)) => {
            return (StatusCode::NOT_FOUND, "User not found").into_response();
        }
        Err(e) => {
            error!(error = %e, user_id = id, "Role update failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update role").into_response();
        }
    }

    let (actor_user_id, actor_label) = actor_identity(&state, &principal).await;
    let details = format!("{} -> {}", target.role, req.role);
    state
        .audit
        .record(AuditEvent {
            actor_user_id,
            actor_label: &actor_label,
            action: AuditAction::UpdateRole,
            resource: ResourceKind::User,
            resource_id: &target.email,
            ip: &ip,
            details: &details,
        })
        .await;

    info!(user_id = id, role = %req.role, "Role updated");
    StatusCode::OK.into_response()
}

#[derive(Deserialize)]
pub struct AuditPageQuery {
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

/// `GET /api/admin/audit` — one page of the trail, newest first.
///
/// Global admins and the service secret read everything; a local admin reads
/// the actions of accounts linked to its own machine.
pub async fn audit_log(
    RequireAdmin(principal): RequireAdmin,
    State(state): State<AppState>,
    Query(page): Query<AuditPageQuery>,
) -> Response {
    let scope = match &principal {
        Principal::Service
        | Principal::User {
            role: Role::AdminGlobal,
            ..
        } => AuditScope::All,
        Principal::User {
            role: Role::AdminLocal,
            email,
        } => {
            let actor = match state.db.find_user_by_email(email).await {
                Ok(Some(actor)) => actor,
                Ok(None) => return (StatusCode::FORBIDDEN, "Forbidden").into_response(),
                Err(e) => {
                    error!(error = %e, "Audit actor lookup failed");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
                }
            };
            match actor.linked_machine_id {
                Some(machine_id) => AuditScope::Machine(machine_id),
                None => {
                    return (StatusCode::FORBIDDEN, "No linked machine for this admin")
                        .into_response();
                }
            }
        }
        // RequireAdmin already filtered the rest out.
        Principal::User { .. } => return (StatusCode::FORBIDDEN, "Forbidden").into_response(),
    };

    match state.audit.query(scope, page.limit, page.offset).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            error!(error = %e, "Audit page read failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// Audit identity of an admin principal. The service secret has no account
/// row; user principals are resolved so entries carry the actor id.
async fn actor_identity(state: &AppState, principal: &Principal) -> (Option<i64>, String) {
    match principal {
        Principal::Service => (None, "service".to_string()),
        Principal::User { email, .. } => {
            let id = state
                .db
                .find_user_by_email(email)
                .await
                .ok()
                .flatten()
                .map(|user| user.id);
            (id, email.clone())
        }
    }
}
