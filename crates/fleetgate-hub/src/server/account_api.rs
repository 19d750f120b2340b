//! Account endpoints: registration, login, profile and device links.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use fleetgate_core::Provider;

use crate::audit::{AuditAction, AuditEvent, ResourceKind};
use crate::auth::password::{hash_password, verify_password};
use crate::linking::{LinkError, NearbyDevices};
use crate::storage::{DatabaseError, NewUserParams, User};

use super::AppState;
use super::extract::{ClientIp, RequirePrincipal, RequireService, SessionUser};

/// Body of a successful login: the session token and the account it belongs
/// to, so the console needs no second round-trip.
#[derive(Serialize)]
struct SessionResponse {
    token: String,
    user: User,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// `POST /api/auth/register`
///
/// The requester's address decides the device link: registering from a
/// machine's network makes the account a local-admin candidate for it. The
/// one-local-admin constraint lives in storage, so concurrent registrations
/// cannot both win the slot.
pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(req): Json<RegisterRequest>,
) -> Response {
    if req.email.is_empty() || req.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Email and password are required").into_response();
    }

    let password_hash = match hash_password(&req.password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Password hashing failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to process password")
                .into_response();
        }
    };

    let link = state.links.resolve_registration(&ip).await;
    let created = state
        .db
        .create_user(&NewUserParams {
            email: &req.email,
            password_hash: &password_hash,
            role: link.role,
            provider: Provider::Email,
            linked_machine_id: link.linked_machine_id,
            linked_gateway_id: None,
        })
        .await;

    let user = match created {
        Ok(user) => user,
        Err(DatabaseError::AlreadyExists(_)) => {
            return (StatusCode::CONFLICT, "User already exists").into_response();
        }
        Err(e) => {
            error!(error = %e, "Registration failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user").into_response();
        }
    };

    state
        .audit
        .record(AuditEvent {
            actor_user_id: Some(user.id),
            actor_label: &user.email,
            action: AuditAction::Register,
            resource: ResourceKind::User,
            resource_id: &user.email,
            ip: &ip,
            details: "",
        })
        .await;

    info!(user_id = user.id, role = %user.role, "User registered");
    (
        StatusCode::CREATED,
        Json(json!({"message": "User registered successfully"})),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// `POST /api/auth/login`
///
/// Unknown account and wrong password produce the same 401, so the endpoint
/// does not confirm which emails exist.
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(req): Json<LoginRequest>,
) -> Response {
    let user = match state.db.find_user_by_email(&req.email).await {
        Ok(Some(user)) => user,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response(),
        Err(e) => {
            error!(error = %e, "Login lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    if user.is_federated_only() {
        return (
            StatusCode::UNAUTHORIZED,
            format!("Please login with {}", user.provider),
        )
            .into_response();
    }

    match verify_password(&req.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response(),
        Err(e) => {
            error!(error = %e, "Password verification failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to verify credentials")
                .into_response();
        }
    }

    finish_login(&state, user, &ip).await
}

#[derive(Deserialize)]
pub struct FederatedRequest {
    #[serde(default)]
    email: String,
    provider: Provider,
}

/// `POST /api/auth/federated` — session issuance for an identity the OAuth
/// front layer has already verified. Service-token only: the hub trusts the
/// email because the caller is first-party.
pub async fn federated_login(
    _service: RequireService,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(req): Json<FederatedRequest>,
) -> Response {
    if req.email.is_empty() {
        return (StatusCode::BAD_REQUEST, "Email is required").into_response();
    }

    let existing = match state.db.find_user_by_email(&req.email).await {
        Ok(existing) => existing,
        Err(e) => {
            error!(error = %e, "Federated lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    let user = match existing {
        Some(user) => user,
        None => {
            // First federated sign-in: provision the account with the same
            // IP-based link resolution as a password registration.
            let link = state.links.resolve_registration(&ip).await;
            let created = state
                .db
                .create_user(&NewUserParams {
                    email: &req.email,
                    password_hash: "",
                    role: link.role,
                    provider: req.provider,
                    linked_machine_id: link.linked_machine_id,
                    linked_gateway_id: None,
                })
                .await;
            match created {
                Ok(user) => {
                    state
                        .audit
                        .record(AuditEvent {
                            actor_user_id: Some(user.id),
                            actor_label: &user.email,
                            action: AuditAction::Register,
                            resource: ResourceKind::User,
                            resource_id: &user.email,
                            ip: &ip,
                            details: "",
                        })
                        .await;
                    info!(user_id = user.id, provider = %user.provider, "Federated account created");
                    user
                }
                Err(e) => {
                    error!(error = %e, "Federated account creation failed");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user")
                        .into_response();
                }
            }
        }
    };

    finish_login(&state, user, &ip).await
}

/// Stamp the login, issue the session token and write the audit row.
async fn finish_login(state: &AppState, user: User, ip: &str) -> Response {
    if let Err(e) = state.db.update_last_login(user.id).await {
        warn!(error = %e, user_id = user.id, "Failed to stamp last login");
    }

    let token = match state.authority.issue(&user.email, user.role) {
        Ok((token, _expires)) => token,
        Err(e) => {
            error!(error = %e, "Token issuance failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate token")
                .into_response();
        }
    };

    state
        .audit
        .record(AuditEvent {
            actor_user_id: Some(user.id),
            actor_label: &user.email,
            action: AuditAction::Login,
            resource: ResourceKind::User,
            resource_id: &user.email,
            ip,
            details: "",
        })
        .await;

    info!(user_id = user.id, "User logged in");
    Json(SessionResponse { token, user }).into_response()
}

/// `GET /api/profile` — the caller's own account. The password hash never
/// serializes.
pub async fn get_profile(SessionUser(user): SessionUser) -> Json<User> {
    Json(user)
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    password: String,
}

/// `PUT /api/profile` — password change.
pub async fn update_profile(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    SessionUser(user): SessionUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Response {
    if req.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Nothing to update").into_response();
    }

    let password_hash = match hash_password(&req.password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Password hashing failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to process password")
                .into_response();
        }
    };

    if let Err(e) = state.db.update_password(user.id, &password_hash).await {
        error!(error = %e, user_id = user.id, "Password update failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update profile").into_response();
    }

    state
        .audit
        .record(AuditEvent {
            actor_user_id: Some(user.id),
            actor_label: &user.email,
            action: AuditAction::UpdateProfile,
            resource: ResourceKind::User,
            resource_id: &user.email,
            ip: &ip,
            details: "Password changed",
        })
        .await;

    StatusCode::OK.into_response()
}

/// `DELETE /api/profile` — self-service account deletion. The audit row
/// outlives the account; its label keeps the email readable afterwards.
pub async fn delete_profile(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    SessionUser(user): SessionUser,
) -> Response {
    match state.db.delete_user(user.id).await {
        Ok(true) => {}
        Ok(false) => return (StatusCode::NOT_FOUND, "User not found").into_response(),
        Err(e) => {
            error!(error = %e, user_id = user.id, "Account deletion failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete profile")
                .into_response();
        }
    }

    state
        .audit
        .record(AuditEvent {
            actor_user_id: Some(user.id),
            actor_label: &user.email,
            action: AuditAction::DeleteProfile,
            resource: ResourceKind::User,
            resource_id: &user.email,
            ip: &ip,
            details: "Account deleted by owner",
        })
        .await;

    info!(user_id = user.id, "Account deleted");
    StatusCode::OK.into_response()
}

#[derive(Deserialize)]
pub struct UpdateLinksRequest {
    #[serde(default)]
    linked_machine_id: Option<i64>,
    #[serde(default)]
    linked_gateway_id: Option<String>,
}

/// `PUT /api/profile/links`
///
/// Both links are replaced wholesale: an absent field clears its link. Only
/// devices currently seen on the requester's network may be targeted;
/// administrators are exempt from the network check but not from existence.
pub async fn update_links(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    SessionUser(user): SessionUser,
    Json(req): Json<UpdateLinksRequest>,
) -> Response {
    let validated = state
        .links
        .validate_manual_link(
            &ip,
            user.role.is_admin(),
            req.linked_machine_id,
            req.linked_gateway_id.as_deref(),
        )
        .await;

    if let Err(e) = validated {
        let status = match e {
            LinkError::MachineNotFound | LinkError::GatewayNotFound => StatusCode::NOT_FOUND,
            LinkError::IpMismatch => StatusCode::FORBIDDEN,
        };
        return (status, e.to_string()).into_response();
    }

    let updated = state
        .db
        .update_user_links(
            user.id,
            req.linked_machine_id,
            req.linked_gateway_id.as_deref(),
        )
        .await;
    match updated {
        Ok(()) => {}
        Err(DatabaseError::AlreadyExists(reason)) => {
            return (StatusCode::CONFLICT, reason).into_response();
        }
        Err(e) => {
            error!(error = %e, user_id = user.id, "Link update failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update links").into_response();
        }
    }

    let details = format!(
        "machine: {}, gateway: {}",
        req.linked_machine_id
            .map_or_else(|| "none".to_string(), |id| id.to_string()),
        req.linked_gateway_id.as_deref().unwrap_or("none"),
    );
    state
        .audit
        .record(AuditEvent {
            actor_user_id: Some(user.id),
            actor_label: &user.email,
            action: AuditAction::UpdateLinks,
            resource: ResourceKind::User,
            resource_id: &user.email,
            ip: &ip,
            details: &details,
        })
        .await;

    StatusCode::OK.into_response()
}

/// `GET /api/devices/nearby` — devices currently seen on the requester's
/// address, for the link-picker in the console.
pub async fn nearby_devices(
    RequirePrincipal(_principal): RequirePrincipal,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
) -> Json<NearbyDevices> {
    info!(ip = %ip, "Nearby device search");
    Json(state.links.nearby(&ip).await)
}
