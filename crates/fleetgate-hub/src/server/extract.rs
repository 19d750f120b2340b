//! Typed request extractors.
//!
//! Every handler states its access requirement in its signature: device
//! routes take a [`StrictDevice`] or [`LaxDevice`], console routes take one
//! of the bearer extractors. Rejections carry the exact status and body the
//! legacy clients and the console expect.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::auth::Principal;
use crate::gate::{DenyReason, DeviceIdentity, GateMode, GateOutcome};
use crate::storage::User;

use super::AppState;

/// Requester address: first `X-Forwarded-For` entry when the hub sits behind
/// a proxy, otherwise the peer address.
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(client_ip(parts)))
    }
}

fn client_ip(parts: &Parts) -> String {
    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

/// Device-gate refusal mapped onto the legacy wire contract.
pub struct GateRejection(pub DenyReason);

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        match self.0 {
            // The retry hint makes old firmware re-send its stored credential
            // instead of giving up.
            DenyReason::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic")],
            )
                .into_response(),
            DenyReason::Inactive => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

/// Runs the device gate in strict mode: unusable credentials and inactive
/// machines are rejected.
pub struct StrictDevice(pub DeviceIdentity);

impl FromRequestParts<AppState> for StrictDevice {
    type Rejection = GateRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        run_gate(parts, state, GateMode::Strict).await.map(Self)
    }
}

/// Runs the device gate in lax mode: callers without a usable identity
/// proceed anonymously.
pub struct LaxDevice(pub DeviceIdentity);

impl FromRequestParts<AppState> for LaxDevice {
    type Rejection = GateRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        run_gate(parts, state, GateMode::Lax).await.map(Self)
    }
}

async fn run_gate(
    parts: &Parts,
    state: &AppState,
    mode: GateMode,
) -> Result<DeviceIdentity, GateRejection> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let ip = client_ip(parts);

    match state.gate.authorize(mode, auth_header, &ip).await {
        GateOutcome::Proceed(identity) => Ok(identity),
        GateOutcome::Denied(reason) => Err(GateRejection(reason)),
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Any resolved principal: the service secret or a valid session token.
pub struct RequirePrincipal(pub Principal);

impl FromRequestParts<AppState> for RequirePrincipal {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Err((StatusCode::UNAUTHORIZED, "Missing credentials"));
        };
        state
            .authority
            .resolve(token)
            .map(Self)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid token"))
    }
}

/// A principal allowed on administrative routes (either admin tier, or the
/// service secret).
pub struct RequireAdmin(pub Principal);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequirePrincipal(principal) =
            RequirePrincipal::from_request_parts(parts, state).await?;
        if !principal.is_admin() {
            return Err((StatusCode::FORBIDDEN, "Forbidden"));
        }
        Ok(Self(principal))
    }
}

/// The service secret only. Collector and federation endpoints.
pub struct RequireService;

impl FromRequestParts<AppState> for RequireService {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequirePrincipal(principal) =
            RequirePrincipal::from_request_parts(parts, state).await?;
        match principal {
            Principal::Service => Ok(Self),
            Principal::User { .. } => Err((StatusCode::FORBIDDEN, "Forbidden")),
        }
    }
}

/// Session principal resolved to its account row. Rejects the service
/// principal: it has no account to act on.
pub struct SessionUser(pub User);

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequirePrincipal(principal) =
            RequirePrincipal::from_request_parts(parts, state).await?;
        let Principal::User { email, .. } = principal else {
            return Err((StatusCode::FORBIDDEN, "Service token has no profile"));
        };

        match state.db.find_user_by_email(&email).await {
            Ok(Some(user)) => Ok(Self(user)),
            // Token outlived the account.
            Ok(None) => Err((StatusCode::NOT_FOUND, "User not found")),
            Err(e) => {
                warn!(error = %e, "Session account lookup failed");
                Err((StatusCode::INTERNAL_SERVER_ERROR, "Database error"))
            }
        }
    }
}
