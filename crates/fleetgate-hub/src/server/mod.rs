//! HTTP surface of the hub.
//!
//! Three route groups share one state: the legacy device endpoints (Basic
//! credentials through the access gate), the account endpoints (session
//! tokens), and the admin console (admin tiers or the service secret).

pub mod account_api;
pub mod admin_api;
pub mod device_api;
pub mod extract;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod test_helpers;


use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};

use crate::audit::AuditRecorder;
use crate::auth::TokenAuthority;
use crate::directory::{GatewayRegistry, MachineDirectory};
use crate::gate::AccessGate;
use crate::linking::LinkResolver;
use crate::storage::HubDatabase;
use crate::telemetry::TelemetrySink;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<MachineDirectory>,
    pub gate: Arc<AccessGate>,
    pub gateways: GatewayRegistry,
    pub db: HubDatabase,
    pub authority: Arc<TokenAuthority>,
    pub audit: AuditRecorder,
    pub telemetry: TelemetrySink,
    pub links: Arc<LinkResolver>,
}

/// Build the full route table.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Legacy appliance protocol
        .route("/api/serverinfos", get(device_api::serverinfos))
        .route("/api/mystatus", post(device_api::mystatus))
        .route("/api/myactions", get(device_api::myactions))
        .route("/api/gateway/report", post(device_api::gateway_report))
        // Accounts
        .route("/api/auth/register", post(account_api::register))
        .route("/api/auth/login", post(account_api::login))
        .route("/api/auth/federated", post(account_api::federated_login))
        .route(
            "/api/profile",
            get(account_api::get_profile)
                .put(account_api::update_profile)
                .delete(account_api::delete_profile),
        )
        .route("/api/profile/links", put(account_api::update_links))
        .route("/api/devices/nearby", get(account_api::nearby_devices))
        // Admin console
        .route("/api/admin/stats", get(admin_api::stats))
        .route("/api/admin/machines", get(admin_api::machines))
        .route(
            "/api/admin/machines/{id}/active",
            put(admin_api::set_machine_active),
        )
        .route("/api/admin/users", get(admin_api::users))
        .route("/api/admin/users/{id}/role", put(admin_api::set_user_role))
        .route("/api/admin/audit", get(admin_api::audit_log))
        .with_state(state)
}
