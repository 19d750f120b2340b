//! Shared fixtures for the endpoint tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use tower::ServiceExt;

use fleetgate_core::Role;
use fleetgate_core::config::AuthConfig;

use crate::audit::AuditRecorder;
use crate::auth::TokenAuthority;
use crate::directory::snapshot::testing::MemorySnapshotStore;
use crate::directory::{GatewayRegistry, MachineDirectory, MachineIdentity};
use crate::gate::AccessGate;
use crate::linking::LinkResolver;
use crate::storage::{HubDatabase, NewUserParams};
use crate::telemetry::TelemetrySink;

use super::{AppState, build_router};

pub const SERVICE_TOKEN: &str = "test-service-token";

/// 16 'a' characters, a colon, 16 'b' characters.
pub const FACTORY_HEADER: &str = "Basic YWFhYWFhYWFhYWFhYWFhYTpiYmJiYmJiYmJiYmJiYmJi";
pub const FACTORY_KEY: &str = "aaaaaaaaaaaaaaaabbbbbbbbbbbbbbbb";

pub async fn test_state() -> AppState {
    let directory = Arc::new(
        MachineDirectory::load(Box::new(MemorySnapshotStore::default()), None)
            .await
            .unwrap(),
    );
    let db = HubDatabase::open_in_memory().await.unwrap();
    let gateways = GatewayRegistry::new();
    let authority = Arc::new(TokenAuthority::new(&AuthConfig {
        service_token: SERVICE_TOKEN.to_string(),
        jwt_secret: "test-signing-secret".to_string(),
        jwt_issuer: "fleetgate-test".to_string(),
        session_ttl_secs: 3600,
    }));

    AppState {
        gate: Arc::new(AccessGate::new(Arc::clone(&directory))),
        links: Arc::new(LinkResolver::new(Arc::clone(&directory), gateways.clone())),
        audit: AuditRecorder::new(db.clone()),
        telemetry: TelemetrySink::new(),
        directory,
        gateways,
        db,
        authority,
    }
}

pub async fn test_app() -> (Router, AppState) {
    let state = test_state().await;
    (build_router(state.clone()), state)
}

/// Send a request and return the raw response, for header assertions.
pub async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for &(name, value) in headers {
        builder = builder.header(name, value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

/// Send a request and return (status, body text).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<serde_json::Value>,
) -> (StatusCode, String) {
    let resp = send_raw(app, method, uri, headers, body).await;
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Seed a machine, optionally placing it on an address via a recorded
/// contact. Returns the directory record.
pub async fn seed_machine(
    state: &AppState,
    key: &str,
    serial: &str,
    active: bool,
    ip: &str,
) -> MachineIdentity {
    let machine = state.directory.provision(key, serial, active).await.unwrap();
    if !ip.is_empty() {
        state
            .directory
            .record_connection(key, ip, "seeded", "seed:ed")
            .await;
    }
    machine
}

/// Seed an account with the given role and machine link, and return a
/// session token for it.
pub async fn seeded_token(
    state: &AppState,
    email: &str,
    role: Role,
    machine: Option<i64>,
) -> String {
    state
        .db
        .create_user(&NewUserParams {
            email,
            password_hash: "",
            role,
            provider: fleetgate_core::Provider::Email,
            linked_machine_id: machine,
            linked_gateway_id: None,
        })
        .await
        .unwrap();
    let (token, _) = state.authority.issue(email, role).unwrap();
    token
}
