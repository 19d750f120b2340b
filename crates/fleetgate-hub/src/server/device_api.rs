//! Legacy appliance endpoints and the collector report.
//!
//! The appliance protocol predates this hub and cannot change: envelope
//! fields, casing and status codes are contractual. Handlers here stay thin;
//! the gate has already resolved the caller by the time they run.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::telemetry::ExchangeValue;

use super::AppState;
use super::extract::{ClientIp, LaxDevice, RequireService, StrictDevice};

/// Indices of the state values every appliance is asked to collect.
const COLLECTED_INFOS: [i32; 8] = [363, 349, 350, 351, 352, 353, 11, 920];

/// Poll envelope. Field names and the string-typed `newversion` are part of
/// the firmware contract.
#[derive(Serialize)]
pub struct ServerInfos {
    isconnected: bool,
    infos: [i32; 8],
    newversion: &'static str,
}

/// `GET /api/serverinfos` — the periodic poll. Lax: unknown and inactive
/// machines receive the same envelope as active ones.
pub async fn serverinfos(LaxDevice(identity): LaxDevice) -> Json<ServerInfos> {
    info!(client = identity.label(), "Server infos requested");
    Json(ServerInfos {
        isconnected: false,
        infos: COLLECTED_INFOS,
        newversion: "no",
    })
}

#[derive(Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    version: String,
    #[serde(default)]
    ek: Vec<ExchangeValue>,
}

/// `POST /api/mystatus` — full state push from an appliance. Strict; replies
/// 201 with an empty body, which is all the firmware checks.
pub async fn mystatus(
    StrictDevice(identity): StrictDevice,
    State(state): State<AppState>,
    Json(report): Json<StatusReport>,
) -> StatusCode {
    info!(
        client = identity.label(),
        version = %report.version,
        values = report.ek.len(),
        "Status received"
    );
    state
        .telemetry
        .store(identity.label(), report.version, report.ek)
        .await;
    StatusCode::CREATED
}

/// `GET /api/myactions` — pending remote actions. The hub observes but never
/// commands, so the object is always empty.
pub async fn myactions(StrictDevice(identity): StrictDevice) -> Json<serde_json::Value> {
    info!(client = identity.label(), "Actions requested");
    Json(json!({}))
}

#[derive(Deserialize)]
pub struct GatewayReport {
    hostname: String,
    #[serde(default)]
    version: String,
    /// Address as the collector sees itself; when absent the hub records the
    /// peer address instead.
    #[serde(default)]
    ip: String,
}

/// `POST /api/gateway/report` — periodic check-in from a field collector.
pub async fn gateway_report(
    _service: RequireService,
    ClientIp(peer_ip): ClientIp,
    State(state): State<AppState>,
    Json(report): Json<GatewayReport>,
) -> StatusCode {
    if report.hostname.is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    let ip = if report.ip.is_empty() {
        peer_ip
    } else {
        report.ip
    };
    state
        .gateways
        .report(&report.hostname, &ip, &report.version)
        .await;
    StatusCode::OK
}
