//! Fleetgate Hub Library
//!
//! Core functionality for the fleetgate hub:
//! - Legacy device credential decoding and the strict/lax access gate
//! - Machine directory with JSON snapshot persistence and geolocation
//! - SQLite storage for accounts and the append-only audit trail
//! - Bearer-token authentication (service secret and HS256 sessions)
//! - HTTP API: device protocol, accounts, admin console

pub mod audit;
pub mod auth;
pub mod directory;
pub mod gate;
pub mod linking;
pub mod server;
pub mod storage;
pub mod telemetry;
