//! Fleetgate Core Library
//!
//! Shared functionality for Fleetgate components:
//! - Role and provider enumerations with the assignment matrix
//! - Hub configuration object
//! - `SQLite` pool helpers and timestamps
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod roles;
pub mod tracing_init;

pub use config::{AppConfig, AuthConfig, GeoConfig};
pub use error::{Error, Result};
pub use roles::{Provider, Role};
