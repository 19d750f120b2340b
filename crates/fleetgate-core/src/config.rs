//! Hub configuration.
//!
//! One explicit [`AppConfig`] is built at startup (CLI flags / environment)
//! and handed to the components that need it. Nothing in the hub reads
//! configuration from ambient globals.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Development fallback for the static service token. Deployments must
/// override it before `production` mode will start.
pub const DEV_SERVICE_TOKEN: &str = "dev-service-token-change-me";

/// Development fallback for the session-token signing secret.
pub const DEV_JWT_SECRET: &str = "default-insecure-jwt-secret-change-me";

/// Top-level hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP listener binds to.
    pub listen_addr: SocketAddr,
    /// SQLite database file for accounts and the audit trail.
    /// `None` resolves to the default under the user's home directory.
    pub database_path: Option<PathBuf>,
    /// JSON snapshot file for the machine directory.
    pub snapshot_path: Option<PathBuf>,
    /// Refuse to start with development fallback secrets.
    pub production: bool,
    pub auth: AuthConfig,
    pub geo: GeoConfig,
}

/// Token verification and issuance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Static shared secret for first-party services. Compared verbatim and
    /// grants unconditional access, so it must be rotated out-of-band.
    pub service_token: String,
    /// HS256 signing secret for session tokens.
    pub jwt_secret: String,
    /// Issuer claim stamped into (and required from) session tokens.
    pub jwt_issuer: String,
    /// Session token lifetime in seconds.
    pub session_ttl_secs: i64,
}

/// Geolocation enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    pub enabled: bool,
    /// Lookup endpoint; the client IP is appended as a path segment.
    pub endpoint: String,
    /// Delay before each lookup, smoothing bursts against the rate-limited
    /// public endpoint.
    pub startup_delay_secs: u64,
    /// Bound of the enrichment queue; full means new jobs are dropped.
    pub queue_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_path: None,
            snapshot_path: None,
            production: false,
            auth: AuthConfig::default(),
            geo: GeoConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            service_token: DEV_SERVICE_TOKEN.to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_issuer: "fleetgate".to_string(),
            session_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://ip-api.com/json".to_string(),
            startup_delay_secs: 1,
            queue_capacity: 64,
        }
    }
}

impl AppConfig {
    /// Validate the assembled configuration before anything starts.
    pub fn validate(&self) -> Result<()> {
        if self.production {
            if self.auth.jwt_secret == DEV_JWT_SECRET {
                return Err(Error::Config(
                    "production mode requires overriding the development JWT secret".into(),
                ));
            }
            if self.auth.service_token == DEV_SERVICE_TOKEN {
                return Err(Error::Config(
                    "production mode requires overriding the development service token".into(),
                ));
            }
        }
        if self.auth.service_token.is_empty() || self.auth.jwt_secret.is_empty() {
            return Err(Error::Config(
                "service token and JWT secret must be non-empty".into(),
            ));
        }
        if self.auth.session_ttl_secs <= 0 {
            return Err(Error::Config("session TTL must be positive".into()));
        }
        if self.geo.enabled && self.geo.queue_capacity == 0 {
            return Err(Error::Config(
                "geolocation queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_outside_production() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr.port(), 8080);
        assert!(config.geo.enabled);
    }

    #[test]
    fn production_rejects_development_secrets() {
        let mut config = AppConfig {
            production: true,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        config.auth.jwt_secret = "rotated".into();
        // Service token still at its fallback.
        assert!(config.validate().is_err());

        config.auth.service_token = "rotated-too".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_secrets_are_rejected_everywhere() {
        let mut config = AppConfig::default();
        config.auth.service_token = String::new();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.jwt_secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn nonsensical_limits_are_rejected() {
        let mut config = AppConfig::default();
        config.auth.session_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.geo.queue_capacity = 0;
        assert!(config.validate().is_err());
        config.geo.enabled = false;
        assert!(config.validate().is_ok());
    }
}
