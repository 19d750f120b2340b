//! Session token claims.

use fleetgate_core::Role;
use serde::{Deserialize, Serialize};

/// Claims embedded in session tokens.
///
/// The set is fixed: subject (account email), access tier, expiry, issuer.
/// Adding claims here changes the wire contract with the admin console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the account email.
    pub sub: String,
    /// Access tier carried by the token.
    pub role: Role,
    /// Expiration (unix timestamp).
    pub exp: i64,
    /// Issuer.
    pub iss: String,
}
