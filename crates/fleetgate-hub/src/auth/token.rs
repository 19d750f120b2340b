//! Bearer-token resolution and issuance.
//!
//! Two kinds of bearer reach the hub: the static service token shared with
//! first-party tooling, and HS256-signed session tokens issued at login.

use fleetgate_core::Role;
use fleetgate_core::config::AuthConfig;
use fleetgate_core::db::unix_timestamp;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use super::claims::SessionClaims;

/// Bearer resolution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Not the service token and not a valid session token. The caller only
    /// ever sees a 401; the distinction between bad signature, expiry and
    /// issuer mismatch stays in the logs.
    #[error("invalid or expired bearer token")]
    Invalid,
}

/// The resolved caller of a token-protected endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// First-party service holding the static shared secret. Unconditional
    /// access; role checks do not apply.
    Service,
    /// Account with a valid session token.
    User { email: String, role: Role },
}

impl Principal {
    /// Whether this principal may reach administrative endpoints.
    pub fn is_admin(&self) -> bool {
        match self {
            Self::Service => true,
            Self::User { role, .. } => role.is_admin(),
        }
    }

    /// Short label for audit rows and logs.
    pub fn label(&self) -> &str {
        match self {
            Self::Service => "service",
            Self::User { email, .. } => email,
        }
    }
}

/// Verifies and issues bearer tokens.
#[derive(Clone)]
pub struct TokenAuthority {
    service_token: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    session_ttl_secs: i64,
}

impl TokenAuthority {
    pub fn new(config: &AuthConfig) -> Self {
        // Pin the algorithm: a token signed any other way (including "none")
        // must not validate.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.jwt_issuer]);

        Self {
            service_token: config.service_token.clone(),
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.jwt_issuer.clone(),
            session_ttl_secs: config.session_ttl_secs,
        }
    }

    /// Resolve a bearer token into a [`Principal`].
    ///
    /// The static service token is checked first, by verbatim comparison: it
    /// is not a JWT, carries no expiry, and keeps working across JWT secret
    /// rotation.
    pub fn resolve(&self, bearer: &str) -> Result<Principal, TokenError> {
        if !bearer.is_empty() && bearer == self.service_token {
            return Ok(Principal::Service);
        }

        let data =
            jsonwebtoken::decode::<SessionClaims>(bearer, &self.decoding_key, &self.validation)
                .map_err(|_| TokenError::Invalid)?;

        Ok(Principal::User {
            email: data.claims.sub,
            role: data.claims.role,
        })
    }

    /// Issue a session token for an account. Returns the token and its
    /// expiry timestamp.
    pub fn issue(
        &self,
        email: &str,
        role: Role,
    ) -> Result<(String, i64), jsonwebtoken::errors::Error> {
        let exp = unix_timestamp() + self.session_ttl_secs;
        let claims = SessionClaims {
            sub: email.to_string(),
            role,
            exp,
            iss: self.issuer.clone(),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, exp))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            service_token: "svc-secret".into(),
            jwt_secret: "test-signing-secret".into(),
            jwt_issuer: "fleetgate-test".into(),
            session_ttl_secs: 3600,
        }
    }

    fn authority() -> TokenAuthority {
        TokenAuthority::new(&test_config())
    }

    #[test]
    fn issue_and_resolve_session_token() {
        let authority = authority();
        let (token, exp) = authority.issue("alice@example.com", Role::User).unwrap();
        assert!(exp > unix_timestamp());

        let principal = authority.resolve(&token).unwrap();
        assert_eq!(
            principal,
            Principal::User {
                email: "alice@example.com".into(),
                role: Role::User,
            }
        );
        assert!(!principal.is_admin());
    }

    #[test]
    fn service_token_resolves_without_any_expiry() {
        let mut config = test_config();
        // Session tokens from this authority are already expired.
        config.session_ttl_secs = -3600;
        let authority = TokenAuthority::new(&config);

        let (token, _) = authority.issue("alice@example.com", Role::AdminGlobal).unwrap();
        assert_eq!(authority.resolve(&token), Err(TokenError::Invalid));

        // The static secret is unaffected.
        let principal = authority.resolve("svc-secret").unwrap();
        assert_eq!(principal, Principal::Service);
        assert!(principal.is_admin());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let authority = authority();
        let mut other_config = test_config();
        other_config.jwt_secret = "a-different-secret".into();
        let other = TokenAuthority::new(&other_config);

        let (token, _) = other.issue("alice@example.com", Role::AdminGlobal).unwrap();
        assert_eq!(authority.resolve(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let mut config = test_config();
        config.jwt_issuer = "someone-else".into();
        let other = TokenAuthority::new(&config);

        let (token, _) = other.issue("alice@example.com", Role::User).unwrap();
        assert_eq!(authority().resolve(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn wrong_algorithm_is_rejected() {
        let config = test_config();
        let claims = SessionClaims {
            sub: "alice@example.com".into(),
            role: Role::AdminGlobal,
            exp: unix_timestamp() + 3600,
            iss: config.jwt_issuer.clone(),
        };
        // Same secret, different algorithm: must not pass the HS256 pin.
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert_eq!(authority().resolve(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_bearer_is_rejected() {
        assert_eq!(authority().resolve(""), Err(TokenError::Invalid));
        assert_eq!(
            authority().resolve("not-a-token"),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn admin_tiers_map_through_principal() {
        let authority = authority();
        for (role, expect_admin) in [
            (Role::AdminGlobal, true),
            (Role::AdminLocal, true),
            (Role::User, false),
            (Role::GuestLocal, false),
        ] {
            let (token, _) = authority.issue("ops@example.com", role).unwrap();
            let principal = authority.resolve(&token).unwrap();
            assert_eq!(principal.is_admin(), expect_admin, "{role}");
        }
    }
}
