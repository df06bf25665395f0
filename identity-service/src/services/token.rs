//! Access-token service.
//!
//! Access tokens are short-lived HS256 JWTs. Signature validity alone never
//! authenticates a request: the referenced session is re-checked against the
//! store on every request so revocation takes effect immediately.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Identity, Role, Session};

/// Claims carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (identity id)
    pub sub: Uuid,
    /// Organization scope; None only for legacy admin accounts
    pub org: Option<Uuid>,
    /// Role code
    pub role: String,
    /// Session id; checked against the session store on every request
    pub sid: Uuid,
    /// Identity kind code
    pub kind: String,
    /// Whether a verified MFA factor backs this session
    pub mfa: bool,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

impl AccessTokenClaims {
    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

/// Token pair returned to clients.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl_minutes: i64,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_ttl_minutes: config.access_token_ttl_minutes,
        }
    }

    /// Generate an access token bound to a session.
    pub fn generate_access_token(
        &self,
        identity: &Identity,
        session: &Session,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_ttl_minutes);

        let claims = AccessTokenClaims {
            sub: identity.identity_id,
            org: session.org_id,
            role: identity.role_code.clone(),
            sid: session.session_id,
            kind: identity.kind_code.clone(),
            mfa: session.mfa_verified,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Validate signature and expiry, returning the claims. The session
    /// liveness check is the caller's job.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(token_data.claims)
    }

    /// Access token expiry in seconds, for the client-facing `expires_in`.
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_ttl_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdentityKind;

    fn service() -> TokenService {
        TokenService::new(&JwtConfig {
            secret: "test-secret-test-secret-test-secret".to_string(),
            access_token_ttl_minutes: 15,
        })
    }

    fn identity_and_session() -> (Identity, Session) {
        let org = Uuid::new_v4();
        let identity = Identity::new(
            IdentityKind::OrgMember,
            Some(org),
            "m@example.com".to_string(),
            Some("$argon2id$x".to_string()),
            Role::Dispatcher,
        );
        let session = Session::new(identity.identity_id, Some(org), "h".into(), false, 60, 120);
        (identity, session)
    }

    #[test]
    fn token_round_trips_claims() {
        let service = service();
        let (identity, session) = identity_and_session();

        let token = service.generate_access_token(&identity, &session).unwrap();
        let claims = service.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, identity.identity_id);
        assert_eq!(claims.org, session.org_id);
        assert_eq!(claims.sid, session.session_id);
        assert_eq!(claims.role(), Some(Role::Dispatcher));
        assert!(!claims.mfa);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let (identity, session) = identity_and_session();
        let token = service().generate_access_token(&identity, &session).unwrap();

        let other = TokenService::new(&JwtConfig {
            secret: "another-secret-another-secret-12".to_string(),
            access_token_ttl_minutes: 15,
        });
        assert!(other.validate_access_token(&token).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(service().validate_access_token("not-a-jwt").is_err());
    }
}
