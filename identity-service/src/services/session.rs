//! Session manager: login, refresh rotation, revocation, and the hot-path
//! authentication check every request goes through.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{MfaConfig, SessionConfig};
use crate::error::ServiceError;
use crate::models::{
    AuditEvent, AuditEventType, Identity, IdentityKind, MfaState, RevocationReason, Role,
    RotationOutcome, Session,
};
use crate::services::audit::AuditService;
use crate::services::mfa;
use crate::services::password::{hash_password, verify_password, Password, PasswordHashString};
use crate::services::token::{TokenResponse, TokenService};
use crate::store::{AuthStore, RehashUpdate};

/// Authenticated request context, derived from an access token whose session
/// passed the liveness re-check.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity_id: Uuid,
    pub org_id: Option<Uuid>,
    pub role: Role,
    pub kind: IdentityKind,
    pub session_id: Uuid,
    pub mfa_verified: bool,
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn AuthStore>,
    tokens: TokenService,
    audit: AuditService,
    session_config: SessionConfig,
    mfa_config: MfaConfig,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        tokens: TokenService,
        audit: AuditService,
        session_config: SessionConfig,
        mfa_config: MfaConfig,
    ) -> Self {
        Self {
            store,
            tokens,
            audit,
            session_config,
            mfa_config,
        }
    }

    /// Authenticate an email/password login and mint a session.
    ///
    /// A success against a non-current hash scheme upgrades the stored hash
    /// in the same store transaction that creates the session, so the
    /// credential migrates with zero user-visible friction.
    pub async fn login(
        &self,
        org_id: Option<Uuid>,
        email: &str,
        password: &str,
        totp_code: Option<&str>,
        ip_address: Option<String>,
    ) -> Result<(TokenResponse, Session), ServiceError> {
        let identity = self
            .store
            .find_identity_by_email(org_id, email)
            .await?
            .ok_or(ServiceError::InvalidCredential)?;

        if !identity.is_active() {
            return Err(ServiceError::InvalidCredential);
        }

        let stored_hash = identity
            .password_hash
            .clone()
            .ok_or(ServiceError::InvalidCredential)?;

        let password = Password::new(password.to_string());
        let verification = verify_password(&password, &PasswordHashString::new(stored_hash));
        if !verification.ok {
            return Err(ServiceError::InvalidCredential);
        }

        // An enabled factor is always demanded at login, enforced role or not.
        let mfa_verified = if identity.mfa_state() == Some(MfaState::Enabled) {
            let code = totp_code.ok_or(ServiceError::MfaRequired)?;
            let secret = self
                .store
                .get_mfa_secret(identity.identity_id)
                .await?
                .filter(|s| s.is_activated())
                .ok_or(ServiceError::MfaRequired)?;
            if !mfa::verify_code(&self.mfa_config.issuer, &identity.email, &secret, code)? {
                return Err(ServiceError::MfaRequired);
            }
            true
        } else {
            false
        };

        let refresh_token = generate_opaque_token();
        let session = Session::new(
            identity.identity_id,
            identity.org_id,
            hash_opaque_token(&refresh_token),
            mfa_verified,
            self.session_config.session_ttl_minutes,
            self.session_config.refresh_ttl_minutes,
        );

        let rehash = if verification.rehash_needed {
            let new_hash = hash_password(&password).map_err(ServiceError::Internal)?;
            Some(RehashUpdate {
                identity_id: identity.identity_id,
                new_hash: new_hash.into_string(),
            })
        } else {
            None
        };
        let rehashed = rehash.is_some();

        self.store.create_session(&session, rehash).await?;

        if rehashed {
            tracing::info!(identity_id = %identity.identity_id, "Credential upgraded to current hash scheme");
            self.audit
                .log(
                    AuditEvent::new(
                        AuditEventType::PasswordRehashed,
                        identity.org_id,
                        Some(identity.identity_id),
                    )
                    .with_target("identity", identity.identity_id),
                )
                .await?;
        }

        let mut login_event = AuditEvent::new(
            AuditEventType::Login,
            identity.org_id,
            Some(identity.identity_id),
        )
        .with_target("session", session.session_id);
        if let Some(ip) = ip_address {
            login_event = login_event.with_ip(ip);
        }
        self.audit.log(login_event).await?;

        let response = self.token_response(&identity, &session, refresh_token)?;
        Ok((response, session))
    }

    /// Rotate a refresh token: atomically revoke the predecessor session and
    /// create its successor. There is no grace window; a concurrent or
    /// retried refresh of the same token fails with `SessionRevoked`.
    pub async fn refresh(
        &self,
        refresh_token: &str,
    ) -> Result<(TokenResponse, Session), ServiceError> {
        let predecessor = self
            .store
            .find_session_by_refresh_hash(&hash_opaque_token(refresh_token))
            .await?
            .ok_or(ServiceError::InvalidCredential)?;

        if predecessor.is_revoked() {
            return Err(ServiceError::SessionRevoked);
        }
        if !predecessor.can_refresh() {
            return Err(ServiceError::SessionExpired);
        }

        let identity = self
            .store
            .find_identity(predecessor.identity_id)
            .await?
            .filter(Identity::is_active)
            .ok_or(ServiceError::InvalidCredential)?;

        let refresh_token = generate_opaque_token();
        let successor = Session::new(
            predecessor.identity_id,
            predecessor.org_id,
            hash_opaque_token(&refresh_token),
            predecessor.mfa_verified,
            self.session_config.session_ttl_minutes,
            self.session_config.refresh_ttl_minutes,
        );

        match self
            .store
            .rotate_session(predecessor.session_id, &successor)
            .await?
        {
            RotationOutcome::Rotated => {}
            RotationOutcome::Revoked => return Err(ServiceError::SessionRevoked),
            RotationOutcome::Expired => return Err(ServiceError::SessionExpired),
            RotationOutcome::NotFound => return Err(ServiceError::InvalidCredential),
        }

        self.audit
            .log(
                AuditEvent::new(
                    AuditEventType::TokenRefreshed,
                    successor.org_id,
                    Some(successor.identity_id),
                )
                .with_target("session", successor.session_id),
            )
            .await?;

        let response = self.token_response(&identity, &successor, refresh_token)?;
        Ok((response, successor))
    }

    /// Revoke one session. Idempotent.
    pub async fn logout(&self, ctx: &AuthContext) -> Result<(), ServiceError> {
        self.store
            .revoke_session(ctx.session_id, RevocationReason::Logout)
            .await?;

        self.audit
            .log(
                AuditEvent::new(AuditEventType::Logout, ctx.org_id, Some(ctx.identity_id))
                    .with_target("session", ctx.session_id),
            )
            .await?;

        tracing::info!(identity_id = %ctx.identity_id, "Logged out");
        Ok(())
    }

    /// Revoke every live session of an identity. Idempotent; returns the
    /// number of sessions newly revoked.
    pub async fn revoke_all(
        &self,
        identity_id: Uuid,
        reason: RevocationReason,
        actor: &AuthContext,
        break_glass_reason: Option<String>,
    ) -> Result<u64, ServiceError> {
        let revoked = self
            .store
            .revoke_identity_sessions(identity_id, reason)
            .await?;

        let mut event = AuditEvent::new(
            AuditEventType::AllSessionsRevoked,
            actor.org_id,
            Some(actor.identity_id),
        )
        .with_target("identity", identity_id)
        .with_snapshots(
            Some(serde_json::json!({ "live_sessions": revoked })),
            Some(serde_json::json!({ "live_sessions": 0 })),
        );
        if let Some(reason) = break_glass_reason {
            event = event.with_break_glass_reason(reason);
        }
        self.audit.log(event).await?;

        Ok(revoked)
    }

    /// Change the caller's password. Verifies the current credential first,
    /// then swaps the hash and revokes every session of the identity in one
    /// transaction; the caller has to log in again.
    pub async fn change_password(
        &self,
        ctx: &AuthContext,
        current_password: &str,
        new_password: &str,
    ) -> Result<u64, ServiceError> {
        let identity = self
            .store
            .find_identity(ctx.identity_id)
            .await?
            .filter(Identity::is_active)
            .ok_or(ServiceError::InvalidCredential)?;

        let stored_hash = identity
            .password_hash
            .clone()
            .ok_or(ServiceError::InvalidCredential)?;
        let verification = verify_password(
            &Password::new(current_password.to_string()),
            &PasswordHashString::new(stored_hash),
        );
        if !verification.ok {
            return Err(ServiceError::InvalidCredential);
        }

        let new_hash = hash_password(&Password::new(new_password.to_string()))
            .map_err(ServiceError::Internal)?;
        let revoked = self
            .store
            .update_password_and_revoke_sessions(ctx.identity_id, new_hash.as_str())
            .await?;

        self.audit
            .log(
                AuditEvent::new(
                    AuditEventType::PasswordChanged,
                    ctx.org_id,
                    Some(ctx.identity_id),
                )
                .with_target("identity", ctx.identity_id),
            )
            .await?;

        tracing::info!(identity_id = %ctx.identity_id, "Password changed, sessions revoked");
        Ok(revoked)
    }

    /// Hot-path request authentication: signature/expiry first, then the
    /// session liveness re-check. A revoked session fails closed even while
    /// its access token is otherwise valid.
    pub async fn authenticate(&self, bearer: &str) -> Result<AuthContext, ServiceError> {
        let claims = self
            .tokens
            .validate_access_token(bearer)
            .map_err(|_| ServiceError::InvalidCredential)?;

        let session = self
            .store
            .get_session(claims.sid)
            .await?
            .ok_or(ServiceError::InvalidCredential)?;

        if session.is_revoked() {
            return Err(ServiceError::SessionRevoked);
        }
        if session.is_expired() {
            return Err(ServiceError::SessionExpired);
        }

        let identity = self
            .store
            .find_identity(claims.sub)
            .await?
            .filter(Identity::is_active)
            .ok_or(ServiceError::SessionRevoked)?;

        Ok(AuthContext {
            identity_id: identity.identity_id,
            org_id: session.org_id,
            role: claims.role().ok_or(ServiceError::InvalidCredential)?,
            kind: identity.kind().ok_or(ServiceError::InvalidCredential)?,
            session_id: session.session_id,
            // The store is the truth: a factor verified after token issuance
            // upgrades in-flight access tokens too.
            mfa_verified: session.mfa_verified,
        })
    }

    /// Mint a magic-link portal token for a client contact. The raw value is
    /// returned once; only its digest is stored.
    pub async fn issue_portal_token(
        &self,
        identity_id: Uuid,
        actor: &AuthContext,
    ) -> Result<(String, crate::models::PortalToken), ServiceError> {
        let identity = self
            .store
            .find_identity(identity_id)
            .await?
            .filter(Identity::is_active)
            .ok_or_else(|| ServiceError::NotFound("Identity not found".to_string()))?;

        if identity.kind() != Some(IdentityKind::ClientContact) {
            return Err(ServiceError::ValidationError(
                "Portal tokens can only be issued for client contacts".to_string(),
            ));
        }

        let org_id = identity.org_id.ok_or(ServiceError::OrgMismatch)?;
        if actor.org_id != Some(org_id) {
            return Err(ServiceError::OrgMismatch);
        }

        let raw = generate_opaque_token();
        let token = crate::models::PortalToken::new(
            identity_id,
            org_id,
            hash_opaque_token(&raw),
            self.session_config.portal_token_ttl_minutes,
        );
        self.store.insert_portal_token(&token).await?;

        self.audit
            .log(
                AuditEvent::new(
                    AuditEventType::PortalTokenIssued,
                    Some(org_id),
                    Some(actor.identity_id),
                )
                .with_target("identity", identity_id),
            )
            .await?;

        Ok((raw, token))
    }

    /// Exchange a magic-link portal token for a viewer session. Single use:
    /// the token is consumed atomically.
    pub async fn exchange_portal_token(
        &self,
        raw: &str,
    ) -> Result<(TokenResponse, Session), ServiceError> {
        let token = self
            .store
            .consume_portal_token(&hash_opaque_token(raw))
            .await?
            .ok_or(ServiceError::InvalidCredential)?;

        let identity = self
            .store
            .find_identity(token.identity_id)
            .await?
            .filter(Identity::is_active)
            .ok_or(ServiceError::InvalidCredential)?;

        let refresh_token = generate_opaque_token();
        let session = Session::new(
            identity.identity_id,
            Some(token.org_id),
            hash_opaque_token(&refresh_token),
            false,
            self.session_config.session_ttl_minutes,
            self.session_config.refresh_ttl_minutes,
        );
        self.store.create_session(&session, None).await?;

        self.audit
            .log(
                AuditEvent::new(
                    AuditEventType::PortalTokenExchanged,
                    Some(token.org_id),
                    Some(identity.identity_id),
                )
                .with_target("session", session.session_id),
            )
            .await?;

        let response = self.token_response(&identity, &session, refresh_token)?;
        Ok((response, session))
    }

    fn token_response(
        &self,
        identity: &Identity,
        session: &Session,
        refresh_token: String,
    ) -> Result<TokenResponse, ServiceError> {
        let access_token = self
            .tokens
            .generate_access_token(identity, session)
            .map_err(ServiceError::Internal)?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_token_expiry_seconds(),
        })
    }
}

/// Generate an opaque credential (refresh/portal/break-glass token).
pub fn generate_opaque_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    hex::encode(token_bytes)
}

/// Digest used to store opaque credentials at rest.
pub fn hash_opaque_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_tokens_are_unique_and_hash_stably() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(hash_opaque_token(&a), hash_opaque_token(&a));
        assert_ne!(hash_opaque_token(&a), hash_opaque_token(&b));
    }
}
