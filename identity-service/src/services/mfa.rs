//! MFA enforcer: TOTP enrollment, verification, and disable.

use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::config::MfaConfig;
use crate::error::ServiceError;
use crate::models::{
    AuditEvent, AuditEventType, Identity, MfaSecret, MfaState, RevocationReason,
};
use crate::services::audit::AuditService;
use crate::services::session::AuthContext;
use crate::store::AuthStore;

/// One-time enrollment material returned exactly once.
#[derive(Debug)]
pub struct Enrollment {
    pub secret_base32: String,
    pub enrollment_uri: String,
}

fn build_totp(
    issuer: &str,
    account: &str,
    secret_base32: &str,
) -> Result<TOTP, ServiceError> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid TOTP secret: {:?}", e)))?;

    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP init error: {}", e)))
}

/// Check a TOTP code against a stored seed.
pub fn verify_code(
    issuer: &str,
    account: &str,
    secret: &MfaSecret,
    code: &str,
) -> Result<bool, ServiceError> {
    let totp = build_totp(issuer, account, &secret.secret_base32)?;
    totp.check_current(code)
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Clock error: {}", e)))
}

#[derive(Clone)]
pub struct MfaService {
    store: Arc<dyn AuthStore>,
    audit: AuditService,
    config: MfaConfig,
}

impl MfaService {
    pub fn new(store: Arc<dyn AuthStore>, audit: AuditService, config: MfaConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// Issue a fresh TOTP seed and move the identity to pending
    /// verification. Re-enrolling while pending replaces the seed; an
    /// already-enabled factor must be disabled first.
    pub async fn enroll(&self, ctx: &AuthContext) -> Result<Enrollment, ServiceError> {
        let identity = self.active_identity(ctx.identity_id).await?;

        if identity.mfa_state() == Some(MfaState::Enabled) {
            return Err(ServiceError::ValidationError(
                "MFA is already enabled for this identity".to_string(),
            ));
        }

        let secret_bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Secret gen error: {:?}", e)))?;
        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(self.config.issuer.clone()),
            identity.email.clone(),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP init error: {}", e)))?;
        let secret_base32 = totp.get_secret_base32();

        self.store
            .put_pending_mfa_secret(ctx.identity_id, &secret_base32)
            .await?;

        self.audit
            .log(
                AuditEvent::new(
                    AuditEventType::MfaEnrollmentStarted,
                    ctx.org_id,
                    Some(ctx.identity_id),
                )
                .with_target("identity", ctx.identity_id),
            )
            .await?;

        Ok(Enrollment {
            secret_base32,
            enrollment_uri: totp.get_url(),
        })
    }

    /// Confirm the pending seed with a live code. Activates the factor,
    /// marks the current session MFA-verified, and revokes every other
    /// session of the identity, since none of them presented the factor.
    pub async fn verify(&self, ctx: &AuthContext, code: &str) -> Result<(), ServiceError> {
        let identity = self.active_identity(ctx.identity_id).await?;

        let secret = self
            .store
            .get_mfa_secret(ctx.identity_id)
            .await?
            .filter(|s| !s.is_activated())
            .ok_or(ServiceError::MfaNotPending)?;

        if !verify_code(&self.config.issuer, &identity.email, &secret, code)? {
            return Err(ServiceError::MfaRequired);
        }

        self.store.enable_mfa(ctx.identity_id).await?;
        self.store
            .mark_session_mfa_verified(ctx.session_id)
            .await?;
        self.store
            .revoke_other_sessions(
                ctx.identity_id,
                ctx.session_id,
                RevocationReason::MfaEnabled,
            )
            .await?;

        self.audit
            .log(
                AuditEvent::new(AuditEventType::MfaEnabled, ctx.org_id, Some(ctx.identity_id))
                    .with_target("identity", ctx.identity_id),
            )
            .await?;

        Ok(())
    }

    /// Disable the factor for `identity_id`, destroying the seed and
    /// revoking all of that identity's sessions: a compromised factor must
    /// not leave any live session behind. Owner-only; the permission check
    /// happens at the handler.
    pub async fn disable(
        &self,
        actor: &AuthContext,
        identity_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let identity = self.active_identity(identity_id).await?;

        if actor.org_id != identity.org_id {
            return Err(ServiceError::OrgMismatch);
        }

        let revoked = self.store.disable_mfa(identity_id).await?;

        self.audit
            .log(
                AuditEvent::new(AuditEventType::MfaDisabled, actor.org_id, Some(actor.identity_id))
                    .with_target("identity", identity_id)
                    .with_snapshots(
                        Some(serde_json::json!({ "mfa_state": identity.mfa_state_code })),
                        Some(serde_json::json!({ "mfa_state": "disabled", "sessions_revoked": revoked })),
                    ),
            )
            .await?;

        Ok(revoked)
    }

    /// Whether this role must present a verified factor on privileged routes.
    pub fn role_requires_mfa(&self, role: crate::models::Role) -> bool {
        self.config.enforced_roles.contains(&role)
    }

    async fn active_identity(&self, identity_id: Uuid) -> Result<Identity, ServiceError> {
        self.store
            .find_identity(identity_id)
            .await?
            .filter(Identity::is_active)
            .ok_or_else(|| ServiceError::NotFound("Identity not found".to_string()))
    }
}
