//! Break-glass escalation: time-boxed, reason-audited emergency tokens.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{AuditEvent, AuditEventType, BreakGlassGrant, BreakGlassToken};
use crate::services::audit::AuditService;
use crate::services::session::{generate_opaque_token, hash_opaque_token, AuthContext};
use crate::store::AuthStore;

#[derive(Clone)]
pub struct BreakGlassService {
    store: Arc<dyn AuthStore>,
    audit: AuditService,
    max_ttl_seconds: i64,
}

impl BreakGlassService {
    pub fn new(store: Arc<dyn AuthStore>, audit: AuditService, max_ttl_seconds: i64) -> Self {
        Self {
            store,
            audit,
            max_ttl_seconds,
        }
    }

    /// Mint a break-glass token scoped to the actor's organization. The raw
    /// value is returned exactly once; only its digest is stored. There is no
    /// extend operation: after expiry, mint a new one.
    pub async fn start(
        &self,
        actor: &AuthContext,
        reason: &str,
        ttl_seconds: i64,
    ) -> Result<(String, BreakGlassToken), ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "A reason is required to start break-glass access".to_string(),
            ));
        }
        if ttl_seconds <= 0 || ttl_seconds > self.max_ttl_seconds {
            return Err(ServiceError::ValidationError(format!(
                "ttl_seconds must be between 1 and {}",
                self.max_ttl_seconds
            )));
        }

        let org_id = actor.org_id.ok_or(ServiceError::OrgMismatch)?;

        let raw = generate_opaque_token();
        let token = BreakGlassToken::new(
            org_id,
            actor.identity_id,
            reason.to_string(),
            hash_opaque_token(&raw),
            ttl_seconds,
        );
        self.store.insert_break_glass_token(&token).await?;

        tracing::warn!(
            org_id = %org_id,
            actor_id = %actor.identity_id,
            token_id = %token.token_id,
            ttl_seconds,
            "Break-glass token issued"
        );

        self.audit
            .log(
                AuditEvent::new(
                    AuditEventType::BreakGlassIssued,
                    Some(org_id),
                    Some(actor.identity_id),
                )
                .with_target("break_glass_token", token.token_id)
                .with_break_glass_reason(reason),
            )
            .await?;

        Ok((raw, token))
    }

    /// Validate a presented break-glass token for an organization. Expired
    /// or unknown tokens fail with 401.
    pub async fn validate(
        &self,
        org_id: Uuid,
        raw: &str,
    ) -> Result<BreakGlassGrant, ServiceError> {
        let token = self
            .store
            .find_break_glass_by_hash(org_id, &hash_opaque_token(raw))
            .await?
            .ok_or(ServiceError::InvalidCredential)?;

        if token.is_expired() {
            return Err(ServiceError::InvalidCredential);
        }

        Ok(BreakGlassGrant {
            token_id: token.token_id,
            org_id: token.org_id,
            reason: token.reason,
        })
    }
}
