//! Storage seam for the identity core.
//!
//! All persistence goes through the [`AuthStore`] trait so the HTTP surface
//! can be exercised end-to-end against [`MemoryStore`] while production runs
//! on [`PgStore`]. Multi-statement invariants (rotation, rehash-with-login,
//! idempotency claims, MFA disable) are trait methods, not call sequences:
//! each implementation makes them atomic with its own means.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    AuditEvent, BreakGlassToken, Identity, IdempotencyClaim, IdempotencyScope, MfaSecret,
    PortalToken, RevocationReason, RotationOutcome, Session,
};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Opportunistic credential upgrade persisted together with session
/// creation, so a legacy-scheme hash is replaced the first time its owner
/// logs in after a scheme change.
#[derive(Debug, Clone)]
pub struct RehashUpdate {
    pub identity_id: Uuid,
    pub new_hash: String,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    // --- identities ---

    async fn find_identity_by_email(
        &self,
        org_id: Option<Uuid>,
        email: &str,
    ) -> Result<Option<Identity>, anyhow::Error>;

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, anyhow::Error>;

    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        new_hash: &str,
    ) -> Result<(), anyhow::Error>;

    /// Replace the credential and revoke every live session of the identity
    /// in one transaction. Returns the number of sessions revoked.
    async fn update_password_and_revoke_sessions(
        &self,
        identity_id: Uuid,
        new_hash: &str,
    ) -> Result<u64, anyhow::Error>;

    async fn insert_identity(&self, identity: &Identity) -> Result<(), anyhow::Error>;

    // --- sessions ---

    /// Insert a session, applying `rehash` in the same transaction when set.
    async fn create_session(
        &self,
        session: &Session,
        rehash: Option<RehashUpdate>,
    ) -> Result<(), anyhow::Error>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, anyhow::Error>;

    async fn find_session_by_refresh_hash(
        &self,
        refresh_hash: &str,
    ) -> Result<Option<Session>, anyhow::Error>;

    /// Atomically revoke the predecessor and insert the successor. No
    /// observer may see both valid or both invalid.
    async fn rotate_session(
        &self,
        predecessor_id: Uuid,
        successor: &Session,
    ) -> Result<RotationOutcome, anyhow::Error>;

    /// Idempotent: revoking an already-revoked session is a no-op.
    async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevocationReason,
    ) -> Result<(), anyhow::Error>;

    /// Returns the number of sessions newly revoked.
    async fn revoke_identity_sessions(
        &self,
        identity_id: Uuid,
        reason: RevocationReason,
    ) -> Result<u64, anyhow::Error>;

    /// Revoke every live session of an identity except one. Used when a
    /// factor is verified: sessions opened before it never presented it.
    async fn revoke_other_sessions(
        &self,
        identity_id: Uuid,
        keep_session_id: Uuid,
        reason: RevocationReason,
    ) -> Result<u64, anyhow::Error>;

    async fn mark_session_mfa_verified(&self, session_id: Uuid) -> Result<(), anyhow::Error>;

    // --- mfa ---

    /// Store (or replace) an unconfirmed TOTP seed and move the identity to
    /// pending_verification.
    async fn put_pending_mfa_secret(
        &self,
        identity_id: Uuid,
        secret_base32: &str,
    ) -> Result<(), anyhow::Error>;

    async fn get_mfa_secret(&self, identity_id: Uuid) -> Result<Option<MfaSecret>, anyhow::Error>;

    async fn enable_mfa(&self, identity_id: Uuid) -> Result<(), anyhow::Error>;

    /// Destroy the seed, mark the identity disabled, and revoke all of its
    /// sessions in one transaction.
    async fn disable_mfa(&self, identity_id: Uuid) -> Result<u64, anyhow::Error>;

    // --- portal tokens ---

    async fn insert_portal_token(&self, token: &PortalToken) -> Result<(), anyhow::Error>;

    /// Atomically mark the token used and return it; None when unknown,
    /// expired, or already used.
    async fn consume_portal_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<PortalToken>, anyhow::Error>;

    // --- break-glass ---

    async fn insert_break_glass_token(
        &self,
        token: &BreakGlassToken,
    ) -> Result<(), anyhow::Error>;

    async fn find_break_glass_by_hash(
        &self,
        org_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<BreakGlassToken>, anyhow::Error>;

    // --- idempotency ledger ---

    /// Atomic check-then-insert per scope; exactly one concurrent caller
    /// observes `Claimed`.
    async fn claim_idempotency(
        &self,
        scope: &IdempotencyScope,
        request_hash: &str,
    ) -> Result<IdempotencyClaim, anyhow::Error>;

    async fn complete_idempotency(
        &self,
        scope: &IdempotencyScope,
        status: u16,
        body: &[u8],
    ) -> Result<(), anyhow::Error>;

    /// Release a claim whose handler failed, so a retry re-executes.
    async fn release_idempotency(&self, scope: &IdempotencyScope) -> Result<(), anyhow::Error>;

    // --- audit ---

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), anyhow::Error>;

    async fn audit_events_for_org(&self, org_id: Uuid) -> Result<Vec<AuditEvent>, anyhow::Error>;

    // --- operational flags ---

    async fn read_only_mode(&self) -> Result<bool, anyhow::Error>;

    async fn set_read_only_mode(&self, enabled: bool) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}
