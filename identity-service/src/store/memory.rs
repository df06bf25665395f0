//! In-memory implementation of the storage seam.
//!
//! Serves integration tests and local development without Postgres. A single
//! mutex stands in for the database's transaction isolation, which keeps the
//! multi-statement operations (rotation, claims, MFA disable) atomic here
//! too.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    AuditEvent, BreakGlassToken, Identity, IdempotencyClaim, IdempotencyRecord, IdempotencyScope,
    MfaSecret, MfaState, PortalToken, RevocationReason, RotationOutcome, Session,
};

use super::{AuthStore, RehashUpdate};

type IdemKey = (Uuid, Uuid, String, String, String);

#[derive(Default)]
struct Inner {
    identities: HashMap<Uuid, Identity>,
    sessions: HashMap<Uuid, Session>,
    mfa_secrets: HashMap<Uuid, MfaSecret>,
    portal_tokens: HashMap<Uuid, PortalToken>,
    break_glass_tokens: Vec<BreakGlassToken>,
    idempotency: HashMap<IdemKey, IdempotencyRecord>,
    audit_events: Vec<AuditEvent>,
    read_only: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, anyhow::Error> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory store mutex poisoned: {}", e))
    }
}

fn idem_key(scope: &IdempotencyScope) -> IdemKey {
    (
        scope.org_id,
        scope.actor_id,
        scope.method.clone(),
        scope.path.clone(),
        scope.key.clone(),
    )
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_identity_by_email(
        &self,
        org_id: Option<Uuid>,
        email: &str,
    ) -> Result<Option<Identity>, anyhow::Error> {
        let inner = self.lock()?;
        Ok(inner
            .identities
            .values()
            .find(|i| i.email == email && i.org_id == org_id)
            .cloned())
    }

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, anyhow::Error> {
        let inner = self.lock()?;
        Ok(inner.identities.get(&identity_id).cloned())
    }

    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        new_hash: &str,
    ) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        if let Some(identity) = inner.identities.get_mut(&identity_id) {
            identity.password_hash = Some(new_hash.to_string());
        }
        Ok(())
    }

    async fn update_password_and_revoke_sessions(
        &self,
        identity_id: Uuid,
        new_hash: &str,
    ) -> Result<u64, anyhow::Error> {
        let mut inner = self.lock()?;
        if let Some(identity) = inner.identities.get_mut(&identity_id) {
            identity.password_hash = Some(new_hash.to_string());
        }
        let mut revoked = 0;
        for session in inner.sessions.values_mut() {
            if session.identity_id == identity_id && session.revoked_utc.is_none() {
                session.revoked_utc = Some(Utc::now());
                session.revoked_reason =
                    Some(RevocationReason::PasswordChanged.as_str().to_string());
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        inner
            .identities
            .insert(identity.identity_id, identity.clone());
        Ok(())
    }

    async fn create_session(
        &self,
        session: &Session,
        rehash: Option<RehashUpdate>,
    ) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        if let Some(rehash) = rehash {
            if let Some(identity) = inner.identities.get_mut(&rehash.identity_id) {
                identity.password_hash = Some(rehash.new_hash);
            }
        }
        inner.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, anyhow::Error> {
        let inner = self.lock()?;
        Ok(inner.sessions.get(&session_id).cloned())
    }

    async fn find_session_by_refresh_hash(
        &self,
        refresh_hash: &str,
    ) -> Result<Option<Session>, anyhow::Error> {
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .values()
            .find(|s| s.refresh_token_hash == refresh_hash)
            .cloned())
    }

    async fn rotate_session(
        &self,
        predecessor_id: Uuid,
        successor: &Session,
    ) -> Result<RotationOutcome, anyhow::Error> {
        let mut inner = self.lock()?;

        let outcome = match inner.sessions.get(&predecessor_id) {
            None => return Ok(RotationOutcome::NotFound),
            Some(p) if p.is_revoked() => return Ok(RotationOutcome::Revoked),
            Some(p) if !p.can_refresh() => return Ok(RotationOutcome::Expired),
            Some(_) => RotationOutcome::Rotated,
        };

        if let Some(predecessor) = inner.sessions.get_mut(&predecessor_id) {
            predecessor.revoked_utc = Some(Utc::now());
            predecessor.revoked_reason = Some(RevocationReason::Rotated.as_str().to_string());
        }
        inner
            .sessions
            .insert(successor.session_id, successor.clone());

        Ok(outcome)
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevocationReason,
    ) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        if let Some(session) = inner.sessions.get_mut(&session_id) {
            if session.revoked_utc.is_none() {
                session.revoked_utc = Some(Utc::now());
                session.revoked_reason = Some(reason.as_str().to_string());
            }
        }
        Ok(())
    }

    async fn revoke_identity_sessions(
        &self,
        identity_id: Uuid,
        reason: RevocationReason,
    ) -> Result<u64, anyhow::Error> {
        let mut inner = self.lock()?;
        let mut revoked = 0;
        for session in inner.sessions.values_mut() {
            if session.identity_id == identity_id && session.revoked_utc.is_none() {
                session.revoked_utc = Some(Utc::now());
                session.revoked_reason = Some(reason.as_str().to_string());
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_other_sessions(
        &self,
        identity_id: Uuid,
        keep_session_id: Uuid,
        reason: RevocationReason,
    ) -> Result<u64, anyhow::Error> {
        let mut inner = self.lock()?;
        let mut revoked = 0;
        for session in inner.sessions.values_mut() {
            if session.identity_id == identity_id
                && session.session_id != keep_session_id
                && session.revoked_utc.is_none()
            {
                session.revoked_utc = Some(Utc::now());
                session.revoked_reason = Some(reason.as_str().to_string());
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn mark_session_mfa_verified(&self, session_id: Uuid) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        if let Some(session) = inner.sessions.get_mut(&session_id) {
            session.mfa_verified = true;
        }
        Ok(())
    }

    async fn put_pending_mfa_secret(
        &self,
        identity_id: Uuid,
        secret_base32: &str,
    ) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        inner.mfa_secrets.insert(
            identity_id,
            MfaSecret::pending(identity_id, secret_base32.to_string()),
        );
        if let Some(identity) = inner.identities.get_mut(&identity_id) {
            identity.mfa_state_code = MfaState::PendingVerification.as_str().to_string();
        }
        Ok(())
    }

    async fn get_mfa_secret(&self, identity_id: Uuid) -> Result<Option<MfaSecret>, anyhow::Error> {
        let inner = self.lock()?;
        Ok(inner.mfa_secrets.get(&identity_id).cloned())
    }

    async fn enable_mfa(&self, identity_id: Uuid) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        if let Some(secret) = inner.mfa_secrets.get_mut(&identity_id) {
            secret.activated_utc = Some(Utc::now());
        }
        if let Some(identity) = inner.identities.get_mut(&identity_id) {
            identity.mfa_state_code = MfaState::Enabled.as_str().to_string();
        }
        Ok(())
    }

    async fn disable_mfa(&self, identity_id: Uuid) -> Result<u64, anyhow::Error> {
        let mut inner = self.lock()?;
        inner.mfa_secrets.remove(&identity_id);
        if let Some(identity) = inner.identities.get_mut(&identity_id) {
            identity.mfa_state_code = MfaState::Disabled.as_str().to_string();
        }
        let mut revoked = 0;
        for session in inner.sessions.values_mut() {
            if session.identity_id == identity_id && session.revoked_utc.is_none() {
                session.revoked_utc = Some(Utc::now());
                session.revoked_reason =
                    Some(RevocationReason::MfaDisabled.as_str().to_string());
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn insert_portal_token(&self, token: &PortalToken) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        inner.portal_tokens.insert(token.token_id, token.clone());
        Ok(())
    }

    async fn consume_portal_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<PortalToken>, anyhow::Error> {
        let mut inner = self.lock()?;
        let token = inner
            .portal_tokens
            .values_mut()
            .find(|t| t.token_hash == token_hash && t.is_usable());
        match token {
            Some(token) => {
                token.used_utc = Some(Utc::now());
                Ok(Some(token.clone()))
            }
            None => Ok(None),
        }
    }

    async fn insert_break_glass_token(
        &self,
        token: &BreakGlassToken,
    ) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        inner.break_glass_tokens.push(token.clone());
        Ok(())
    }

    async fn find_break_glass_by_hash(
        &self,
        org_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<BreakGlassToken>, anyhow::Error> {
        let inner = self.lock()?;
        Ok(inner
            .break_glass_tokens
            .iter()
            .find(|t| t.org_id == org_id && t.token_hash == token_hash)
            .cloned())
    }

    async fn claim_idempotency(
        &self,
        scope: &IdempotencyScope,
        request_hash: &str,
    ) -> Result<IdempotencyClaim, anyhow::Error> {
        let mut inner = self.lock()?;
        let key = idem_key(scope);

        if let Some(existing) = inner.idempotency.get(&key) {
            if existing.request_hash != request_hash {
                return Ok(IdempotencyClaim::Conflict);
            }
            return match (existing.response_status, existing.response_body.clone()) {
                (Some(status), Some(body)) => Ok(IdempotencyClaim::Replay {
                    status: status as u16,
                    body,
                }),
                _ => Ok(IdempotencyClaim::Pending),
            };
        }

        inner.idempotency.insert(
            key,
            IdempotencyRecord::claim(scope, request_hash.to_string()),
        );
        Ok(IdempotencyClaim::Claimed)
    }

    async fn complete_idempotency(
        &self,
        scope: &IdempotencyScope,
        status: u16,
        body: &[u8],
    ) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        if let Some(record) = inner.idempotency.get_mut(&idem_key(scope)) {
            record.response_status = Some(status as i16);
            record.response_body = Some(body.to_vec());
            record.completed_utc = Some(Utc::now());
        }
        Ok(())
    }

    async fn release_idempotency(&self, scope: &IdempotencyScope) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        let key = idem_key(scope);
        if inner
            .idempotency
            .get(&key)
            .is_some_and(|r| !r.is_completed())
        {
            inner.idempotency.remove(&key);
        }
        Ok(())
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        inner.audit_events.push(event.clone());
        Ok(())
    }

    async fn audit_events_for_org(&self, org_id: Uuid) -> Result<Vec<AuditEvent>, anyhow::Error> {
        let inner = self.lock()?;
        Ok(inner
            .audit_events
            .iter()
            .filter(|e| e.org_id == Some(org_id))
            .cloned()
            .collect())
    }

    async fn read_only_mode(&self) -> Result<bool, anyhow::Error> {
        let inner = self.lock()?;
        Ok(inner.read_only)
    }

    async fn set_read_only_mode(&self, enabled: bool) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        inner.read_only = enabled;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdentityKind, Role};

    #[tokio::test]
    async fn rotation_revokes_predecessor_and_inserts_successor() {
        let store = MemoryStore::new();
        let identity_id = Uuid::new_v4();
        let org = Some(Uuid::new_v4());

        let first = Session::new(identity_id, org, "h1".into(), false, 60, 120);
        store.create_session(&first, None).await.unwrap();

        let second = Session::new(identity_id, org, "h2".into(), false, 60, 120);
        let outcome = store
            .rotate_session(first.session_id, &second)
            .await
            .unwrap();
        assert_eq!(outcome, RotationOutcome::Rotated);

        let old = store.get_session(first.session_id).await.unwrap().unwrap();
        assert!(old.is_revoked());
        assert_eq!(old.revoked_reason.as_deref(), Some("rotated"));

        // A second rotation of the same predecessor must fail closed.
        let third = Session::new(identity_id, org, "h3".into(), false, 60, 120);
        let outcome = store
            .rotate_session(first.session_id, &third)
            .await
            .unwrap();
        assert_eq!(outcome, RotationOutcome::Revoked);
    }

    #[tokio::test]
    async fn idempotency_claim_is_exclusive_per_scope() {
        let store = MemoryStore::new();
        let scope = IdempotencyScope {
            org_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            method: "POST".into(),
            path: "/admin/leads".into(),
            key: "K1".into(),
        };

        assert_eq!(
            store.claim_idempotency(&scope, "hash-a").await.unwrap(),
            IdempotencyClaim::Claimed
        );
        assert_eq!(
            store.claim_idempotency(&scope, "hash-a").await.unwrap(),
            IdempotencyClaim::Pending
        );
        assert_eq!(
            store.claim_idempotency(&scope, "hash-b").await.unwrap(),
            IdempotencyClaim::Conflict
        );

        store
            .complete_idempotency(&scope, 200, br#"{"ok":true}"#)
            .await
            .unwrap();
        match store.claim_idempotency(&scope, "hash-a").await.unwrap() {
            IdempotencyClaim::Replay { status, body } => {
                assert_eq!(status, 200);
                assert_eq!(body, br#"{"ok":true}"#.to_vec());
            }
            other => panic!("expected replay, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn same_key_in_another_org_is_distinct() {
        let store = MemoryStore::new();
        let actor = Uuid::new_v4();
        let base = IdempotencyScope {
            org_id: Uuid::new_v4(),
            actor_id: actor,
            method: "POST".into(),
            path: "/admin/leads".into(),
            key: "K1".into(),
        };
        let other_org = IdempotencyScope {
            org_id: Uuid::new_v4(),
            ..base.clone()
        };

        assert_eq!(
            store.claim_idempotency(&base, "hash-a").await.unwrap(),
            IdempotencyClaim::Claimed
        );
        assert_eq!(
            store.claim_idempotency(&other_org, "hash-a").await.unwrap(),
            IdempotencyClaim::Claimed
        );
    }

    #[tokio::test]
    async fn disable_mfa_destroys_secret_and_revokes_sessions() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let identity = Identity::new(
            IdentityKind::OrgMember,
            Some(org),
            "m@example.com".into(),
            Some("$argon2id$x".into()),
            Role::Admin,
        );
        store.insert_identity(&identity).await.unwrap();
        store
            .put_pending_mfa_secret(identity.identity_id, "SECRET")
            .await
            .unwrap();
        store.enable_mfa(identity.identity_id).await.unwrap();

        let session = Session::new(identity.identity_id, Some(org), "h".into(), true, 60, 120);
        store.create_session(&session, None).await.unwrap();

        let revoked = store.disable_mfa(identity.identity_id).await.unwrap();
        assert_eq!(revoked, 1);
        assert!(store
            .get_mfa_secret(identity.identity_id)
            .await
            .unwrap()
            .is_none());
        let identity = store
            .find_identity(identity.identity_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.mfa_state_code, "disabled");
    }
}
