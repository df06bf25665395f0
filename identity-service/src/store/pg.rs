//! PostgreSQL implementation of the storage seam.
//!
//! Org-owned tables (audit events, idempotency records, break-glass tokens)
//! are written inside transactions that first push the caller's organization
//! into `app.current_org`, so the row-level-security policies in the
//! migrations act as a second line of defense. Every query still carries its
//! explicit `org_id` filter; the policies are the net, not the mechanism.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Postgres;
use uuid::Uuid;

use crate::models::{
    AuditEvent, BreakGlassToken, Identity, IdempotencyClaim, IdempotencyRecord, IdempotencyScope,
    MfaSecret, MfaState, PortalToken, RevocationReason, RotationOutcome, Session,
};

use super::{AuthStore, RehashUpdate};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn push_org_scope(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        org_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT set_config('app.current_org', $1, true)")
            .bind(org_id.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

const SESSION_COLUMNS: &str = "session_id, identity_id, org_id, refresh_token_hash, \
     mfa_verified, issued_utc, expiry_utc, refresh_expiry_utc, revoked_utc, revoked_reason";

const IDENTITY_COLUMNS: &str = "identity_id, kind_code, org_id, email, password_hash, \
     role_code, mfa_state_code, status_code, created_utc";

#[async_trait]
impl AuthStore for PgStore {
    async fn find_identity_by_email(
        &self,
        org_id: Option<Uuid>,
        email: &str,
    ) -> Result<Option<Identity>, anyhow::Error> {
        let identity = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities \
             WHERE email = $1 AND org_id IS NOT DISTINCT FROM $2"
        ))
        .bind(email)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(identity)
    }

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, anyhow::Error> {
        let identity = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE identity_id = $1"
        ))
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(identity)
    }

    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        new_hash: &str,
    ) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE identities SET password_hash = $2 WHERE identity_id = $1")
            .bind(identity_id)
            .bind(new_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_password_and_revoke_sessions(
        &self,
        identity_id: Uuid,
        new_hash: &str,
    ) -> Result<u64, anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE identities SET password_hash = $2 WHERE identity_id = $1")
            .bind(identity_id)
            .bind(new_hash)
            .execute(&mut *tx)
            .await?;

        let revoked = sqlx::query(
            "UPDATE sessions SET revoked_utc = now(), revoked_reason = $2 \
             WHERE identity_id = $1 AND revoked_utc IS NULL",
        )
        .bind(identity_id)
        .bind(RevocationReason::PasswordChanged.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(revoked.rows_affected())
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO identities \
             (identity_id, kind_code, org_id, email, password_hash, role_code, \
              mfa_state_code, status_code, created_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(identity.identity_id)
        .bind(&identity.kind_code)
        .bind(identity.org_id)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(&identity.role_code)
        .bind(&identity.mfa_state_code)
        .bind(&identity.status_code)
        .bind(identity.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_session(
        &self,
        session: &Session,
        rehash: Option<RehashUpdate>,
    ) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        if let Some(rehash) = rehash {
            sqlx::query("UPDATE identities SET password_hash = $2 WHERE identity_id = $1")
                .bind(rehash.identity_id)
                .bind(&rehash.new_hash)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO sessions \
             (session_id, identity_id, org_id, refresh_token_hash, mfa_verified, \
              issued_utc, expiry_utc, refresh_expiry_utc, revoked_utc, revoked_reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(session.session_id)
        .bind(session.identity_id)
        .bind(session.org_id)
        .bind(&session.refresh_token_hash)
        .bind(session.mfa_verified)
        .bind(session.issued_utc)
        .bind(session.expiry_utc)
        .bind(session.refresh_expiry_utc)
        .bind(session.revoked_utc)
        .bind(&session.revoked_reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, anyhow::Error> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn find_session_by_refresh_hash(
        &self,
        refresh_hash: &str,
    ) -> Result<Option<Session>, anyhow::Error> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_token_hash = $1"
        ))
        .bind(refresh_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn rotate_session(
        &self,
        predecessor_id: Uuid,
        successor: &Session,
    ) -> Result<RotationOutcome, anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        let predecessor = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1 FOR UPDATE"
        ))
        .bind(predecessor_id)
        .fetch_optional(&mut *tx)
        .await?;

        let predecessor = match predecessor {
            None => return Ok(RotationOutcome::NotFound),
            Some(p) if p.is_revoked() => return Ok(RotationOutcome::Revoked),
            Some(p) if !p.can_refresh() => return Ok(RotationOutcome::Expired),
            Some(p) => p,
        };

        sqlx::query(
            "UPDATE sessions SET revoked_utc = now(), revoked_reason = $2 \
             WHERE session_id = $1",
        )
        .bind(predecessor.session_id)
        .bind(RevocationReason::Rotated.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO sessions \
             (session_id, identity_id, org_id, refresh_token_hash, mfa_verified, \
              issued_utc, expiry_utc, refresh_expiry_utc, revoked_utc, revoked_reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(successor.session_id)
        .bind(successor.identity_id)
        .bind(successor.org_id)
        .bind(&successor.refresh_token_hash)
        .bind(successor.mfa_verified)
        .bind(successor.issued_utc)
        .bind(successor.expiry_utc)
        .bind(successor.refresh_expiry_utc)
        .bind(successor.revoked_utc)
        .bind(&successor.revoked_reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RotationOutcome::Rotated)
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevocationReason,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE sessions SET revoked_utc = now(), revoked_reason = $2 \
             WHERE session_id = $1 AND revoked_utc IS NULL",
        )
        .bind(session_id)
        .bind(reason.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_identity_sessions(
        &self,
        identity_id: Uuid,
        reason: RevocationReason,
    ) -> Result<u64, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_utc = now(), revoked_reason = $2 \
             WHERE identity_id = $1 AND revoked_utc IS NULL",
        )
        .bind(identity_id)
        .bind(reason.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn revoke_other_sessions(
        &self,
        identity_id: Uuid,
        keep_session_id: Uuid,
        reason: RevocationReason,
    ) -> Result<u64, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_utc = now(), revoked_reason = $3 \
             WHERE identity_id = $1 AND session_id <> $2 AND revoked_utc IS NULL",
        )
        .bind(identity_id)
        .bind(keep_session_id)
        .bind(reason.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_session_mfa_verified(&self, session_id: Uuid) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE sessions SET mfa_verified = TRUE WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_pending_mfa_secret(
        &self,
        identity_id: Uuid,
        secret_base32: &str,
    ) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO mfa_secrets (identity_id, secret_base32, activated_utc, created_utc) \
             VALUES ($1, $2, NULL, now()) \
             ON CONFLICT (identity_id) \
             DO UPDATE SET secret_base32 = $2, activated_utc = NULL, created_utc = now()",
        )
        .bind(identity_id)
        .bind(secret_base32)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE identities SET mfa_state_code = $2 WHERE identity_id = $1")
            .bind(identity_id)
            .bind(MfaState::PendingVerification.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_mfa_secret(&self, identity_id: Uuid) -> Result<Option<MfaSecret>, anyhow::Error> {
        let secret = sqlx::query_as::<_, MfaSecret>(
            "SELECT identity_id, secret_base32, activated_utc, created_utc \
             FROM mfa_secrets WHERE identity_id = $1",
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(secret)
    }

    async fn enable_mfa(&self, identity_id: Uuid) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE mfa_secrets SET activated_utc = now() WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE identities SET mfa_state_code = $2 WHERE identity_id = $1")
            .bind(identity_id)
            .bind(MfaState::Enabled.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn disable_mfa(&self, identity_id: Uuid) -> Result<u64, anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM mfa_secrets WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE identities SET mfa_state_code = $2 WHERE identity_id = $1")
            .bind(identity_id)
            .bind(MfaState::Disabled.as_str())
            .execute(&mut *tx)
            .await?;

        let revoked = sqlx::query(
            "UPDATE sessions SET revoked_utc = now(), revoked_reason = $2 \
             WHERE identity_id = $1 AND revoked_utc IS NULL",
        )
        .bind(identity_id)
        .bind(RevocationReason::MfaDisabled.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(revoked.rows_affected())
    }

    async fn insert_portal_token(&self, token: &PortalToken) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO portal_tokens \
             (token_id, identity_id, org_id, token_hash, expiry_utc, used_utc, created_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(token.token_id)
        .bind(token.identity_id)
        .bind(token.org_id)
        .bind(&token.token_hash)
        .bind(token.expiry_utc)
        .bind(token.used_utc)
        .bind(token.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_portal_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<PortalToken>, anyhow::Error> {
        let token = sqlx::query_as::<_, PortalToken>(
            "UPDATE portal_tokens SET used_utc = now() \
             WHERE token_hash = $1 AND used_utc IS NULL AND expiry_utc > now() \
             RETURNING token_id, identity_id, org_id, token_hash, expiry_utc, used_utc, \
                       created_utc",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn insert_break_glass_token(
        &self,
        token: &BreakGlassToken,
    ) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;
        Self::push_org_scope(&mut tx, token.org_id).await?;

        sqlx::query(
            "INSERT INTO break_glass_tokens \
             (token_id, org_id, actor_id, reason, token_hash, expiry_utc, created_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(token.token_id)
        .bind(token.org_id)
        .bind(token.actor_id)
        .bind(&token.reason)
        .bind(&token.token_hash)
        .bind(token.expiry_utc)
        .bind(token.created_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_break_glass_by_hash(
        &self,
        org_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<BreakGlassToken>, anyhow::Error> {
        let mut tx = self.pool.begin().await?;
        Self::push_org_scope(&mut tx, org_id).await?;

        let token = sqlx::query_as::<_, BreakGlassToken>(
            "SELECT token_id, org_id, actor_id, reason, token_hash, expiry_utc, created_utc \
             FROM break_glass_tokens WHERE org_id = $1 AND token_hash = $2",
        )
        .bind(org_id)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(token)
    }

    async fn claim_idempotency(
        &self,
        scope: &IdempotencyScope,
        request_hash: &str,
    ) -> Result<IdempotencyClaim, anyhow::Error> {
        let record = IdempotencyRecord::claim(scope, request_hash.to_string());

        let mut tx = self.pool.begin().await?;
        Self::push_org_scope(&mut tx, scope.org_id).await?;

        let inserted = sqlx::query(
            "INSERT INTO idempotency_records \
             (record_id, org_id, actor_id, method, path, idem_key, request_hash, \
              response_status, response_body, created_utc, completed_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, NULL, $8, NULL) \
             ON CONFLICT (org_id, actor_id, method, path, idem_key) DO NOTHING",
        )
        .bind(record.record_id)
        .bind(record.org_id)
        .bind(record.actor_id)
        .bind(&record.method)
        .bind(&record.path)
        .bind(&record.idem_key)
        .bind(&record.request_hash)
        .bind(record.created_utc)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            tx.commit().await?;
            return Ok(IdempotencyClaim::Claimed);
        }

        let existing = sqlx::query_as::<_, IdempotencyRecord>(
            "SELECT record_id, org_id, actor_id, method, path, idem_key, request_hash, \
                    response_status, response_body, created_utc, completed_utc \
             FROM idempotency_records \
             WHERE org_id = $1 AND actor_id = $2 AND method = $3 AND path = $4 \
               AND idem_key = $5",
        )
        .bind(scope.org_id)
        .bind(scope.actor_id)
        .bind(&scope.method)
        .bind(&scope.path)
        .bind(&scope.key)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if existing.request_hash != request_hash {
            return Ok(IdempotencyClaim::Conflict);
        }

        match (existing.response_status, existing.response_body) {
            (Some(status), Some(body)) => Ok(IdempotencyClaim::Replay {
                status: status as u16,
                body,
            }),
            _ => Ok(IdempotencyClaim::Pending),
        }
    }

    async fn complete_idempotency(
        &self,
        scope: &IdempotencyScope,
        status: u16,
        body: &[u8],
    ) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;
        Self::push_org_scope(&mut tx, scope.org_id).await?;

        sqlx::query(
            "UPDATE idempotency_records \
             SET response_status = $6, response_body = $7, completed_utc = now() \
             WHERE org_id = $1 AND actor_id = $2 AND method = $3 AND path = $4 \
               AND idem_key = $5",
        )
        .bind(scope.org_id)
        .bind(scope.actor_id)
        .bind(&scope.method)
        .bind(&scope.path)
        .bind(&scope.key)
        .bind(status as i16)
        .bind(body)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn release_idempotency(&self, scope: &IdempotencyScope) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;
        Self::push_org_scope(&mut tx, scope.org_id).await?;

        sqlx::query(
            "DELETE FROM idempotency_records \
             WHERE org_id = $1 AND actor_id = $2 AND method = $3 AND path = $4 \
               AND idem_key = $5 AND completed_utc IS NULL",
        )
        .bind(scope.org_id)
        .bind(scope.actor_id)
        .bind(&scope.method)
        .bind(&scope.path)
        .bind(&scope.key)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;
        if let Some(org_id) = event.org_id {
            Self::push_org_scope(&mut tx, org_id).await?;
        }

        sqlx::query(
            "INSERT INTO audit_events \
             (event_id, org_id, actor_id, event_type_code, target_type, target_id, \
              break_glass_reason, before_snapshot, after_snapshot, ip_address, created_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(event.event_id)
        .bind(event.org_id)
        .bind(event.actor_id)
        .bind(&event.event_type_code)
        .bind(&event.target_type)
        .bind(event.target_id)
        .bind(&event.break_glass_reason)
        .bind(&event.before_snapshot)
        .bind(&event.after_snapshot)
        .bind(&event.ip_address)
        .bind(event.created_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn audit_events_for_org(&self, org_id: Uuid) -> Result<Vec<AuditEvent>, anyhow::Error> {
        let mut tx = self.pool.begin().await?;
        Self::push_org_scope(&mut tx, org_id).await?;

        let events = sqlx::query_as::<_, AuditEvent>(
            "SELECT event_id, org_id, actor_id, event_type_code, target_type, target_id, \
                    break_glass_reason, before_snapshot, after_snapshot, ip_address, created_utc \
             FROM audit_events WHERE org_id = $1 ORDER BY created_utc",
        )
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(events)
    }

    async fn read_only_mode(&self) -> Result<bool, anyhow::Error> {
        let enabled: Option<bool> =
            sqlx::query_scalar("SELECT enabled FROM ops_flags WHERE flag_key = 'read_only'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(enabled.unwrap_or(false))
    }

    async fn set_read_only_mode(&self, enabled: bool) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO ops_flags (flag_key, enabled, updated_utc) \
             VALUES ('read_only', $1, now()) \
             ON CONFLICT (flag_key) DO UPDATE SET enabled = $1, updated_utc = now()",
        )
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
