//! Session model - one authenticated browser/client lifetime.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Why a session was revoked. Recorded on the row for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Logout,
    Rotated,
    PasswordChanged,
    MfaEnabled,
    MfaDisabled,
    AdminRevoked,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Logout => "logout",
            RevocationReason::Rotated => "rotated",
            RevocationReason::PasswordChanged => "password_changed",
            RevocationReason::MfaEnabled => "mfa_enabled",
            RevocationReason::MfaDisabled => "mfa_disabled",
            RevocationReason::AdminRevoked => "admin_revoked",
        }
    }
}

/// Outcome of an atomic refresh rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    Rotated,
    NotFound,
    Expired,
    Revoked,
}

/// Session entity. The opaque refresh token is never stored; only its
/// SHA-256 digest is.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub identity_id: Uuid,
    pub org_id: Option<Uuid>,
    pub refresh_token_hash: String,
    pub mfa_verified: bool,
    pub issued_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub refresh_expiry_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
}

impl Session {
    pub fn new(
        identity_id: Uuid,
        org_id: Option<Uuid>,
        refresh_token_hash: String,
        mfa_verified: bool,
        session_ttl_minutes: i64,
        refresh_ttl_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            identity_id,
            org_id,
            refresh_token_hash,
            mfa_verified,
            issued_utc: now,
            expiry_utc: now + Duration::minutes(session_ttl_minutes),
            refresh_expiry_utc: now + Duration::minutes(refresh_ttl_minutes),
            revoked_utc: None,
            revoked_reason: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }

    pub fn can_refresh(&self) -> bool {
        !self.is_revoked() && self.refresh_expiry_utc > Utc::now()
    }

    /// Active = usable for request authentication right now.
    pub fn is_active(&self) -> bool {
        !self.is_revoked() && !self.is_expired()
    }
}
