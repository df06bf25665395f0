//! Audit event model - security and compliance logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Audit event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Login,
    Logout,
    TokenRefreshed,
    SessionRevoked,
    AllSessionsRevoked,
    PasswordRehashed,
    PasswordChanged,
    MfaEnrollmentStarted,
    MfaEnabled,
    MfaDisabled,
    PortalTokenIssued,
    PortalTokenExchanged,
    BreakGlassIssued,
    PrivilegedWrite,
    ReadOnlyToggled,
    GateDenied,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Login => "login",
            AuditEventType::Logout => "logout",
            AuditEventType::TokenRefreshed => "token_refreshed",
            AuditEventType::SessionRevoked => "session_revoked",
            AuditEventType::AllSessionsRevoked => "all_sessions_revoked",
            AuditEventType::PasswordRehashed => "password_rehashed",
            AuditEventType::PasswordChanged => "password_changed",
            AuditEventType::MfaEnrollmentStarted => "mfa_enrollment_started",
            AuditEventType::MfaEnabled => "mfa_enabled",
            AuditEventType::MfaDisabled => "mfa_disabled",
            AuditEventType::PortalTokenIssued => "portal_token_issued",
            AuditEventType::PortalTokenExchanged => "portal_token_exchanged",
            AuditEventType::BreakGlassIssued => "break_glass_issued",
            AuditEventType::PrivilegedWrite => "privileged_write",
            AuditEventType::ReadOnlyToggled => "read_only_toggled",
            AuditEventType::GateDenied => "gate_denied",
        }
    }
}

/// Audit event entity. Privileged writes performed under a break-glass
/// grant carry the grant's original reason plus before/after snapshots
/// where applicable.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub org_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub event_type_code: String,
    pub target_type: Option<String>,
    pub target_id: Option<Uuid>,
    pub break_glass_reason: Option<String>,
    pub before_snapshot: Option<serde_json::Value>,
    pub after_snapshot: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        org_id: Option<Uuid>,
        actor_id: Option<Uuid>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            org_id,
            actor_id,
            event_type_code: event_type.as_str().to_string(),
            target_type: None,
            target_id: None,
            break_glass_reason: None,
            before_snapshot: None,
            after_snapshot: None,
            ip_address: None,
            created_utc: Utc::now(),
        }
    }

    pub fn with_target(mut self, target_type: impl Into<String>, target_id: Uuid) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id);
        self
    }

    pub fn with_break_glass_reason(mut self, reason: impl Into<String>) -> Self {
        self.break_glass_reason = Some(reason.into());
        self
    }

    pub fn with_snapshots(
        mut self,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        self.before_snapshot = before;
        self.after_snapshot = after;
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }
}
