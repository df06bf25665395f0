//! Identity model - every account kind that can authenticate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::mfa::MfaState;
use super::role::Role;

/// Account kinds. One tagged record rather than a type per kind: the token
/// manager and permission resolver only ever touch the common surface
/// (role, organization, session reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Operator/platform administrator. May predate multi-tenancy and carry
    /// no org id.
    AdminAccount,
    /// SaaS organization member.
    OrgMember,
    /// Field-worker portal user.
    WorkerAccount,
    /// Client reachable only through magic-link portal tokens.
    ClientContact,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::AdminAccount => "admin_account",
            IdentityKind::OrgMember => "org_member",
            IdentityKind::WorkerAccount => "worker_account",
            IdentityKind::ClientContact => "client_contact",
        }
    }
}

impl std::str::FromStr for IdentityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin_account" => Ok(IdentityKind::AdminAccount),
            "org_member" => Ok(IdentityKind::OrgMember),
            "worker_account" => Ok(IdentityKind::WorkerAccount),
            "client_contact" => Ok(IdentityKind::ClientContact),
            _ => Err(format!("Invalid identity kind: {}", s)),
        }
    }
}

/// Identity state codes. Identities are never hard-deleted; audit trails
/// must keep resolving actor ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Suspended,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Active => "active",
            IdentityStatus::Suspended => "suspended",
        }
    }
}

/// Identity entity.
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub identity_id: Uuid,
    pub kind_code: String,
    pub org_id: Option<Uuid>,
    pub email: String,
    /// Tagged credential hash; None for client contacts, which authenticate
    /// through portal tokens only.
    pub password_hash: Option<String>,
    pub role_code: String,
    pub mfa_state_code: String,
    pub status_code: String,
    pub created_utc: DateTime<Utc>,
}

impl Identity {
    pub fn new(
        kind: IdentityKind,
        org_id: Option<Uuid>,
        email: String,
        password_hash: Option<String>,
        role: Role,
    ) -> Self {
        Self {
            identity_id: Uuid::new_v4(),
            kind_code: kind.as_str().to_string(),
            org_id,
            email,
            password_hash,
            role_code: role.as_str().to_string(),
            mfa_state_code: MfaState::Unenrolled.as_str().to_string(),
            status_code: IdentityStatus::Active.as_str().to_string(),
            created_utc: Utc::now(),
        }
    }

    pub fn kind(&self) -> Option<IdentityKind> {
        self.kind_code.parse().ok()
    }

    pub fn role(&self) -> Option<Role> {
        self.role_code.parse().ok()
    }

    pub fn mfa_state(&self) -> Option<MfaState> {
        self.mfa_state_code.parse().ok()
    }

    pub fn is_active(&self) -> bool {
        self.status_code == IdentityStatus::Active.as_str()
    }
}
