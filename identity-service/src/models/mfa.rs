//! MFA secret model - TOTP seeds and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Factor lifecycle. A secret only counts once a verification succeeded;
/// an issued-but-unconfirmed secret can be re-issued freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaState {
    Unenrolled,
    PendingVerification,
    Enabled,
    Disabled,
}

impl MfaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MfaState::Unenrolled => "unenrolled",
            MfaState::PendingVerification => "pending_verification",
            MfaState::Enabled => "enabled",
            MfaState::Disabled => "disabled",
        }
    }
}

impl std::str::FromStr for MfaState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unenrolled" => Ok(MfaState::Unenrolled),
            "pending_verification" => Ok(MfaState::PendingVerification),
            "enabled" => Ok(MfaState::Enabled),
            "disabled" => Ok(MfaState::Disabled),
            _ => Err(format!("Invalid MFA state: {}", s)),
        }
    }
}

/// TOTP seed bound to an identity. Destroyed on disable.
#[derive(Debug, Clone, FromRow)]
pub struct MfaSecret {
    pub identity_id: Uuid,
    pub secret_base32: String,
    pub activated_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl MfaSecret {
    pub fn pending(identity_id: Uuid, secret_base32: String) -> Self {
        Self {
            identity_id,
            secret_base32,
            activated_utc: None,
            created_utc: Utc::now(),
        }
    }

    pub fn is_activated(&self) -> bool {
        self.activated_utc.is_some()
    }
}
