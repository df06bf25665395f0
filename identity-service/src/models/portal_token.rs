//! Portal token model - magic-link credentials for client contacts.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Magic-link token, hashed at rest. Exchanging it yields a normal
/// viewer-role session; the raw value is single-use.
#[derive(Debug, Clone, FromRow)]
pub struct PortalToken {
    pub token_id: Uuid,
    pub identity_id: Uuid,
    pub org_id: Uuid,
    pub token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub used_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl PortalToken {
    pub fn new(identity_id: Uuid, org_id: Uuid, token_hash: String, ttl_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            identity_id,
            org_id,
            token_hash,
            expiry_utc: now + Duration::minutes(ttl_minutes),
            used_utc: None,
            created_utc: now,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.used_utc.is_none() && self.expiry_utc > Utc::now()
    }
}
