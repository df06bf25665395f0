//! Break-glass token model - reason-audited emergency credentials.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Emergency credential scoped to one organization. The raw token is
/// delivered exactly once in a response header; only its digest persists.
/// There is no extend operation: after expiry a new token must be minted.
#[derive(Debug, Clone, FromRow)]
pub struct BreakGlassToken {
    pub token_id: Uuid,
    pub org_id: Uuid,
    pub actor_id: Uuid,
    pub reason: String,
    pub token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl BreakGlassToken {
    pub fn new(
        org_id: Uuid,
        actor_id: Uuid,
        reason: String,
        token_hash: String,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            org_id,
            actor_id,
            reason,
            token_hash,
            expiry_utc: now + Duration::seconds(ttl_seconds),
            created_utc: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }
}

/// Grant attached to request extensions while a valid break-glass token
/// accompanies a privileged request.
#[derive(Debug, Clone)]
pub struct BreakGlassGrant {
    pub token_id: Uuid,
    pub org_id: Uuid,
    pub reason: String,
}
