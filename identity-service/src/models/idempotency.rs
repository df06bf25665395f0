//! Idempotency ledger records for dangerous mutating admin requests.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Ledger key. Always org-scoped: the same client key reused across
/// organizations is a distinct entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyScope {
    pub org_id: Uuid,
    pub actor_id: Uuid,
    pub method: String,
    pub path: String,
    pub key: String,
}

/// Stored outcome of the first execution under a key.
#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub record_id: Uuid,
    pub org_id: Uuid,
    pub actor_id: Uuid,
    pub method: String,
    pub path: String,
    pub idem_key: String,
    pub request_hash: String,
    /// None while the winning request is still executing.
    pub response_status: Option<i16>,
    pub response_body: Option<Vec<u8>>,
    pub created_utc: DateTime<Utc>,
    pub completed_utc: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    pub fn claim(scope: &IdempotencyScope, request_hash: String) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            org_id: scope.org_id,
            actor_id: scope.actor_id,
            method: scope.method.clone(),
            path: scope.path.clone(),
            idem_key: scope.key.clone(),
            request_hash,
            response_status: None,
            response_body: None,
            created_utc: Utc::now(),
            completed_utc: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_utc.is_some()
    }
}

/// What the atomic claim attempt found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyClaim {
    /// This request won the key; run the handler and record the response.
    Claimed,
    /// Same key, same signature, winner still executing; wait for it.
    Pending,
    /// Same key, same signature, completed; replay the stored response.
    Replay { status: u16, body: Vec<u8> },
    /// Same key, different request signature.
    Conflict,
}
