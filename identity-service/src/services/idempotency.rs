//! Idempotency ledger for dangerous mutating admin requests.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ServiceError;
use crate::models::{IdempotencyClaim, IdempotencyScope};
use crate::store::AuthStore;

/// How a deduplicated request should proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// First occurrence of the key; run the handler and record the response.
    Execute,
    /// Identical request already completed; replay the stored response.
    Replay { status: u16, body: Vec<u8> },
}

/// Bounded wait for a concurrent winner to finish. The loser never races its
/// own handler; it either replays the stored response or gives up with a
/// conflict.
const PENDING_POLL_INTERVAL: Duration = Duration::from_millis(50);
const PENDING_POLL_ATTEMPTS: u32 = 40;

#[derive(Clone)]
pub struct IdempotencyService {
    store: Arc<dyn AuthStore>,
}

impl IdempotencyService {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Claim a key, or resolve how to answer without running the handler.
    ///
    /// A repeat with the same key but a different request signature is a
    /// conflict, never a silent re-execution under the stored key.
    pub async fn begin(
        &self,
        scope: &IdempotencyScope,
        request_hash: &str,
    ) -> Result<Begin, ServiceError> {
        let mut attempts = 0;
        loop {
            match self.store.claim_idempotency(scope, request_hash).await? {
                IdempotencyClaim::Claimed => return Ok(Begin::Execute),
                IdempotencyClaim::Replay { status, body } => {
                    tracing::info!(
                        idem_key = %scope.key,
                        org_id = %scope.org_id,
                        "Replaying stored idempotent response"
                    );
                    return Ok(Begin::Replay { status, body });
                }
                IdempotencyClaim::Conflict => return Err(ServiceError::IdempotencyConflict),
                IdempotencyClaim::Pending => {
                    attempts += 1;
                    if attempts > PENDING_POLL_ATTEMPTS {
                        return Err(ServiceError::IdempotencyConflict);
                    }
                    tokio::time::sleep(PENDING_POLL_INTERVAL).await;
                }
            }
        }
    }

    /// Persist the winning handler's response for future replays.
    pub async fn complete(
        &self,
        scope: &IdempotencyScope,
        status: u16,
        body: &[u8],
    ) -> Result<(), ServiceError> {
        self.store.complete_idempotency(scope, status, body).await?;
        Ok(())
    }

    /// Release a claim whose handler failed so a retry re-executes.
    pub async fn abort(&self, scope: &IdempotencyScope) -> Result<(), ServiceError> {
        self.store.release_idempotency(scope).await?;
        Ok(())
    }
}

/// Request signature: method, path, and normalized body digest. Two requests
/// under one key must agree on all three to be considered the same request.
pub fn request_signature(method: &str, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(path.as_bytes());
    hasher.update(b"\n");
    hasher.update(body);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_sensitive_to_every_component() {
        let base = request_signature("POST", "/admin/leads", br#"{"a":1}"#);
        assert_eq!(base, request_signature("POST", "/admin/leads", br#"{"a":1}"#));
        assert_ne!(base, request_signature("PUT", "/admin/leads", br#"{"a":1}"#));
        assert_ne!(base, request_signature("POST", "/admin/other", br#"{"a":1}"#));
        assert_ne!(base, request_signature("POST", "/admin/leads", br#"{"a":2}"#));
    }
}
