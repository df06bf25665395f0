//! Audit sink for security-relevant events.

use std::sync::Arc;

use crate::models::AuditEvent;
use crate::store::AuthStore;

/// Writes audit events to the store, tagging privileged writes performed
/// under a break-glass grant with the grant's original reason.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuthStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Write an audit event, failing the caller's request on storage errors.
    /// Privileged writes must not proceed unaudited.
    pub async fn log(&self, event: AuditEvent) -> Result<(), anyhow::Error> {
        tracing::info!(
            event_type = %event.event_type_code,
            org_id = ?event.org_id,
            actor_id = ?event.actor_id,
            "Audit event"
        );
        self.store.insert_audit_event(&event).await
    }

    /// Write an audit event without blocking the request path. Used for
    /// denial/warning events where the request outcome is already decided.
    pub fn log_async(&self, event: AuditEvent) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.insert_audit_event(&event).await {
                tracing::error!(
                    error = %e,
                    event_type = %event.event_type_code,
                    "Failed to write audit event"
                );
            }
        });
    }
}
