//! Admin safety gate: IP allowlist, read-only mode, break-glass capture.
//!
//! The first two checks run before authentication and each can short-circuit
//! the request on its own. Break-glass capture runs after authentication and
//! org resolution, because a token is only meaningful within one
//! organization.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use platform_core::error::AppError;
use std::net::IpAddr;

use crate::error::ServiceError;
use crate::models::{AuditEvent, AuditEventType};
use crate::middleware::org_scope::OrgContext;
use crate::AppState;

/// Path exempt from the read-only check so the flag can be cleared through
/// the API during an incident.
const READ_ONLY_TOGGLE_PATH: &str = "/admin/read-only";

pub const BREAK_GLASS_HEADER: &str = "x-break-glass-token";

/// IP allowlist and read-only enforcement for privileged routes.
pub async fn admin_gate_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let allowlist = &state.config.admin_gate.ip_allowlist;
    if !allowlist.is_empty() {
        let client_ip = resolve_client_ip(&req, state.config.admin_gate.trusted_proxy_hops);
        let allowed = client_ip
            .map(|ip| allowlist.iter().any(|net| net.contains(ip)))
            .unwrap_or(false);

        if !allowed {
            tracing::warn!(
                client_ip = ?client_ip,
                path = %req.uri().path(),
                "Admin request rejected by IP allowlist"
            );
            state.audit.log_async(
                AuditEvent::new(AuditEventType::GateDenied, None, None)
                    .with_ip(client_ip.map(|ip| ip.to_string()).unwrap_or_default()),
            );
            return Err(ServiceError::IpNotAllowed.into());
        }
    }

    let mutating = !matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS);
    if mutating && req.uri().path() != READ_ONLY_TOGGLE_PATH {
        let read_only = state
            .store
            .read_only_mode()
            .await
            .map_err(AppError::InternalError)?;
        if read_only {
            return Err(ServiceError::ReadOnlyMode.into());
        }
    }

    Ok(next.run(req).await)
}

/// Attach a break-glass grant when a valid token accompanies the request.
/// Invalid or expired tokens fail the request with 401 rather than silently
/// proceeding without the grant.
pub async fn break_glass_capture_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let raw = req
        .headers()
        .get(BREAK_GLASS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    if let Some(raw) = raw {
        let org = req
            .extensions()
            .get::<OrgContext>()
            .copied()
            .ok_or_else(|| AppError::from(ServiceError::OrgMismatch))?;

        let grant = state.break_glass.validate(org.org_id, &raw).await?;
        req.extensions_mut().insert(grant);
    }

    Ok(next.run(req).await)
}

/// Resolve the client address, honoring a trusted-proxy chain.
///
/// With `trusted_proxy_hops = n`, the n rightmost X-Forwarded-For entries
/// were appended by our own proxies; the entry just before them is the
/// client. With 0 hops the header is untrusted and the socket address wins.
fn resolve_client_ip(req: &Request, trusted_proxy_hops: usize) -> Option<IpAddr> {
    if trusted_proxy_hops > 0 {
        let entries: Vec<IpAddr> = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| {
                s.split(',')
                    .filter_map(|e| e.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        if entries.len() >= trusted_proxy_hops {
            return Some(entries[entries.len() - trusted_proxy_hops]);
        }
    }

    req.extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|axum::extract::ConnectInfo(addr)| addr.ip())
}
