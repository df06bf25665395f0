//! Org-scope context propagation.
//!
//! The resolved organization travels with the request explicitly (request
//! extensions, function parameters), never through a thread-local or a
//! global. The storage layer additionally pushes it into the transaction as
//! `app.current_org` so row-level-security policies back up the explicit
//! filters.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use platform_core::error::AppError;
use uuid::Uuid;

use crate::{services::AuthContext, AppState};

/// Request-scoped organization. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgContext {
    pub org_id: Uuid,
}

/// Resolve the caller's organization from the authenticated context, falling
/// back to the configured default for legacy admin accounts that predate
/// multi-tenancy. Applied after authentication.
pub async fn org_scope_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let org_id = req
        .extensions()
        .get::<AuthContext>()
        .and_then(|ctx| ctx.org_id)
        .or(state.config.default_org_id);

    if let Some(org_id) = org_id {
        req.extensions_mut().insert(OrgContext { org_id });
    }

    next.run(req).await
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for OrgContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<OrgContext>().copied().ok_or_else(|| {
            AppError::forbidden(
                "org_mismatch",
                "Request is not scoped to an organization",
            )
        })
    }
}
