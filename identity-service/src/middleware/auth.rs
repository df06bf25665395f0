//! Authentication middleware: bearer token + session liveness re-check.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use platform_core::error::AppError;

use crate::{services::AuthContext, AppState};

/// Require a valid access token whose session is still active.
///
/// Signature validity is not enough: the referenced session is re-checked on
/// every request so revocation takes effect immediately, even for tokens
/// that have not yet expired.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::unauthorized(
                "invalid_credential",
                "Missing or invalid Authorization header",
            )
        })?;

    let ctx = state.sessions.authenticate(token).await?;

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Extractor for the authenticated context in handlers.
pub struct AuthIdentity(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts.extensions.get::<AuthContext>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth context missing from request extensions"
            ))
        })?;

        Ok(AuthIdentity(ctx.clone()))
    }
}
