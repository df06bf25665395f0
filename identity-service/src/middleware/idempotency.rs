//! Idempotency middleware for dangerous mutating admin routes.
//!
//! Buffers the request body to compute the request signature, consults the
//! ledger, and either replays the stored response, rejects a conflicting
//! reuse, or runs the handler exactly once and records its response.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use platform_core::error::AppError;

use crate::error::ServiceError;
use crate::middleware::org_scope::OrgContext;
use crate::models::IdempotencyScope;
use crate::services::idempotency::{request_signature, Begin};
use crate::services::AuthContext;
use crate::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

pub async fn idempotency_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = req
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| AppError::from(ServiceError::IdempotencyKeyMissing))?;

    let actor = req
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Idempotency middleware requires an authenticated request"
            ))
        })?;
    let org = req
        .extensions()
        .get::<OrgContext>()
        .copied()
        .ok_or_else(|| AppError::from(ServiceError::OrgMismatch))?;

    let (parts, body) = req.into_parts();
    let body_bytes = body
        .collect()
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to read body: {}", e)))?
        .to_bytes();

    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();
    let signature = request_signature(&method, &path, &body_bytes);

    let scope = IdempotencyScope {
        org_id: org.org_id,
        actor_id: actor.identity_id,
        method,
        path,
        key,
    };

    match state.idempotency.begin(&scope, &signature).await? {
        Begin::Replay { status, body } => {
            let status = StatusCode::from_u16(status)
                .map_err(|e| AppError::InternalError(anyhow::anyhow!("Stored status: {}", e)))?;
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            Ok(response)
        }
        Begin::Execute => {
            let req = Request::from_parts(parts, Body::from(body_bytes));
            let response = next.run(req).await;

            let (response_parts, response_body) = response.into_parts();
            let response_bytes = response_body.collect().await.map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Failed to buffer response: {}", e))
            })?;
            let response_bytes = response_bytes.to_bytes();

            // 5xx responses release the claim so a retry re-executes;
            // everything else is the recorded outcome of this key.
            if response_parts.status.is_server_error() {
                state.idempotency.abort(&scope).await?;
            } else {
                state
                    .idempotency
                    .complete(&scope, response_parts.status.as_u16(), &response_bytes)
                    .await?;
            }

            Ok(Response::from_parts(
                response_parts,
                Body::from(response_bytes),
            ))
        }
    }
}
