//! TOTP enrollment, verification, and disable handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use platform_core::error::AppError;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::middleware::AuthIdentity;
use crate::services::policy::{self, Action};
use crate::utils::ValidatedJson;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyMfaRequest {
    #[validate(length(min = 6, max = 8))]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct DisableMfaRequest {
    /// Defaults to the caller's own identity.
    pub identity_id: Option<Uuid>,
}

/// Begin enrollment. The secret and otpauth URI are delivered exactly once;
/// the factor does not count until a code is verified.
pub async fn enroll(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = state.mfa.enroll(&ctx).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "secret": enrollment.secret_base32,
            "enrollment_uri": enrollment.enrollment_uri,
        })),
    ))
}

/// Confirm the pending factor. Marks the current session verified and
/// revokes every other session of the identity.
pub async fn verify(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
    ValidatedJson(req): ValidatedJson<VerifyMfaRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.mfa.verify(&ctx, &req.code).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "MFA enabled"
        })),
    ))
}

/// Disable a factor (owner-only). Revokes every session of the identity,
/// since a compromised factor must not leave any live session behind.
pub async fn disable(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
    body: Option<Json<DisableMfaRequest>>,
) -> Result<impl IntoResponse, AppError> {
    policy::ensure(ctx.role, Action::DisableMfa)?;

    let target = body
        .and_then(|Json(req)| req.identity_id)
        .unwrap_or(ctx.identity_id);
    let sessions_revoked = state.mfa.disable(&ctx, target).await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "MFA disabled",
            "sessions_revoked": sessions_revoked,
        })),
    ))
}
