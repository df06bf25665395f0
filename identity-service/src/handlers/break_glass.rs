//! Break-glass escalation handler.

use axum::{
    extract::State,
    http::{HeaderName, StatusCode},
    response::IntoResponse,
    Json,
};
use platform_core::error::AppError;
use serde::Deserialize;
use validator::Validate;

use crate::handlers::ensure_privileged;
use crate::middleware::admin_gate::BREAK_GLASS_HEADER;
use crate::middleware::AuthIdentity;
use crate::services::policy::Action;
use crate::utils::ValidatedJson;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct StartBreakGlassRequest {
    #[validate(length(min = 1, max = 512))]
    pub reason: String,
    pub ttl_seconds: i64,
}

/// Mint a break-glass token. The raw token is returned exactly once in the
/// response header; the body only carries metadata.
pub async fn start(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
    ValidatedJson(req): ValidatedJson<StartBreakGlassRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_privileged(&state, &ctx, Action::StartBreakGlass)?;

    let (raw, token) = state
        .break_glass
        .start(&ctx, &req.reason, req.ttl_seconds)
        .await?;

    let headers = [(HeaderName::from_static(BREAK_GLASS_HEADER), raw)];
    let body = Json(serde_json::json!({
        "token_id": token.token_id,
        "org_id": token.org_id,
        "expires_at": token.expiry_utc,
    }));

    Ok((StatusCode::CREATED, headers, body))
}
