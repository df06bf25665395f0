//! Client portal token exchange.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use platform_core::error::AppError;
use serde::Deserialize;
use validator::Validate;

use crate::utils::ValidatedJson;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct PortalExchangeRequest {
    #[validate(length(min = 1))]
    pub token: String,
}

/// Exchange a magic-link token for a viewer session. Single use; expired or
/// already-used tokens fail with 401.
pub async fn exchange(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PortalExchangeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (tokens, _session) = state.sessions.exchange_portal_token(&req.token).await?;
    Ok((StatusCode::OK, Json(tokens)))
}
