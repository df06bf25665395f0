//! Login, refresh, and logout handlers.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use platform_core::error::AppError;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::ServiceError;
use crate::middleware::AuthIdentity;
use crate::utils::ValidatedJson;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Absent for legacy admin accounts that predate multi-tenancy.
    pub org_id: Option<Uuid>,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    pub totp_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Login with email and password (plus a TOTP code when a factor is
/// enabled).
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ip_address = client_ip(&headers);
    let (tokens, _session) = state
        .sessions
        .login(
            req.org_id,
            &req.email,
            &req.password,
            req.totp_code.as_deref(),
            ip_address,
        )
        .await?;
    Ok((StatusCode::OK, Json(tokens)))
}

/// Rotate a refresh token. The token is accepted from the request body or
/// the `refresh_token` cookie.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let refresh_token = body
        .and_then(|Json(req)| req.refresh_token)
        .or_else(|| jar.get("refresh_token").map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::from(ServiceError::InvalidCredential))?;

    let (tokens, _session) = state.sessions.refresh(&refresh_token).await?;
    Ok((StatusCode::OK, Json(tokens)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 12))]
    pub new_password: String,
}

/// Change the caller's password. Every session of the identity is revoked,
/// this one included; the client must log in again.
pub async fn change_password(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let sessions_revoked = state
        .sessions
        .change_password(&ctx, &req.current_password, &req.new_password)
        .await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Password changed; please log in again",
            "sessions_revoked": sessions_revoked,
        })),
    ))
}

/// Revoke the current session. Idempotent; always 200 for a valid bearer.
pub async fn logout(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
) -> Result<impl IntoResponse, AppError> {
    state.sessions.logout(&ctx).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Logged out successfully"
        })),
    ))
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
}
