use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Service-wide HTTP error type.
///
/// The 401/403/409 variants carry a machine-readable `kind` slug so callers
/// can distinguish, e.g., an expired session from a missing MFA factor and
/// route the user accordingly instead of always falling back to the login
/// form.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized ({kind}): {message}")]
    Unauthorized { kind: &'static str, message: String },

    #[error("Forbidden ({kind}): {message}")]
    Forbidden { kind: &'static str, message: String },

    #[error("Conflict ({kind}): {message}")]
    Conflict { kind: &'static str, message: String },

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            #[serde(rename = "type")]
            kind: &'static str,
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, kind, error_message, details, retry_after) = match self {
            AppError::ValidationError(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Validation error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::BadRequest(err) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                err.to_string(),
                None,
                None,
            ),
            AppError::NotFound(err) => (
                StatusCode::NOT_FOUND,
                "not_found",
                err.to_string(),
                None,
                None,
            ),
            AppError::Unauthorized { kind, message } => {
                (StatusCode::UNAUTHORIZED, kind, message, None, None)
            }
            AppError::Forbidden { kind, message } => {
                (StatusCode::FORBIDDEN, kind, message, None, None)
            }
            AppError::Conflict { kind, message } => {
                (StatusCode::CONFLICT, kind, message, None, None)
            }
            AppError::TooManyRequests(msg, retry) => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                msg,
                None,
                retry,
            ),
            AppError::InternalError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::DatabaseError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database_error",
                "Database error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                "Configuration error".to_string(),
                Some(err.to_string()),
                None,
            ),
        };

        let mut res = (
            status,
            Json(ErrorBody {
                kind,
                error: error_message,
                details,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

impl AppError {
    /// 401 with a distinguishable `type` slug.
    pub fn unauthorized(kind: &'static str, message: impl Into<String>) -> Self {
        AppError::Unauthorized {
            kind,
            message: message.into(),
        }
    }

    /// 403 with a distinguishable `type` slug.
    pub fn forbidden(kind: &'static str, message: impl Into<String>) -> Self {
        AppError::Forbidden {
            kind,
            message: message.into(),
        }
    }

    /// 409 with a distinguishable `type` slug.
    pub fn conflict(kind: &'static str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_carries_kind_slug() {
        let res = AppError::unauthorized("session_revoked", "Session has been revoked")
            .into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn too_many_requests_sets_retry_after() {
        let res = AppError::TooManyRequests("slow down".to_string(), Some(30)).into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            res.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
            "30"
        );
    }
}
