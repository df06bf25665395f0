use platform_core::error::AppError;
use thiserror::Error;

/// Domain errors for the identity core.
///
/// The taxonomy is deliberately exact about 401 vs 403: 401 is reserved for
/// missing/invalid/expired/revoked credentials (plus the distinguishable
/// `mfa_required`), 403 for valid credentials that the role, organization, or
/// gate disallows. Conflating the two breaks client retry/login routing.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredential,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session revoked")]
    SessionRevoked,

    #[error("Multi-factor verification required")]
    MfaRequired,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Organization scope mismatch")]
    OrgMismatch,

    #[error("Client address not allowed")]
    IpNotAllowed,

    #[error("Service is in read-only mode")]
    ReadOnlyMode,

    #[error("Idempotency key conflict")]
    IdempotencyConflict,

    #[error("Idempotency key required")]
    IdempotencyKeyMissing,

    #[error("MFA factor not in a verifiable state")]
    MfaNotPending,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredential => {
                AppError::unauthorized("invalid_credential", "Invalid credentials")
            }
            ServiceError::SessionExpired => {
                AppError::unauthorized("session_expired", "Session has expired")
            }
            ServiceError::SessionRevoked => {
                AppError::unauthorized("session_revoked", "Session has been revoked")
            }
            ServiceError::MfaRequired => AppError::unauthorized(
                "mfa_required",
                "Multi-factor verification required",
            ),
            ServiceError::PermissionDenied => {
                AppError::forbidden("permission_denied", "Permission denied")
            }
            ServiceError::OrgMismatch => AppError::forbidden(
                "org_mismatch",
                "Request is not scoped to an allowed organization",
            ),
            ServiceError::IpNotAllowed => AppError::forbidden(
                "ip_not_allowed",
                "Client address is not on the admin allowlist",
            ),
            ServiceError::ReadOnlyMode => AppError::conflict(
                "read_only_mode",
                "Service is in read-only mode; mutations are rejected",
            ),
            ServiceError::IdempotencyConflict => AppError::conflict(
                "idempotency_conflict",
                "Idempotency key was already used with a different request",
            ),
            ServiceError::IdempotencyKeyMissing => {
                AppError::BadRequest(anyhow::anyhow!("Idempotency-Key header is required"))
            }
            ServiceError::MfaNotPending => {
                AppError::BadRequest(anyhow::anyhow!("No MFA enrollment pending verification"))
            }
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!(what)),
            ServiceError::ValidationError(e) => AppError::BadRequest(anyhow::anyhow!(e)),
        }
    }
}
