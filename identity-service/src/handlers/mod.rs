pub mod admin;
pub mod auth;
pub mod break_glass;
pub mod mfa;
pub mod portal;

use crate::error::ServiceError;
use crate::services::policy::{self, Action};
use crate::services::AuthContext;
use crate::AppState;

/// Gate for privileged operations: the role must hold the permission, and a
/// role in the enforced-MFA set must be backed by a verified factor. The
/// factor failure is the distinguishable 401 so clients route the user to a
/// verification step, not the login form.
pub(crate) fn ensure_privileged(
    state: &AppState,
    ctx: &AuthContext,
    action: Action,
) -> Result<(), ServiceError> {
    policy::ensure(ctx.role, action)?;
    if state.mfa.role_requires_mfa(ctx.role) && !ctx.mfa_verified {
        return Err(ServiceError::MfaRequired);
    }
    Ok(())
}
