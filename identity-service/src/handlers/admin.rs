//! Privileged admin handlers.
//!
//! The lead endpoints are a deliberately thin stand-in for the CRUD surface
//! outside this core: enough of a mutating admin resource for the safety
//! gate, idempotency ledger, and break-glass audit trail to have something
//! real to protect.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use platform_core::error::AppError;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::ensure_privileged;
use crate::middleware::{AuthIdentity, OrgContext};
use crate::models::{AuditEvent, AuditEventType, BreakGlassGrant, RevocationReason};
use crate::services::policy::{self, Action};
use crate::utils::ValidatedJson;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLeadRequest {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLeadStatusRequest {
    #[validate(length(min = 1, max = 64))]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SetReadOnlyRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct IssuePortalTokenRequest {
    pub identity_id: Uuid,
}

/// List leads for the caller's organization. Reads stay available in
/// read-only mode; viewer-equivalent roles get masked fields downstream.
pub async fn list_leads(
    AuthIdentity(ctx): AuthIdentity,
    org: OrgContext,
) -> Result<impl IntoResponse, AppError> {
    policy::ensure(ctx.role, Action::ViewLeads)?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "org_id": org.org_id,
            "leads": [],
            "masking": policy::masking_level(ctx.role),
        })),
    ))
}

/// Create a lead. Requires an Idempotency-Key; a replay returns the stored
/// response with the same lead id, and the handler runs exactly once.
pub async fn create_lead(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
    org: OrgContext,
    grant: Option<Extension<BreakGlassGrant>>,
    ValidatedJson(req): ValidatedJson<CreateLeadRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_privileged(&state, &ctx, Action::EditLeads)?;

    let lead_id = Uuid::new_v4();

    let mut event = AuditEvent::new(
        AuditEventType::PrivilegedWrite,
        Some(org.org_id),
        Some(ctx.identity_id),
    )
    .with_target("lead", lead_id)
    .with_snapshots(
        None,
        Some(serde_json::json!({ "name": req.name, "status": "new" })),
    );
    if let Some(Extension(grant)) = grant {
        event = event.with_break_glass_reason(grant.reason);
    }
    state.audit.log(event).await.map_err(AppError::InternalError)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "lead_id": lead_id,
            "name": req.name,
            "status": "new",
        })),
    ))
}

/// Change a lead's status. A mutating admin verb: rejected in read-only
/// mode, deduplicated by the idempotency ledger, audited with before/after
/// snapshots and the break-glass reason when a grant is active.
pub async fn update_lead_status(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
    org: OrgContext,
    grant: Option<Extension<BreakGlassGrant>>,
    Path(lead_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateLeadStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_privileged(&state, &ctx, Action::EditLeads)?;

    let mut event = AuditEvent::new(
        AuditEventType::PrivilegedWrite,
        Some(org.org_id),
        Some(ctx.identity_id),
    )
    .with_target("lead", lead_id)
    .with_snapshots(None, Some(serde_json::json!({ "status": req.status })));
    if let Some(Extension(grant)) = grant {
        event = event.with_break_glass_reason(grant.reason);
    }
    state.audit.log(event).await.map_err(AppError::InternalError)?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "lead_id": lead_id,
            "status": req.status,
        })),
    ))
}

/// Revoke every session of an identity. Idempotent by nature and still
/// behind the ledger: a replayed request reports the original count.
pub async fn revoke_identity_sessions(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
    org: OrgContext,
    grant: Option<Extension<BreakGlassGrant>>,
    Path(identity_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ensure_privileged(&state, &ctx, Action::RevokeSessions)?;

    let target = state
        .store
        .find_identity(identity_id)
        .await
        .map_err(AppError::InternalError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Identity not found")))?;
    if target.org_id.is_some() && target.org_id != Some(org.org_id) {
        return Err(AppError::forbidden(
            "org_mismatch",
            "Identity belongs to another organization",
        ));
    }

    let sessions_revoked = state
        .sessions
        .revoke_all(
            identity_id,
            RevocationReason::AdminRevoked,
            &ctx,
            grant.map(|Extension(g)| g.reason),
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "identity_id": identity_id,
            "sessions_revoked": sessions_revoked,
        })),
    ))
}

/// Toggle read-only mode (owner-only). The route itself is exempt from the
/// read-only check so the flag can be cleared during an incident.
pub async fn set_read_only(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
    org: OrgContext,
    Json(req): Json<SetReadOnlyRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_privileged(&state, &ctx, Action::ToggleReadOnly)?;

    let previous = state
        .store
        .read_only_mode()
        .await
        .map_err(AppError::InternalError)?;
    state
        .store
        .set_read_only_mode(req.enabled)
        .await
        .map_err(AppError::InternalError)?;

    tracing::warn!(enabled = req.enabled, actor_id = %ctx.identity_id, "Read-only mode toggled");
    state
        .audit
        .log(
            AuditEvent::new(
                AuditEventType::ReadOnlyToggled,
                Some(org.org_id),
                Some(ctx.identity_id),
            )
            .with_snapshots(
                Some(serde_json::json!({ "read_only": previous })),
                Some(serde_json::json!({ "read_only": req.enabled })),
            ),
        )
        .await
        .map_err(AppError::InternalError)?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "read_only": req.enabled })),
    ))
}

/// Issue a magic-link portal token for a client contact. The raw token goes
/// to the notification system outside this core; it is returned once here.
pub async fn issue_portal_token(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
    Json(req): Json<IssuePortalTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_privileged(&state, &ctx, Action::IssuePortalTokens)?;

    let (raw, token) = state
        .sessions
        .issue_portal_token(req.identity_id, &ctx)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "token": raw,
            "identity_id": token.identity_id,
            "expires_at": token.expiry_utc,
        })),
    ))
}

/// Read the organization's audit trail.
pub async fn list_audit_events(
    State(state): State<AppState>,
    AuthIdentity(ctx): AuthIdentity,
    org: OrgContext,
) -> Result<impl IntoResponse, AppError> {
    ensure_privileged(&state, &ctx, Action::ViewAuditLog)?;

    let events = state
        .store
        .audit_events_for_org(org.org_id)
        .await
        .map_err(AppError::InternalError)?;

    let events: Vec<serde_json::Value> = events
        .into_iter()
        .map(|e| {
            serde_json::json!({
                "event_id": e.event_id,
                "event_type": e.event_type_code,
                "actor_id": e.actor_id,
                "target_type": e.target_type,
                "target_id": e.target_id,
                "break_glass_reason": e.break_glass_reason,
                "before": e.before_snapshot,
                "after": e.after_snapshot,
                "created_at": e.created_utc,
            })
        })
        .collect();

    Ok((StatusCode::OK, Json(serde_json::json!({ "events": events }))))
}
