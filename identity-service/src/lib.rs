pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use platform_core::error::AppError;
use platform_core::middleware::rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware};
use platform_core::middleware::security_headers::security_headers_middleware;
use platform_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::services::{
    AuditService, BreakGlassService, IdempotencyService, MfaService, SessionService, TokenService,
};
use crate::store::AuthStore;

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn AuthStore>,
    pub tokens: TokenService,
    pub sessions: SessionService,
    pub mfa: MfaService,
    pub break_glass: BreakGlassService,
    pub idempotency: IdempotencyService,
    pub audit: AuditService,
    pub login_rate_limiter: platform_core::middleware::rate_limit::IpRateLimiter,
    pub ip_rate_limiter: platform_core::middleware::rate_limit::IpRateLimiter,
}

impl AppState {
    /// Wire the service graph over a storage backend. Shared by main and the
    /// integration tests, which pass the in-memory store.
    pub fn new(config: IdentityConfig, store: Arc<dyn AuthStore>) -> Self {
        let tokens = TokenService::new(&config.jwt);
        let audit = AuditService::new(store.clone());
        let sessions = SessionService::new(
            store.clone(),
            tokens.clone(),
            audit.clone(),
            config.session.clone(),
            config.mfa.clone(),
        );
        let mfa = MfaService::new(store.clone(), audit.clone(), config.mfa.clone());
        let break_glass = BreakGlassService::new(
            store.clone(),
            audit.clone(),
            config.admin_gate.break_glass_max_ttl_seconds,
        );
        let idempotency = IdempotencyService::new(store.clone());

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Self {
            config,
            store,
            tokens,
            sessions,
            mfa,
            break_glass,
            idempotency,
            audit,
            login_rate_limiter,
            ip_rate_limiter,
        }
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Dangerous mutating admin routes sit behind the idempotency ledger.
    let idempotent_admin = Router::new()
        .route("/admin/leads", post(handlers::admin::create_lead))
        .route(
            "/admin/leads/:lead_id/status",
            post(handlers::admin::update_lead_status),
        )
        .route(
            "/admin/identities/:identity_id/revoke-sessions",
            post(handlers::admin::revoke_identity_sessions),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::idempotency_middleware,
        ));

    // Gate order, outermost first: IP allowlist + read-only mode, then
    // authentication, then org resolution, then break-glass capture.
    let admin_routes = Router::new()
        .route("/admin/leads", get(handlers::admin::list_leads))
        .route("/admin/audit-events", get(handlers::admin::list_audit_events))
        .route("/admin/read-only", post(handlers::admin::set_read_only))
        .route(
            "/admin/break-glass/start",
            post(handlers::break_glass::start),
        )
        .route(
            "/admin/portal-tokens",
            post(handlers::admin::issue_portal_token),
        )
        .merge(idempotent_admin)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::break_glass_capture_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::org_scope_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_gate_middleware,
        ));

    // Login gets its own, tighter rate limit.
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let session_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/password", post(handlers::auth::change_password))
        .route("/auth/2fa/enroll", post(handlers::mfa::enroll))
        .route("/auth/2fa/verify", post(handlers::mfa::verify))
        .route("/auth/2fa/disable", post(handlers::mfa::disable))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let ip_limiter = state.ip_rate_limiter.clone();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/portal/exchange", post(handlers::portal::exchange))
        .merge(login_route)
        .merge(session_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Tracing layer with request ids
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<axum::http::HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                axum::http::HeaderValue::from_static("*")
                            })
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::HeaderName::from_static("idempotency-key"),
                    axum::http::header::HeaderName::from_static("x-break-glass-token"),
                    axum::http::header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check.
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::InternalError(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
    })))
}
