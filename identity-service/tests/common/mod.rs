//! Shared harness for integration tests: an app wired over the in-memory
//! store, plus request helpers.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    Router,
};
use identity_service::{
    build_router,
    config::{
        AdminGateConfig, DatabaseConfig, Environment, IdentityConfig, JwtConfig, MfaConfig,
        RateLimitConfig, SecurityConfig, SessionConfig,
    },
    models::{Identity, IdentityKind, Role},
    services::password::{hash_password, Password},
    store::{AuthStore, MemoryStore},
    AppState,
};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<dyn AuthStore>,
    pub org_id: Uuid,
}

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: platform_core::config::Config {
            port: 0,
            bind_address: "127.0.0.1".to_string(),
        },
        environment: Environment::Dev,
        service_name: "identity-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: "integration-test-secret-at-least-32b".to_string(),
            access_token_ttl_minutes: 15,
        },
        session: SessionConfig {
            session_ttl_minutes: 60,
            refresh_ttl_minutes: 120,
            portal_token_ttl_minutes: 30,
        },
        // MFA enforcement is opt-in per test; the MFA suite builds its own
        // config with enforced roles.
        mfa: MfaConfig {
            issuer: "identity-service-test".to_string(),
            enforced_roles: Vec::new(),
        },
        admin_gate: AdminGateConfig {
            ip_allowlist: Vec::new(),
            trusted_proxy_hops: 0,
            read_only_default: false,
            break_glass_max_ttl_seconds: 3600,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
        default_org_id: None,
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_config(test_config()).await
}

pub async fn spawn_app_with_config(config: IdentityConfig) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();

    let store: Arc<dyn AuthStore> = Arc::new(MemoryStore::new());
    let state = AppState::new(config, store.clone());
    let app = build_router(state.clone()).await.expect("router builds");

    TestApp {
        app,
        state,
        store,
        org_id: Uuid::new_v4(),
    }
}

impl TestApp {
    /// Seed an active identity with an Argon2id (current scheme) hash.
    pub async fn seed_identity(&self, email: &str, password: &str, role: Role) -> Identity {
        let hash = hash_password(&Password::new(password.to_string()))
            .expect("hashing")
            .into_string();
        let identity = Identity::new(
            IdentityKind::OrgMember,
            Some(self.org_id),
            email.to_string(),
            Some(hash),
            role,
        );
        self.store
            .insert_identity(&identity)
            .await
            .expect("seed identity");
        identity
    }

    /// Seed an identity with a pre-built (e.g. legacy-scheme) hash.
    pub async fn seed_identity_with_hash(
        &self,
        email: &str,
        stored_hash: &str,
        role: Role,
    ) -> Identity {
        let identity = Identity::new(
            IdentityKind::OrgMember,
            Some(self.org_id),
            email.to_string(),
            Some(stored_hash.to_string()),
            role,
        );
        self.store
            .insert_identity(&identity)
            .await
            .expect("seed identity");
        identity
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(req).await.unwrap()
    }

    /// Login and return (access_token, refresh_token).
    pub async fn login(&self, email: &str, password: &str) -> (String, String) {
        let response = self
            .post_json(
                "/auth/login",
                serde_json::json!({
                    "org_id": self.org_id,
                    "email": email,
                    "password": password,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "login should succeed");
        let body = read_json(response).await;
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }
}

pub async fn read_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn read_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// Build an authorized POST with optional idempotency key and break-glass
/// token headers.
pub fn authed_post(
    uri: &str,
    access_token: &str,
    idempotency_key: Option<&str>,
    break_glass: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", access_token));
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }
    if let Some(token) = break_glass {
        builder = builder.header("X-Break-Glass-Token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn authed_get(uri: &str, access_token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", access_token))
        .body(Body::empty())
        .unwrap()
}
