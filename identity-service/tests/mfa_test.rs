mod common;

use axum::http::StatusCode;
use common::{authed_get, authed_post, read_json, spawn_app_with_config, test_config};
use identity_service::models::Role;
use totp_rs::{Algorithm, Secret, TOTP};

fn mfa_config() -> identity_service::config::IdentityConfig {
    let mut config = test_config();
    config.mfa.enforced_roles = vec![Role::Owner, Role::Admin];
    config
}

fn current_code(secret_base32: &str) -> String {
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .unwrap(),
        Some("identity-service-test".to_string()),
        "admin@example.com".to_string(),
    )
    .unwrap();
    totp.generate_current().unwrap()
}

#[tokio::test]
async fn unverified_enforced_role_gets_distinguishable_401_on_privileged_routes() {
    let app = spawn_app_with_config(mfa_config()).await;
    app.seed_identity("admin@example.com", "pw", Role::Admin).await;
    let (access, _) = app.login("admin@example.com", "pw").await;

    // Privileged mutation: refused with the MFA-specific 401, so clients
    // route to verification instead of the login form.
    let response = app
        .request(authed_post(
            "/admin/break-glass/start",
            &access,
            None,
            None,
            serde_json::json!({ "reason": "x", "ttl_seconds": 60 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["type"], "mfa_required");

    // Enrollment stays reachable with plain authentication.
    let response = app
        .request(authed_post(
            "/auth/2fa/enroll",
            &access,
            None,
            None,
            serde_json::json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn enroll_verify_unlocks_privileged_routes_and_revokes_other_sessions() {
    let app = spawn_app_with_config(mfa_config()).await;
    app.seed_identity("admin@example.com", "pw", Role::Admin).await;

    let (access, _) = app.login("admin@example.com", "pw").await;
    // A second session that will never present the factor.
    let (stale_access, _) = app.login("admin@example.com", "pw").await;

    let response = app
        .request(authed_post(
            "/auth/2fa/enroll",
            &access,
            None,
            None,
            serde_json::json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let secret = body["secret"].as_str().unwrap().to_string();
    assert!(body["enrollment_uri"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));

    let response = app
        .request(authed_post(
            "/auth/2fa/verify",
            &access,
            None,
            None,
            serde_json::json!({ "code": current_code(&secret) }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The verifying session is now MFA-backed: privileged routes open up.
    let response = app
        .request(authed_post(
            "/admin/break-glass/start",
            &access,
            None,
            None,
            serde_json::json!({ "reason": "maintenance", "ttl_seconds": 60 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // The pre-verification session died with the upgrade.
    let response = app.request(authed_get("/admin/leads", &stale_access)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["type"], "session_revoked");
}

#[tokio::test]
async fn enabled_factor_is_demanded_at_login() {
    let app = spawn_app_with_config(mfa_config()).await;
    app.seed_identity("admin@example.com", "pw", Role::Admin).await;
    let (access, _) = app.login("admin@example.com", "pw").await;

    let response = app
        .request(authed_post("/auth/2fa/enroll", &access, None, None, serde_json::json!({})))
        .await;
    let secret = read_json(response).await["secret"]
        .as_str()
        .unwrap()
        .to_string();
    let response = app
        .request(authed_post(
            "/auth/2fa/verify",
            &access,
            None,
            None,
            serde_json::json!({ "code": current_code(&secret) }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Password alone is no longer enough.
    let response = app
        .post_json(
            "/auth/login",
            serde_json::json!({
                "org_id": app.org_id,
                "email": "admin@example.com",
                "password": "pw",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["type"], "mfa_required");

    // A wrong code is still the MFA failure, not a generic one.
    let response = app
        .post_json(
            "/auth/login",
            serde_json::json!({
                "org_id": app.org_id,
                "email": "admin@example.com",
                "password": "pw",
                "totp_code": "000000",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["type"], "mfa_required");

    // Password plus a live code logs in with a verified session.
    let response = app
        .post_json(
            "/auth/login",
            serde_json::json!({
                "org_id": app.org_id,
                "email": "admin@example.com",
                "password": "pw",
                "totp_code": current_code(&secret),
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let access = read_json(response).await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(authed_post(
            "/admin/break-glass/start",
            &access,
            None,
            None,
            serde_json::json!({ "reason": "maintenance", "ttl_seconds": 60 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn disable_is_owner_only_and_revokes_every_session() {
    let app = spawn_app_with_config(mfa_config()).await;
    let admin = app.seed_identity("admin@example.com", "pw", Role::Admin).await;
    app.seed_identity("owner@example.com", "pw", Role::Owner).await;

    // Enroll and verify the admin.
    let (admin_access, _) = app.login("admin@example.com", "pw").await;
    let response = app
        .request(authed_post("/auth/2fa/enroll", &admin_access, None, None, serde_json::json!({})))
        .await;
    let secret = read_json(response).await["secret"]
        .as_str()
        .unwrap()
        .to_string();
    let response = app
        .request(authed_post(
            "/auth/2fa/verify",
            &admin_access,
            None,
            None,
            serde_json::json!({ "code": current_code(&secret) }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The admin cannot disable a factor, not even their own.
    let response = app
        .request(authed_post(
            "/auth/2fa/disable",
            &admin_access,
            None,
            None,
            serde_json::json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The owner can, for any identity in their organization.
    let (owner_access, _) = app.login("owner@example.com", "pw").await;
    let response = app
        .request(authed_post(
            "/auth/2fa/disable",
            &owner_access,
            None,
            None,
            serde_json::json!({ "identity_id": admin.identity_id }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["sessions_revoked"], 1);

    // The admin's session is gone and their factor is destroyed.
    let response = app.request(authed_get("/admin/leads", &admin_access)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let stored = app
        .store
        .find_identity(admin.identity_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.mfa_state_code, "disabled");
    assert!(app
        .store
        .get_mfa_secret(admin.identity_id)
        .await
        .unwrap()
        .is_none());
}
