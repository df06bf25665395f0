mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{authed_get, authed_post, read_json, spawn_app, spawn_app_with_config, test_config};
use identity_service::models::{BreakGlassToken, Role};
use identity_service::services::session::hash_opaque_token;
use uuid::Uuid;

#[tokio::test]
async fn ip_allowlist_rejects_unlisted_addresses() {
    let mut config = test_config();
    config.admin_gate.ip_allowlist = vec!["10.0.0.0/8".parse().unwrap()];
    config.admin_gate.trusted_proxy_hops = 1;
    let app = spawn_app_with_config(config).await;
    app.seed_identity("dispatcher@example.com", "pw", Role::Dispatcher)
        .await;
    let (access, _) = app.login("dispatcher@example.com", "pw").await;

    // Allowed range passes through to the handler.
    let response = app
        .request(
            Request::builder()
                .method("GET")
                .uri("/admin/leads")
                .header("Authorization", format!("Bearer {}", access))
                .header("X-Forwarded-For", "10.1.2.3")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Out-of-range client gets the structured 403, before authentication
    // even runs.
    let response = app
        .request(
            Request::builder()
                .method("GET")
                .uri("/admin/leads")
                .header("X-Forwarded-For", "203.0.113.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["type"], "ip_not_allowed");

    // Unresolvable client address fails closed while a list is configured.
    let response = app
        .request(
            Request::builder()
                .method("GET")
                .uri("/admin/leads")
                .header("Authorization", format!("Bearer {}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn read_only_mode_rejects_mutations_but_not_reads() {
    let app = spawn_app().await;
    app.seed_identity("owner@example.com", "pw", Role::Owner).await;
    app.seed_identity("dispatcher@example.com", "pw", Role::Dispatcher)
        .await;
    let (owner_access, _) = app.login("owner@example.com", "pw").await;
    let (dispatcher_access, _) = app.login("dispatcher@example.com", "pw").await;

    let response = app
        .request(authed_post(
            "/admin/read-only",
            &owner_access,
            None,
            None,
            serde_json::json!({ "enabled": true }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Mutating admin verb: structured 409.
    let response = app
        .request(authed_post(
            &format!("/admin/leads/{}/status", Uuid::new_v4()),
            &dispatcher_access,
            Some("ro-1"),
            None,
            serde_json::json!({ "status": "scheduled" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["type"], "read_only_mode");

    // Reads stay available during the incident.
    let response = app
        .request(authed_get("/admin/leads", &dispatcher_access))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The toggle route itself is exempt, so the flag can be cleared.
    let response = app
        .request(authed_post(
            "/admin/read-only",
            &owner_access,
            None,
            None,
            serde_json::json!({ "enabled": false }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(authed_post(
            &format!("/admin/leads/{}/status", Uuid::new_v4()),
            &dispatcher_access,
            Some("ro-2"),
            None,
            serde_json::json!({ "status": "scheduled" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn read_only_toggle_is_owner_only() {
    let app = spawn_app().await;
    app.seed_identity("admin@example.com", "pw", Role::Admin).await;
    let (admin_access, _) = app.login("admin@example.com", "pw").await;

    let response = app
        .request(authed_post(
            "/admin/read-only",
            &admin_access,
            None,
            None,
            serde_json::json!({ "enabled": true }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["type"], "permission_denied");
}

#[tokio::test]
async fn break_glass_writes_carry_the_reason_into_the_audit_log() {
    let app = spawn_app().await;
    app.seed_identity("admin@example.com", "pw", Role::Admin).await;
    let (access, _) = app.login("admin@example.com", "pw").await;

    let response = app
        .request(authed_post(
            "/admin/break-glass/start",
            &access,
            None,
            None,
            serde_json::json!({ "reason": "db failover", "ttl_seconds": 900 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let raw_token = response
        .headers()
        .get("x-break-glass-token")
        .expect("token delivered once in the response header")
        .to_str()
        .unwrap()
        .to_string();
    let body = read_json(response).await;
    assert!(body["token_id"].is_string());

    // A privileged write performed under the grant is tagged with the
    // original reason.
    let lead_id = Uuid::new_v4();
    let response = app
        .request(authed_post(
            &format!("/admin/leads/{}/status", lead_id),
            &access,
            Some("bg-1"),
            Some(&raw_token),
            serde_json::json!({ "status": "rescheduled" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let events = app.store.audit_events_for_org(app.org_id).await.unwrap();
    let write = events
        .iter()
        .find(|e| e.event_type_code == "privileged_write")
        .expect("privileged write audited");
    assert_eq!(write.break_glass_reason.as_deref(), Some("db failover"));
    assert_eq!(write.target_id, Some(lead_id));
    assert_eq!(
        write.after_snapshot,
        Some(serde_json::json!({ "status": "rescheduled" }))
    );

    // Issuance itself is audited with the reason too.
    assert!(events
        .iter()
        .any(|e| e.event_type_code == "break_glass_issued"
            && e.break_glass_reason.as_deref() == Some("db failover")));
}

#[tokio::test]
async fn expired_break_glass_token_is_rejected_with_401() {
    let app = spawn_app().await;
    let admin = app.seed_identity("admin@example.com", "pw", Role::Admin).await;
    let (access, _) = app.login("admin@example.com", "pw").await;

    // A token whose TTL has already elapsed.
    let raw = "expired-raw-token";
    let token = BreakGlassToken::new(
        app.org_id,
        admin.identity_id,
        "db failover".to_string(),
        hash_opaque_token(raw),
        -1,
    );
    app.store.insert_break_glass_token(&token).await.unwrap();

    let response = app
        .request(authed_post(
            &format!("/admin/leads/{}/status", Uuid::new_v4()),
            &access,
            Some("bg-2"),
            Some(raw),
            serde_json::json!({ "status": "done" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["type"], "invalid_credential");
}

#[tokio::test]
async fn break_glass_requires_reason_and_bounded_ttl() {
    let app = spawn_app().await;
    app.seed_identity("admin@example.com", "pw", Role::Admin).await;
    let (access, _) = app.login("admin@example.com", "pw").await;

    let response = app
        .request(authed_post(
            "/admin/break-glass/start",
            &access,
            None,
            None,
            serde_json::json!({ "reason": "   ", "ttl_seconds": 900 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(authed_post(
            "/admin/break-glass/start",
            &access,
            None,
            None,
            serde_json::json!({ "reason": "legit", "ttl_seconds": 999999 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dispatcher_cannot_start_break_glass() {
    let app = spawn_app().await;
    app.seed_identity("dispatcher@example.com", "pw", Role::Dispatcher)
        .await;
    let (access, _) = app.login("dispatcher@example.com", "pw").await;

    let response = app
        .request(authed_post(
            "/admin/break-glass/start",
            &access,
            None,
            None,
            serde_json::json!({ "reason": "curiosity", "ttl_seconds": 900 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
