mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{authed_get, authed_post, read_json, spawn_app};
use identity_service::models::Role;

#[tokio::test]
async fn refresh_rotates_and_old_token_is_dead() {
    let app = spawn_app().await;
    app.seed_identity("dispatcher@example.com", "pw", Role::Dispatcher)
        .await;
    let (_, refresh) = app.login("dispatcher@example.com", "pw").await;

    // First refresh succeeds and returns a new pair.
    let response = app
        .post_json(
            "/auth/refresh",
            serde_json::json!({ "refresh_token": refresh }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let new_refresh = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(refresh, new_refresh);

    // Replaying the predecessor fails closed: the rotation already revoked
    // it, so a naive retry can never double-rotate.
    let response = app
        .post_json(
            "/auth/refresh",
            serde_json::json!({ "refresh_token": refresh }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["type"], "session_revoked");

    // The successor still works.
    let response = app
        .post_json(
            "/auth/refresh",
            serde_json::json!({ "refresh_token": new_refresh }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_accepts_cookie() {
    let app = spawn_app().await;
    app.seed_identity("dispatcher@example.com", "pw", Role::Dispatcher)
        .await;
    let (_, refresh) = app.login("dispatcher@example.com", "pw").await;

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("Cookie", format!("refresh_token={}", refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_refresh_token_is_401() {
    let app = spawn_app().await;

    let response = app
        .post_json(
            "/auth/refresh",
            serde_json::json!({ "refresh_token": "deadbeef" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["type"], "invalid_credential");
}

#[tokio::test]
async fn logout_revokes_the_session_immediately() {
    let app = spawn_app().await;
    app.seed_identity("dispatcher@example.com", "pw", Role::Dispatcher)
        .await;
    let (access, refresh) = app.login("dispatcher@example.com", "pw").await;

    let response = app
        .request(authed_post("/auth/logout", &access, None, None, serde_json::json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The unexpired access token fails authentication now: session liveness
    // is re-checked on every request, signature validity is not enough.
    let response = app.request(authed_get("/admin/leads", &access)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["type"], "session_revoked");

    // The refresh chain died with the session.
    let response = app
        .post_json(
            "/auth/refresh",
            serde_json::json!({ "refresh_token": refresh }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_revoke_all_kills_outstanding_access_tokens() {
    let app = spawn_app().await;
    app.seed_identity("owner@example.com", "pw", Role::Owner).await;
    let target = app
        .seed_identity("dispatcher@example.com", "pw", Role::Dispatcher)
        .await;

    let (target_access, _) = app.login("dispatcher@example.com", "pw").await;
    let (owner_access, _) = app.login("owner@example.com", "pw").await;

    // The target's token works before the revocation.
    let response = app.request(authed_get("/admin/leads", &target_access)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(authed_post(
            &format!("/admin/identities/{}/revoke-sessions", target.identity_id),
            &owner_access,
            Some("revoke-1"),
            None,
            serde_json::json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["sessions_revoked"], 1);

    // Previously issued, unexpired token now answers 401, not 200.
    let response = app.request(authed_get("/admin/leads", &target_access)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["type"], "session_revoked");
}

#[tokio::test]
async fn viewer_cannot_revoke_sessions() {
    let app = spawn_app().await;
    let target = app
        .seed_identity("dispatcher@example.com", "pw", Role::Dispatcher)
        .await;
    app.seed_identity("viewer@example.com", "pw", Role::Viewer)
        .await;
    let (viewer_access, _) = app.login("viewer@example.com", "pw").await;

    let response = app
        .request(authed_post(
            &format!("/admin/identities/{}/revoke-sessions", target.identity_id),
            &viewer_access,
            Some("revoke-2"),
            None,
            serde_json::json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["type"], "permission_denied");
}
