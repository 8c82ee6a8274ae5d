mod common;

use axum::http::StatusCode;
use common::{error_code, TestApp, PASSWORD};
use serde_json::json;
use tenant_auth::models::{AuthEventType, Role};

const NEW_PASSWORD: &str = "Battery9Staple";

#[tokio::test]
async fn test_change_password_signs_out_everywhere() {
    let app = TestApp::spawn().await;
    let tenant = app.create_tenant("Cafe Uno").await;
    let user = app
        .create_user("ana@example.com", &[(&tenant, Role::Waiter)])
        .await;
    let (access, refresh_token) = app.login_tokens("ana@example.com", None).await;

    let res = app
        .post(
            "/auth/change-password",
            Some(&access),
            json!({ "current_password": PASSWORD, "new_password": NEW_PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let res = app
        .post(
            "/auth/refresh",
            None,
            json!({ "refresh_token": refresh_token }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    assert_eq!(
        app.login("ana@example.com", PASSWORD, None).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.login("ana@example.com", NEW_PASSWORD, None).await.status,
        StatusCode::OK
    );

    let stored = app.repos.users.find_by_id(user.id).await.unwrap().unwrap();
    assert!(!stored.must_reset_password);
}

#[tokio::test]
async fn test_change_password_rejects_wrong_current_and_weak_new() {
    let app = TestApp::spawn().await;
    let tenant = app.create_tenant("Cafe Uno").await;
    app.create_user("ana@example.com", &[(&tenant, Role::Waiter)])
        .await;
    let (access, _) = app.login_tokens("ana@example.com", None).await;

    let res = app
        .post(
            "/auth/change-password",
            Some(&access),
            json!({ "current_password": "Wrong1Horse", "new_password": NEW_PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&res), "current_password_incorrect");

    let res = app
        .post(
            "/auth/change-password",
            Some(&access),
            json!({ "current_password": PASSWORD, "new_password": "alllowercase1" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&res), "password_weak");
}

#[tokio::test]
async fn test_reset_request_does_not_reveal_unknown_email() {
    let app = TestApp::spawn().await;
    let tenant = app.create_tenant("Cafe Uno").await;
    app.create_user("ana@example.com", &[(&tenant, Role::Waiter)])
        .await;

    let known = app
        .post(
            "/auth/password-reset/request",
            None,
            json!({ "email": "ana@example.com" }),
        )
        .await;
    let unknown = app
        .post(
            "/auth/password-reset/request",
            None,
            json!({ "email": "ghost@example.com" }),
        )
        .await;

    assert_eq!(known.status, StatusCode::ACCEPTED);
    assert_eq!(unknown.status, StatusCode::ACCEPTED);
    assert_eq!(known.body, unknown.body);
    assert_eq!(app.notifier.count(), 1);

    let requested = app
        .repos
        .events
        .find_by_type(AuthEventType::PasswordResetRequested, 0, 10)
        .await
        .unwrap();
    assert_eq!(requested.len(), 2);
}

#[tokio::test]
async fn test_reset_request_is_limited_per_email() {
    let app = TestApp::spawn().await;
    let tenant = app.create_tenant("Cafe Uno").await;
    app.create_user("ana@example.com", &[(&tenant, Role::Waiter)])
        .await;

    let body = json!({ "email": "ana@example.com" });
    let first = app
        .post("/auth/password-reset/request", None, body.clone())
        .await;
    assert_eq!(first.status, StatusCode::ACCEPTED);

    let second = app
        .request_from(
            "198.51.100.7",
            axum::http::Method::POST,
            "/auth/password-reset/request",
            None,
            Some(json!({ "email": "ANA@example.com" })),
        )
        .await;
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers.contains_key("retry-after"));
    assert_eq!(app.notifier.count(), 1);
}

#[tokio::test]
async fn test_complete_reset_sets_password_and_burns_token() {
    let app = TestApp::spawn().await;
    let tenant = app.create_tenant("Cafe Uno").await;
    app.create_user("ana@example.com", &[(&tenant, Role::Waiter)])
        .await;
    let (_, refresh_token) = app.login_tokens("ana@example.com", None).await;

    app.post(
        "/auth/password-reset/request",
        None,
        json!({ "email": "ana@example.com" }),
    )
    .await;
    let token = app.notifier.last_token().expect("token delivered");

    let res = app
        .post(
            "/auth/password-reset/complete",
            None,
            json!({ "token": token, "new_password": NEW_PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let res = app
        .post(
            "/auth/refresh",
            None,
            json!({ "refresh_token": refresh_token }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    assert_eq!(
        app.login("ana@example.com", NEW_PASSWORD, None).await.status,
        StatusCode::OK
    );

    let reuse = app
        .post(
            "/auth/password-reset/complete",
            None,
            json!({ "token": token, "new_password": "Another7Password" }),
        )
        .await;
    assert_eq!(reuse.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&reuse), "token_used");
}

#[tokio::test]
async fn test_complete_reset_with_unknown_token_fails() {
    let app = TestApp::spawn().await;

    let res = app
        .post(
            "/auth/password-reset/complete",
            None,
            json!({ "token": "never-issued", "new_password": NEW_PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&res), "token_invalid");
}

#[tokio::test]
async fn test_complete_reset_rejects_weak_password_without_using_token() {
    let app = TestApp::spawn().await;
    let tenant = app.create_tenant("Cafe Uno").await;
    app.create_user("ana@example.com", &[(&tenant, Role::Waiter)])
        .await;

    app.post(
        "/auth/password-reset/request",
        None,
        json!({ "email": "ana@example.com" }),
    )
    .await;
    let token = app.notifier.last_token().unwrap();

    let weak = app
        .post(
            "/auth/password-reset/complete",
            None,
            json!({ "token": token, "new_password": "short" }),
        )
        .await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&weak), "password_weak");

    let ok = app
        .post(
            "/auth/password-reset/complete",
            None,
            json!({ "token": token, "new_password": NEW_PASSWORD }),
        )
        .await;
    assert_eq!(ok.status, StatusCode::NO_CONTENT);
}
