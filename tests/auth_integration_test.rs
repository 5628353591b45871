//! Integration tests for login, token validation and profile endpoints.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    response_json, status_and_data, TestApp, ADMIN_PASSWORD, ADMIN_USERNAME, USER_PASSWORD,
    USER_USERNAME,
};
use serde_json::json;

// ==================== Public endpoints ====================

#[tokio::test]
async fn health_reports_database_up_without_auth() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"]["status"], "up");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn status_is_public_and_carries_request_id() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/status", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["service"], "sales-dashboard-api");
    assert_eq!(body["data"]["environment"], "development");
    assert!(body["meta"]["request_id"].is_string());
}

// ==================== Login ====================

#[tokio::test]
async fn login_returns_token_that_authorizes_requests() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({"username": USER_USERNAME, "password": USER_PASSWORD})),
            None,
        )
        .await;
    let (status, data) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["token_type"], "Bearer");
    assert_eq!(data["expires_in"], 3600);
    assert_eq!(data["user"]["username"], USER_USERNAME);
    assert_eq!(data["user"]["role"], "user");
    assert!(data["user"].get("password_hash").is_none());

    let token = data["token"].as_str().unwrap().to_string();
    let response = app.get("/api/auth/verify", &token).await;
    let (status, data) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["valid"], true);
    assert_eq!(data["user"]["username"], USER_USERNAME);
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({"username": ADMIN_USERNAME, "password": "not-the-password"})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_for_unknown_user_is_unauthorized() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({"username": "nobody", "password": ADMIN_PASSWORD})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_blank_fields_is_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({"username": "  ", "password": ""})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ==================== Token rejection ====================

#[tokio::test]
async fn missing_token_is_rejected() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/products", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "AUTH_MISSING_TOKEN");
}

#[tokio::test]
async fn malformed_token_is_rejected() {
    let app = TestApp::new().await;

    for token in ["invalid_token_here", "a.b.c", "Bearer"] {
        let response = app.get("/api/products", token).await;
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "token {token:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = TestApp::new().await;

    let response = app.get("/api/analytics/summary", &app.expired_token()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "AUTH_TOKEN_EXPIRED");
}

#[tokio::test]
async fn verify_fails_once_the_account_is_deleted() {
    let app = TestApp::new().await;

    let analyst = app
        .state
        .services
        .users
        .find_by_username(USER_USERNAME)
        .await
        .unwrap()
        .unwrap();
    let response = app
        .admin(Method::DELETE, &format!("/api/users/{}", analyst.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get("/api/auth/verify", app.user_token()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ==================== Profile ====================

#[tokio::test]
async fn profile_can_be_read_and_updated() {
    let app = TestApp::new().await;

    let response = app.get("/api/auth/profile", app.user_token()).await;
    let (status, data) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["full_name"], "Test Analyst");

    let response = app
        .request(
            Method::PUT,
            "/api/auth/profile",
            Some(json!({"full_name": "Renamed Analyst"})),
            Some(app.user_token()),
        )
        .await;
    let (status, data) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["full_name"], "Renamed Analyst");
}

#[tokio::test]
async fn change_password_requires_current_password() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/change-password",
            Some(json!({"current_password": "wrong-one-123", "new_password": "brand-new-pass"})),
            Some(app.user_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/auth/change-password",
            Some(json!({"current_password": USER_PASSWORD, "new_password": "brand-new-pass"})),
            Some(app.user_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Password changed");

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({"username": USER_USERNAME, "password": "brand-new-pass"})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn short_new_password_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/change-password",
            Some(json!({"current_password": USER_PASSWORD, "new_password": "short"})),
            Some(app.user_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
