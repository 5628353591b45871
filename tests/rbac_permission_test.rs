//! Role checks: reads need any valid token, mutations need `admin`.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, status_and_data, TestApp, SALES_SHEET};
use rstest::rstest;
use serde_json::json;

#[rstest]
#[case(Method::POST, "/api/products")]
#[case(Method::PUT, "/api/products/1")]
#[case(Method::DELETE, "/api/products/1")]
#[case(Method::POST, "/api/branches")]
#[case(Method::PUT, "/api/branches/1")]
#[case(Method::DELETE, "/api/branches/1")]
#[case(Method::POST, "/api/inventory")]
#[case(Method::PUT, "/api/inventory/1")]
#[case(Method::GET, "/api/users")]
#[case(Method::POST, "/api/users")]
#[case(Method::DELETE, "/api/users/1")]
#[case(Method::GET, "/api/upload")]
#[tokio::test]
async fn regular_user_is_forbidden_from_admin_routes(#[case] method: Method, #[case] uri: &str) {
    let app = TestApp::new().await;

    let response = app
        .request(method, uri, Some(json!({})), Some(app.user_token()))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "AUTH_INSUFFICIENT_PERMISSIONS");
}

#[tokio::test]
async fn regular_user_cannot_upload() {
    let app = TestApp::new().await;

    let response = app
        .upload("sales.csv", SALES_SHEET.as_bytes(), app.user_token())
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[rstest]
#[case("/api/products")]
#[case("/api/products/filters")]
#[case("/api/branches")]
#[case("/api/inventory")]
#[case("/api/inventory/low-stock")]
#[case("/api/analytics/summary")]
#[case("/api/analytics/branches")]
#[case("/api/analytics/technology")]
#[case("/api/analytics/star-rating")]
#[case("/api/analytics/states")]
#[case("/api/analytics/top-products")]
#[tokio::test]
async fn regular_user_can_read(#[case] uri: &str) {
    let app = TestApp::new().await;

    let response = app.get(uri, app.user_token()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_manages_users() {
    let app = TestApp::new().await;

    let response = app
        .admin(
            Method::POST,
            "/api/users",
            Some(json!({
                "username": "ravi",
                "password": "ravi-pass-123",
                "full_name": "Ravi Kumar",
                "role": "admin"
            })),
        )
        .await;
    let (status, created) = status_and_data(response).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["role"], "admin");

    let response = app
        .admin(
            Method::POST,
            "/api/users",
            Some(json!({
                "username": "ravi",
                "password": "another-pass-1",
                "full_name": "Someone Else"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.get("/api/users", app.admin_token()).await;
    let (status, users) = status_and_data(response).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["admin", "analyst", "ravi"]);

    let response = app
        .admin(Method::DELETE, &format!("/api/users/{}", created["id"]), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_cannot_delete_own_account() {
    let app = TestApp::new().await;

    let admin = app
        .state
        .services
        .users
        .find_by_username(common::ADMIN_USERNAME)
        .await
        .unwrap()
        .unwrap();
    let response = app
        .admin(Method::DELETE, &format!("/api/users/{}", admin.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_role_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .admin(
            Method::POST,
            "/api/users",
            Some(json!({
                "username": "meena",
                "password": "meena-pass-123",
                "full_name": "Meena",
                "role": "superuser"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
