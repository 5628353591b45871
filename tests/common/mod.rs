#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use sales_dashboard_api::{
    auth::Claims,
    build_router,
    config::AppConfig,
    db::{self, DbConfig},
    services::users::CreateUserRequest,
    AppState,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str =
    "k8Hq2LzP0vXr7TnW4yBc9DmF1sJg6QeA3uVo5iRk8Hq2LzP0vXr7TnW4yBc9DmF1sJg6";
pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-pass-123";
pub const USER_USERNAME: &str = "analyst";
pub const USER_PASSWORD: &str = "analyst-pass-123";
pub const MAX_UPLOAD_BYTES: usize = 8 * 1024;

const MULTIPART_BOUNDARY: &str = "sales-dashboard-test-boundary";

/// Four data rows; the last one has no material and is reported as row 5.
pub const SALES_SHEET: &str = "Material,Branch,State,Technology,Tonnage,Star Rating,Price,Billing,Plan\n\
    AC-15-INV,Chennai,Tamil Nadu,Inverter,1.5,5,42990,30,40\n\
    AC-15-INV,Pune,Maharashtra,Inverter,1.5,5,42990,12,10\n\
    AC-10-FIX,Chennai,Tamil Nadu,Fixed Speed,1,3,29990,5,20\n\
    ,Chennai,Tamil Nadu,Inverter,1,3,1,1,1\n";

/// Application wired to a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    admin_token: String,
    user_token: String,
    _upload_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let upload_dir = TempDir::new().expect("temp upload dir");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        cfg.upload_dir = upload_dir.path().to_string_lossy().into_owned();
        cfg.max_upload_bytes = MAX_UPLOAD_BYTES;

        let pool = db::establish_connection_with_config(&DbConfig::from(&cfg))
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let users = state.services.users.clone();

        users
            .seed_admin(ADMIN_USERNAME, ADMIN_PASSWORD, "Test Admin")
            .await
            .expect("seed admin");
        users
            .create_user(CreateUserRequest {
                username: USER_USERNAME.to_string(),
                password: USER_PASSWORD.to_string(),
                full_name: "Test Analyst".to_string(),
                role: None,
            })
            .await
            .expect("seed user");

        let admin = users
            .find_by_username(ADMIN_USERNAME)
            .await
            .unwrap()
            .expect("admin exists");
        let analyst = users
            .find_by_username(USER_USERNAME)
            .await
            .unwrap()
            .expect("analyst exists");
        let admin_token = state.auth.issue_token(&admin).expect("admin token").token;
        let user_token = state.auth.issue_token(&analyst).expect("user token").token;

        let router = build_router(state.clone());

        Self {
            router,
            state,
            admin_token,
            user_token,
            _upload_dir: upload_dir,
        }
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn user_token(&self) -> &str {
        &self.user_token
    }

    /// Correctly signed token whose expiry is two hours in the past.
    pub fn expired_token(&self) -> String {
        let past = Utc::now() - Duration::hours(2);
        let config = &self.state.auth.config;
        let claims = Claims {
            sub: "1".to_string(),
            username: ADMIN_USERNAME.to_string(),
            role: "admin".to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: (past - Duration::hours(1)).timestamp(),
            exp: past.timestamp(),
            nbf: (past - Duration::hours(1)).timestamp(),
            iss: config.jwt_issuer.clone(),
            aud: config.jwt_audience.clone(),
        };
        self.state.auth.encode_claims(&claims).expect("encode expired token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", tok));
        }

        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
            }
            None => Body::empty(),
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response {
        self.request(Method::GET, uri, None, Some(token)).await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(self.admin_token())).await
    }

    /// POST a single multipart `file` part.
    pub async fn upload(&self, file_name: &str, content: &[u8], token: &str) -> Response {
        let mut payload = Vec::with_capacity(content.len() + 256);
        payload.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        payload.extend_from_slice(content);
        payload.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(Body::from(payload))
            .expect("failed to build multipart request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during upload")
    }

    /// Imports `SALES_SHEET` through the upload endpoint as the admin.
    pub async fn seed_sales(&self) -> Value {
        let response = self
            .upload("sales.csv", SALES_SHEET.as_bytes(), self.admin_token())
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response_json(response).await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Status plus the `data` field of a success envelope (or the whole error body).
pub async fn status_and_data(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let json = response_json(response).await;
    let data = if json.get("success").is_some() {
        json["data"].clone()
    } else {
        json
    };
    (status, data)
}
