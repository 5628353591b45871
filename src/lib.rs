//! Sales Dashboard API Library
//!
//! Backend for the sales and inventory analytics dashboard: accounts and JWT
//! auth, product/branch/inventory CRUD, spreadsheet ingestion, analytics and
//! a rule-based chatbot.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::HeaderValue,
    response::Json,
    routing::{delete, get, post, put},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use utoipa::ToSchema;

use crate::auth::{AuthConfig, AuthRouterExt, AuthService, UserRole};

/// Headroom for multipart boundaries and part headers around the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));
        let services = handlers::AppServices::new(db.clone(), &config);
        Self {
            db,
            config,
            auth,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api`.
///
/// Login and status are public; reads and the chatbot need a valid token;
/// every mutation of users, catalog, inventory and uploads needs `admin`.
pub fn api_routes(config: &config::AppConfig) -> Router<AppState> {
    let admin = UserRole::Admin.as_ref();

    let public = Router::new()
        .route("/status", get(api_status))
        .route("/auth/login", post(handlers::auth::login));

    let authenticated = Router::new()
        .route("/auth/verify", get(handlers::auth::verify))
        .route("/auth/change-password", post(handlers::auth::change_password))
        .route(
            "/auth/profile",
            get(handlers::auth::get_profile).put(handlers::auth::update_profile),
        )
        .route("/products", get(handlers::products::list_products))
        .route("/products/filters", get(handlers::products::product_filters))
        .route("/products/:id", get(handlers::products::get_product))
        .route("/branches", get(handlers::branches::list_branches))
        .route("/branches/:id", get(handlers::branches::get_branch))
        .route("/inventory", get(handlers::inventory::list_inventory))
        .route("/inventory/low-stock", get(handlers::inventory::low_stock))
        .route("/inventory/:id", get(handlers::inventory::get_inventory))
        .route("/analytics/summary", get(handlers::analytics::summary))
        .route(
            "/analytics/branches",
            get(handlers::analytics::branch_performance),
        )
        .route(
            "/analytics/technology",
            get(handlers::analytics::technology_breakdown),
        )
        .route(
            "/analytics/star-rating",
            get(handlers::analytics::star_rating_breakdown),
        )
        .route("/analytics/states", get(handlers::analytics::state_breakdown))
        .route(
            "/analytics/top-products",
            get(handlers::analytics::top_products),
        )
        .route("/chat", post(handlers::chat::chat))
        .with_auth();

    let admin_only = Router::new()
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route("/users/:id", delete(handlers::users::delete_user))
        .route("/products", post(handlers::products::create_product))
        .route(
            "/products/:id",
            put(handlers::products::update_product).delete(handlers::products::delete_product),
        )
        .route("/branches", post(handlers::branches::create_branch))
        .route(
            "/branches/:id",
            put(handlers::branches::update_branch).delete(handlers::branches::delete_branch),
        )
        .route("/inventory", post(handlers::inventory::upsert_inventory))
        .route("/inventory/:id", put(handlers::inventory::update_inventory))
        .route(
            "/upload",
            post(handlers::uploads::upload_file)
                .layer(DefaultBodyLimit::max(
                    config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
                ))
                .get(handlers::uploads::list_uploads),
        )
        .with_role(admin);

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(admin_only)
}

/// Builds the complete application router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api_routes(&state.config))
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        // auth_middleware looks the AuthService up in request extensions
        .layer(Extension(state.auth.clone()))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(config: &config::AppConfig) -> CorsLayer {
    let configured_origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !configured_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(configured_origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(config.cors_allow_credentials)
    } else if config.should_allow_permissive_cors() {
        ::tracing::info!(
            environment = %config.environment,
            "Using permissive CORS because explicit origins were not configured"
        );
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("No CORS origins configured; cross-origin requests will be rejected");
        CorsLayer::new()
    }
}

/// Service identity reported by `GET /api/status`
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub service: String,
    pub version: String,
    pub environment: String,
    pub timestamp: String,
}

#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Service name, version and environment", body = StatusResponse)
    ),
    tag = "health"
)]
pub async fn api_status(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    Ok(Json(ApiResponse::success(StatusResponse {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        timestamp: Utc::now().to_rfc3339(),
    })))
}
